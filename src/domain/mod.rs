mod container;
mod desc;
pub mod engine;
mod image;
mod network;
mod resolver;
pub mod traits;
mod variables;

pub use container::{
    Container, ContainerDesc, ContainerNetwork, HookFn, Hooks, PortBinding, PortProtocol,
};
pub use desc::{ProjectEnvDesc, TestCaseEnvDesc};
pub use image::{BuildOnce, ImageDesc, ImageResolver};
pub use network::{Network, NetworkDesc, NetworkResolver};
pub use resolver::{Resolver, StringsMap};
pub use traits::EngineClient;
pub use variables::{Value, Variables};
