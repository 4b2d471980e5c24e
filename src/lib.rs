pub mod cli;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;

// Public so integration tests can drive scopes without a real engine
pub mod test_support;

pub use domain::{
    Container, ContainerDesc, EngineClient, Hooks, ImageDesc, ImageResolver, NetworkDesc,
    NetworkResolver, PortBinding, PortProtocol, ProjectEnvDesc, Resolver, TestCaseEnvDesc,
};
pub use error::{AggregateError, EngineError, Error, ResolveError, Result};
pub use infra::{DockerCli, EnvFile, TrackedClient};
pub use services::{ProjectEnv, ScopeState, TestCaseEnv};
