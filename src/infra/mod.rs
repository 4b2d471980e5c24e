pub mod auth;
pub mod config;
pub mod docker_cli;
pub mod tracked_client;

pub use auth::AuthConfigs;
pub use config::{DEFAULT_ENV_FILE, EnvFile, EnvPlan, FileFormat};
pub use docker_cli::DockerCli;
pub use tracked_client::{TrackedClient, TrackedResources};
