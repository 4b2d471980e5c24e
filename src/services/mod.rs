mod free_port;
mod project;
mod scope;
mod test_case;

pub use free_port::PROBE_IMAGE;
pub use project::ProjectEnv;
pub use scope::ScopeState;
pub use test_case::TestCaseEnv;
