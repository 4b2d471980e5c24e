use crate::domain::{EngineClient, ProjectEnvDesc};
use crate::services::ProjectEnv;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Print one host port the engine considers free
pub fn run(engine: Arc<dyn EngineClient>) -> Result<()> {
    let port = find(engine)?;
    println!("{port}");
    Ok(())
}

fn find(engine: Arc<dyn EngineClient>) -> Result<String> {
    let project = ProjectEnv::new(ProjectEnvDesc::new(), engine);
    let found = project
        .find_free_host_port()
        .context("finding a free host port");
    // sweeps the probe if its removal failed
    let closed = project.close().context("removing the probe container");
    let port = found?;
    closed?;
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FIRST_EPHEMERAL_PORT, MockEngine};

    #[test]
    fn finds_port_and_leaves_nothing_behind() {
        let engine = Arc::new(MockEngine::new());
        let port = find(engine.clone()).unwrap();
        assert_eq!(port, FIRST_EPHEMERAL_PORT.to_string());
        assert_eq!(engine.live_containers(), 0);
    }

    #[test]
    fn probe_failure_is_reported() {
        let engine = Arc::new(MockEngine::new());
        engine.set_fail_on("create_container");
        let err = find(engine).unwrap_err();
        assert!(format!("{err:#}").contains("free host port"));
    }
}
