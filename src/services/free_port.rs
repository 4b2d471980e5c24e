use super::project::ProjectEnv;
use super::test_case::TestCaseEnv;
use crate::domain::{Container, ContainerDesc, Hooks, PortProtocol};
use crate::error::{Error, ResolveError, Result};
use tracing::{debug, warn};

/// Image of the disposable probe container
pub const PROBE_IMAGE: &str = "alpine:latest";
const PROBE_PORT: &str = "9999";
const PROBE_NAME: &str = "free-port-probe";

impl ProjectEnv {
    /// Let the engine pick an unused host port by publishing a probe
    /// container's exposed port, then remove the probe.
    pub fn find_free_host_port(&self) -> Result<String> {
        let info = ContainerDesc::new(PROBE_IMAGE)
            .expose(PROBE_PORT)
            .cmd(["sleep", "60"])
            .run(self, None)
            .map_err(|e| Error::Container {
                name: PROBE_NAME.to_string(),
                source: Box::new(e),
            })?;
        let probe = Container::new(PROBE_NAME, info);

        let port = probe.host_port(PROBE_PORT, PortProtocol::Tcp);

        if let Err(e) = self.client().remove_container(probe.id()) {
            warn!("Failed to remove temporary container (ID: {}): {e}", probe.id());
        }

        let port = port.ok_or_else(|| Error::NoFreePort {
            container: probe.id().to_string(),
        })?;
        debug!(%port, "Found free host port");
        Ok(port)
    }
}

impl Hooks {
    /// Chain a `before_run` step storing a free host port in the project
    /// variable `key`, after any `before_run` hook already set.
    ///
    /// Project scope only: concurrent test cases would overwrite each other's
    /// port. Use `store_test_case_free_port` for test-case containers.
    pub fn store_free_port(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.chain_before_run(move |project, _| {
            let port = project.find_free_host_port()?;
            project.set(key.clone(), port);
            Ok(())
        })
    }

    /// Like `store_free_port`, but into the running test case's variables
    pub fn store_test_case_free_port(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.chain_before_run(move |project, test_case| {
            let test_case =
                test_case.ok_or(ResolveError::OutsideTestCase("StoreTestCaseFreePort"))?;
            let port = project.find_free_host_port()?;
            test_case.set(key.clone(), port);
            Ok(())
        })
    }

    fn chain_before_run<F>(self, step: F) -> Self
    where
        F: Fn(&ProjectEnv, Option<&TestCaseEnv<'_>>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let previous = self.before_run.clone();
        self.before_run(move |project, test_case| {
            if let Some(previous) = &previous {
                previous(project, test_case)?;
            }
            step(project, test_case)
        })
    }
}
