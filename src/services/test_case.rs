use super::project::{ProjectEnv, read, write};
use super::scope::{Lifecycle, ScopeState};
use crate::domain::{Container, Network, TestCaseEnvDesc, Value, Variables};
use crate::error::{AggregateError, Error, ResourceKind, Result, ScopeKind};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::{info, warn};

/// Short-lived environment provisioned from the project's test-case template.
///
/// Borrows its project, which must outlive it. Closing a test case only
/// removes what the test case created; anything it fails to remove stays
/// tracked by the shared client and is swept by `ProjectEnv::close`.
#[derive(Debug)]
pub struct TestCaseEnv<'p> {
    project: &'p ProjectEnv,
    networks: RwLock<BTreeMap<String, Network>>,
    containers: RwLock<BTreeMap<String, Container>>,
    variables: Variables,
    lifecycle: Lifecycle,
}

impl<'p> TestCaseEnv<'p> {
    pub(crate) fn new(project: &'p ProjectEnv) -> Self {
        Self {
            project,
            networks: RwLock::new(BTreeMap::new()),
            containers: RwLock::new(BTreeMap::new()),
            variables: Variables::new(ScopeKind::TestCase),
            lifecycle: Lifecycle::new(ScopeKind::TestCase),
        }
    }

    pub fn run(&self) -> Result<()> {
        self.lifecycle.begin_run()?;

        let hooks = &self.desc().hooks;
        hooks.fire_before(self.project, Some(self))?;
        self.create_networks()?;
        self.run_containers()?;
        hooks.fire_after(self.project, Some(self))?;

        Ok(())
    }

    /// Remove this test case's containers, then its networks, attempting
    /// every one and reporting all failures together
    pub fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }

        let client = self.project.client();
        let mut failures = AggregateError::default();

        let containers = std::mem::take(&mut *write(&self.containers));
        for (name, container) in containers {
            info!("Removing test case container {name}");
            if let Err(e) = client.remove_container(container.id()) {
                warn!("Failed to remove container {name} (ID: {}): {e}", container.id());
                failures.push(ResourceKind::Container, container.id(), e);
            }
        }

        let networks = std::mem::take(&mut *write(&self.networks));
        for (name, network) in networks {
            info!("Removing test case network {name}");
            if let Err(e) = client.remove_network(&network.id) {
                warn!("Failed to remove network {name} (ID: {}): {e}", network.id);
                failures.push(ResourceKind::Network, network.id, e);
            }
        }

        failures.into_result().map_err(Error::from)
    }

    pub fn project(&self) -> &'p ProjectEnv {
        self.project
    }

    pub fn container(&self, name: &str) -> Option<Container> {
        read(&self.containers).get(name).cloned()
    }

    pub fn network(&self, name: &str) -> Option<Network> {
        read(&self.networks).get(name).cloned()
    }

    pub fn containers(&self) -> Vec<Container> {
        read(&self.containers).values().cloned().collect()
    }

    pub fn set<V: Any + Send + Sync>(&self, key: impl Into<String>, value: V) {
        self.variables.set(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.variables.get(key)
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn state(&self) -> ScopeState {
        self.lifecycle.get()
    }

    fn desc(&self) -> &'p TestCaseEnvDesc {
        &self.project.desc().test_case
    }

    fn create_networks(&self) -> Result<()> {
        for (name, desc) in &self.desc().networks {
            info!("Creating test case network {name}");
            let network = desc
                .create(self.project, Some(self))
                .map_err(|e| Error::Network {
                    name: name.clone(),
                    source: Box::new(e),
                })?;
            info!("Created network {name} (ID: {})", network.id);

            write(&self.networks).insert(
                name.clone(),
                Network {
                    id: network.id,
                    name: name.clone(),
                    engine_name: network.name,
                },
            );
        }
        Ok(())
    }

    fn run_containers(&self) -> Result<()> {
        for (name, desc) in &self.desc().containers {
            let wrap = |e: Error| Error::Container {
                name: name.clone(),
                source: Box::new(e),
            };

            info!("Creating test case container {name}");
            let info = desc.start(self.project, Some(self)).map_err(wrap)?;
            info!("Created container {name} (ID: {})", info.id);

            write(&self.containers).insert(name.clone(), Container::new(name.clone(), info));
            desc.hooks.fire_after(self.project, Some(self)).map_err(wrap)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ContainerDesc, Hooks, NetworkDesc, NetworkResolver, ProjectEnvDesc, Resolver,
    };
    use crate::test_support::MockEngine;
    use std::sync::{Arc, Mutex};

    fn desc() -> ProjectEnvDesc {
        ProjectEnvDesc::new()
            .network("shared", NetworkDesc::new())
            .test_case(
                TestCaseEnvDesc::new()
                    .network("private", NetworkDesc::new())
                    .container(
                        "worker",
                        ContainerDesc::new("alpine:latest")
                            .network(NetworkResolver::test_case("private"))
                            .network(NetworkResolver::project("shared"))
                            .env("TOKEN", Resolver::test_case_var("TOKEN")),
                    ),
            )
    }

    #[test]
    fn test_case_provisions_its_own_resources() {
        let engine = Arc::new(MockEngine::new());
        let project = ProjectEnv::new(desc(), engine.clone());
        project.run().unwrap();

        let test_case = project.new_test_case();
        test_case.set("TOKEN", "t-1");
        test_case.run().unwrap();

        let worker = test_case.container("worker").unwrap();
        assert!(project.container("worker").is_none());
        assert!(test_case.network("shared").is_none());

        let params = engine.created_containers().pop().unwrap();
        assert_eq!(params.envs["TOKEN"], "t-1");
        assert_eq!(params.networks[0].network_id, test_case.network("private").unwrap().id);
        assert_eq!(params.networks[1].network_id, project.network("shared").unwrap().id);

        test_case.close().unwrap();
        let commands = engine.get_commands();
        let removed_container = commands
            .iter()
            .position(|c| *c == format!("remove_container:{}", worker.id()))
            .unwrap();
        let removed_network = commands
            .iter()
            .position(|c| c.starts_with("remove_network:"))
            .unwrap();
        assert!(removed_container < removed_network);

        // the project network survives the test case
        assert_eq!(engine.live_networks(), 1);
        assert_eq!(test_case.state(), ScopeState::Closed);
    }

    #[test]
    fn test_case_hooks_bracket_provisioning() {
        let engine = Arc::new(MockEngine::new());
        let events = Arc::new(Mutex::new(Vec::<String>::new()));
        let before = events.clone();
        let after = events.clone();

        let desc = ProjectEnvDesc::new().test_case(
            TestCaseEnvDesc::new()
                .container("svc", ContainerDesc::new("alpine:latest"))
                .hooks(
                    Hooks::new()
                        .before_run(move |_, test_case| {
                            let test_case = test_case.expect("test case scope");
                            test_case.set("TOKEN", "from-hook");
                            before.lock().unwrap().push("before".into());
                            Ok(())
                        })
                        .after_run(move |_, test_case| {
                            let svc = test_case.and_then(|t| t.container("svc"));
                            after.lock().unwrap().push(format!("after:{}", svc.is_some()));
                            Ok(())
                        }),
                ),
        );
        let project = ProjectEnv::new(desc, engine);
        project.run().unwrap();

        let test_case = project.new_test_case();
        test_case.run().unwrap();

        assert_eq!(*events.lock().unwrap(), vec!["before", "after:true"]);
        assert_eq!(test_case.variables().get_string("TOKEN").unwrap(), "from-hook");
    }

    #[test]
    fn failed_close_does_not_block_project_close() {
        let engine = Arc::new(MockEngine::new());
        let project = ProjectEnv::new(desc(), engine.clone());
        project.run().unwrap();

        let test_case = project.new_test_case();
        test_case.set("TOKEN", "t");
        test_case.run().unwrap();
        let worker = test_case.container("worker").unwrap();

        engine.set_fail_on(&format!("remove_container:{}", worker.id()));
        let err = test_case.close().unwrap_err();
        assert!(err.to_string().contains(worker.id()));

        // the network removal was still attempted
        assert!(
            engine
                .get_commands()
                .iter()
                .any(|c| c.starts_with("remove_network:"))
        );

        engine.clear_failures();
        project.close().unwrap();
        assert_eq!(engine.live_containers(), 0);
        assert_eq!(engine.live_networks(), 0);
    }

    #[test]
    fn run_failure_is_closable() {
        let engine = Arc::new(MockEngine::new());
        let project = ProjectEnv::new(desc(), engine.clone());
        project.run().unwrap();

        // TOKEN unset
        let test_case = project.new_test_case();
        let err = test_case.run().unwrap_err();
        assert!(matches!(err, Error::Container { ref name, .. } if name == "worker"));
        assert!(test_case.network("private").is_some());

        test_case.close().unwrap();
        assert_eq!(engine.live_networks(), 1);
    }
}
