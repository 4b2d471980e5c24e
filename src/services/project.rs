use super::scope::{Lifecycle, ScopeState};
use super::test_case::TestCaseEnv;
use crate::domain::{
    Container, EngineClient, Network, ProjectEnvDesc, Value, Variables,
};
use crate::error::{Error, Result, ScopeKind};
use crate::infra::{DockerCli, TrackedClient};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Long-lived environment shared by every test case of a project.
///
/// Owns the engine client: closing the project removes everything the
/// client still tracks, including resources leaked by test cases.
#[derive(Debug)]
pub struct ProjectEnv {
    client: TrackedClient,
    desc: Arc<ProjectEnvDesc>,
    networks: RwLock<BTreeMap<String, Network>>,
    containers: RwLock<BTreeMap<String, Container>>,
    variables: Variables,
    lifecycle: Lifecycle,
}

impl ProjectEnv {
    pub fn new(desc: ProjectEnvDesc, engine: Arc<dyn EngineClient>) -> Self {
        Self {
            client: TrackedClient::new(engine),
            desc: Arc::new(desc),
            networks: RwLock::new(BTreeMap::new()),
            containers: RwLock::new(BTreeMap::new()),
            variables: Variables::new(ScopeKind::Project),
            lifecycle: Lifecycle::new(ScopeKind::Project),
        }
    }

    /// Project backed by the local `docker` CLI
    pub fn docker(desc: ProjectEnvDesc) -> Self {
        Self::new(desc, Arc::new(DockerCli::default()))
    }

    /// Create every project network, then every project container
    pub fn run(&self) -> Result<()> {
        self.lifecycle.begin_run()?;
        self.create_networks()?;
        self.run_containers()?;
        Ok(())
    }

    /// Remove everything the engine client still tracks. Safe to call after
    /// a failed `run` or while test cases failed to close.
    pub fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }

        info!("Closing project environment");
        let result = self.client.cleanup();

        write(&self.containers).clear();
        write(&self.networks).clear();

        result.map_err(Error::from)
    }

    pub fn new_test_case(&self) -> TestCaseEnv<'_> {
        TestCaseEnv::new(self)
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

    pub fn desc(&self) -> &ProjectEnvDesc {
        &self.desc
    }

    pub fn client(&self) -> &TrackedClient {
        &self.client
    }

    fn create_networks(&self) -> Result<()> {
        for (name, desc) in &self.desc.networks {
            info!("Creating project network {name}");
            let network = desc.create(self, None).map_err(|e| Error::Network {
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
        for (name, desc) in &self.desc.containers {
            let wrap = |e: Error| Error::Container {
                name: name.clone(),
                source: Box::new(e),
            };

            info!("Creating project container {name}");
            let info = desc.start(self, None).map_err(wrap)?;
            info!("Created container {name} (ID: {})", info.id);

            write(&self.containers).insert(name.clone(), Container::new(name.clone(), info));
            desc.hooks.fire_after(self, None).map_err(wrap)?;
        }
        Ok(())
    }
}

pub(super) fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(super) fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
