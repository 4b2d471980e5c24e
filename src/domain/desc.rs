use super::container::{ContainerDesc, Hooks};
use super::network::NetworkDesc;
use std::collections::BTreeMap;

/// Template for everything a project provisions.
///
/// Maps are keyed by the name used to look resources up later; creation
/// follows key order.
#[derive(Debug, Clone, Default)]
pub struct ProjectEnvDesc {
    pub networks: BTreeMap<String, NetworkDesc>,
    pub containers: BTreeMap<String, ContainerDesc>,
    /// Provisioned by every `TestCaseEnv` derived from the project
    pub test_case: TestCaseEnvDesc,
}

impl ProjectEnvDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network(mut self, name: impl Into<String>, desc: NetworkDesc) -> Self {
        self.networks.insert(name.into(), desc);
        self
    }

    pub fn container(mut self, name: impl Into<String>, desc: ContainerDesc) -> Self {
        self.containers.insert(name.into(), desc);
        self
    }

    pub fn test_case(mut self, desc: TestCaseEnvDesc) -> Self {
        self.test_case = desc;
        self
    }
}

/// Template for one test case. Names live in their own namespace, separate
/// from the project's.
#[derive(Debug, Clone, Default)]
pub struct TestCaseEnvDesc {
    pub networks: BTreeMap<String, NetworkDesc>,
    pub containers: BTreeMap<String, ContainerDesc>,
    pub hooks: Hooks,
}

impl TestCaseEnvDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network(mut self, name: impl Into<String>, desc: NetworkDesc) -> Self {
        self.networks.insert(name.into(), desc);
        self
    }

    pub fn container(mut self, name: impl Into<String>, desc: ContainerDesc) -> Self {
        self.containers.insert(name.into(), desc);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }
}
