use super::resolver::{Resolver, StringsMap, resolve_map};
use crate::domain::engine::{CreateNetworkParams, NetworkInfo};
use crate::error::{Error, ResolveError, ScopeKind};
use crate::services::{ProjectEnv, TestCaseEnv};
use std::collections::BTreeMap;

/// Declarative network, created once per owning scope
#[derive(Debug, Clone, Default)]
pub struct NetworkDesc {
    pub driver: Option<String>,
    pub options: BTreeMap<String, String>,
    pub labels: StringsMap,
}

impl NetworkDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<Resolver>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub(crate) fn create(
        &self,
        project: &ProjectEnv,
        test_case: Option<&TestCaseEnv<'_>>,
    ) -> Result<NetworkInfo, Error> {
        let labels = resolve_map(&self.labels, "label", project, test_case)?;

        let network = project.client().create_network(&CreateNetworkParams {
            driver: self.driver.clone(),
            options: self.options.clone(),
            labels,
        })?;

        Ok(network)
    }
}

/// Names the network a container joins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkResolver {
    /// A network declared in `ProjectEnvDesc::networks`
    Project(String),
    /// A network declared in the test-case template; only valid while
    /// provisioning a test case
    TestCase(String),
}

impl NetworkResolver {
    pub fn project(name: impl Into<String>) -> Self {
        Self::Project(name.into())
    }

    pub fn test_case(name: impl Into<String>) -> Self {
        Self::TestCase(name.into())
    }

    /// Engine ID of the referenced network
    pub fn resolve(
        &self,
        project: &ProjectEnv,
        test_case: Option<&TestCaseEnv<'_>>,
    ) -> Result<String, ResolveError> {
        match self {
            Self::Project(name) => project
                .network(name)
                .map(|n| n.id)
                .ok_or_else(|| not_found(name, ScopeKind::Project)),
            Self::TestCase(name) => {
                let test_case = test_case.ok_or(ResolveError::OutsideTestCase("TestCaseNetwork"))?;
                test_case
                    .network(name)
                    .map(|n| n.id)
                    .ok_or_else(|| not_found(name, ScopeKind::TestCase))
            }
        }
    }
}

fn not_found(name: &str, scope: ScopeKind) -> ResolveError {
    ResolveError::NotFound {
        kind: "network",
        name: name.to_string(),
        scope,
    }
}

/// A network created by a scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub id: String,
    /// Key in the descriptor map
    pub name: String,
    /// Name assigned by the engine
    pub engine_name: String,
}
