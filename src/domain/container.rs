use super::image::ImageResolver;
use super::network::NetworkResolver;
use super::resolver::{Resolver, StringsMap, resolve_map};
use crate::domain::engine::{ContainerInfo, HostBinding, NetworkAttachment, RunContainerParams};
use crate::error::{Error, ResolveError};
use crate::services::{ProjectEnv, TestCaseEnv};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Callback fired around provisioning. `test_case` is `None` in project scope.
pub type HookFn =
    Arc<dyn Fn(&ProjectEnv, Option<&TestCaseEnv<'_>>) -> anyhow::Result<()> + Send + Sync>;

/// Optional callbacks around a container or a whole test case
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_run: Option<HookFn>,
    pub after_run: Option<HookFn>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_run<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProjectEnv, Option<&TestCaseEnv<'_>>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before_run = Some(Arc::new(f));
        self
    }

    pub fn after_run<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProjectEnv, Option<&TestCaseEnv<'_>>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.after_run = Some(Arc::new(f));
        self
    }

    pub(crate) fn fire_before(
        &self,
        project: &ProjectEnv,
        test_case: Option<&TestCaseEnv<'_>>,
    ) -> Result<(), Error> {
        fire(self.before_run.as_ref(), "BeforeRun", project, test_case)
    }

    pub(crate) fn fire_after(
        &self,
        project: &ProjectEnv,
        test_case: Option<&TestCaseEnv<'_>>,
    ) -> Result<(), Error> {
        fire(self.after_run.as_ref(), "AfterRun", project, test_case)
    }
}

fn fire(
    hook: Option<&HookFn>,
    name: &'static str,
    project: &ProjectEnv,
    test_case: Option<&TestCaseEnv<'_>>,
) -> Result<(), Error> {
    match hook {
        Some(hook) => hook(project, test_case).map_err(|e| Error::hook(name, e)),
        None => Ok(()),
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_run", &self.before_run.is_some())
            .field("after_run", &self.after_run.is_some())
            .finish()
    }
}

/// Host address, host port and container port of one published port
#[derive(Debug, Clone)]
pub struct PortBinding {
    pub host: Resolver,
    pub port: Resolver,
    pub container_port: Resolver,
}

impl PortBinding {
    pub fn new(
        host: impl Into<Resolver>,
        port: impl Into<Resolver>,
        container_port: impl Into<Resolver>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            container_port: container_port.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerNetwork {
    pub network: NetworkResolver,
    pub alias: Option<String>,
}

/// Declarative container
#[derive(Debug, Clone, Default)]
pub struct ContainerDesc {
    pub image: ImageResolver,
    pub envs: StringsMap,
    pub labels: StringsMap,
    pub exposed_ports: Vec<Resolver>,
    pub port_bindings: Vec<PortBinding>,
    pub networks: Vec<ContainerNetwork>,
    pub cmd: Vec<String>,
    pub hooks: Hooks,
}

impl ContainerDesc {
    pub fn new(image: impl Into<ImageResolver>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<Resolver>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<Resolver>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn expose(mut self, port: impl Into<Resolver>) -> Self {
        self.exposed_ports.push(port.into());
        self
    }

    pub fn port_binding(mut self, binding: PortBinding) -> Self {
        self.port_bindings.push(binding);
        self
    }

    pub fn network(mut self, network: NetworkResolver) -> Self {
        self.networks.push(ContainerNetwork {
            network,
            alias: None,
        });
        self
    }

    pub fn network_with_alias(mut self, network: NetworkResolver, alias: impl Into<String>) -> Self {
        self.networks.push(ContainerNetwork {
            network,
            alias: Some(alias.into()),
        });
        self
    }

    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// `start` followed by the `after_run` hook
    pub(crate) fn run(
        &self,
        project: &ProjectEnv,
        test_case: Option<&TestCaseEnv<'_>>,
    ) -> Result<ContainerInfo, Error> {
        let info = self.start(project, test_case)?;
        self.hooks.fire_after(project, test_case)?;
        Ok(info)
    }

    /// Fire `before_run`, resolve everything, then create, start, connect
    /// and inspect the container. The container is tracked by the client as
    /// soon as the engine created it, so a later failure leaves it to scope
    /// teardown.
    pub(crate) fn start(
        &self,
        project: &ProjectEnv,
        test_case: Option<&TestCaseEnv<'_>>,
    ) -> Result<ContainerInfo, Error> {
        self.hooks.fire_before(project, test_case)?;

        let image = self.image.resolve(project, test_case)?;

        let mut networks: Vec<NetworkAttachment> = Vec::with_capacity(self.networks.len());
        for attachment in &self.networks {
            let network_id = attachment
                .network
                .resolve(project, test_case)
                .map_err(|e| Error::resolve("network", e))?;

            let aliases = attachment.alias.iter().cloned();
            match networks.iter_mut().find(|n| n.network_id == network_id) {
                Some(existing) => existing.aliases.extend(aliases),
                None => networks.push(NetworkAttachment {
                    network_id,
                    aliases: aliases.collect(),
                }),
            }
        }

        let labels = resolve_map(&self.labels, "label", project, test_case)?;
        let envs = resolve_map(&self.envs, "env", project, test_case)?;

        let mut port_bindings: BTreeMap<String, Vec<HostBinding>> = BTreeMap::new();
        for (i, binding) in self.port_bindings.iter().enumerate() {
            let field = |part: &str, e: ResolveError| {
                Error::resolve(format!("port binding #{i} {part}"), e)
            };
            let host = binding
                .host
                .resolve(project, test_case)
                .map_err(|e| field("host", e))?;
            let port = binding
                .port
                .resolve(project, test_case)
                .map_err(|e| field("port", e))?;
            let container_port = binding
                .container_port
                .resolve(project, test_case)
                .map_err(|e| field("container port", e))?;

            port_bindings
                .entry(container_port)
                .or_default()
                .push(HostBinding { host, port });
        }

        let exposed_ports = self
            .exposed_ports
            .iter()
            .enumerate()
            .map(|(i, resolver)| {
                resolver
                    .resolve(project, test_case)
                    .map_err(|e| Error::resolve(format!("exposed port #{i}"), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(%image, networks = networks.len(), "Resolved container parameters");

        let info = project.client().run_container(&RunContainerParams {
            image,
            cmd: self.cmd.clone(),
            envs,
            labels,
            exposed_ports,
            networks,
            port_bindings,
        })?;

        Ok(info)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortProtocol {
    Tcp,
    Udp,
}

impl fmt::Display for PortProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// A container created by a scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Key in the descriptor map
    pub name: String,
    pub info: ContainerInfo,
}

impl Container {
    pub fn new(name: impl Into<String>, info: ContainerInfo) -> Self {
        Self {
            name: name.into(),
            info,
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Host port the engine published `port/protocol` on, from the state
    /// fetched right after start. Never calls the engine.
    pub fn host_port(&self, port: &str, protocol: PortProtocol) -> Option<String> {
        let settings = self.info.network_settings.as_ref()?;
        let bindings = settings.ports.get(&format!("{port}/{protocol}"))?.as_ref()?;
        bindings.first().map(|b| b.port.clone())
    }
}
