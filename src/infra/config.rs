use crate::domain::{
    ContainerDesc, EngineClient, ImageDesc, ImageResolver, NetworkDesc, NetworkResolver,
    PortBinding, ProjectEnvDesc, Resolver, TestCaseEnvDesc,
};
use crate::services::ProjectEnv;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_ENV_FILE: &str = "testenv.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Yaml,
}

impl FileFormat {
    /// `.yaml`/`.yml` are YAML, anything else TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Toml,
        }
    }
}

/// A configuration value: a literal or a lazily resolved lookup
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ValueConfig {
    Literal(String),
    Integer(i64),
    Env { env: String },
    ProjectVar { project_var: String },
    TestCaseVar { test_case_var: String },
}

impl ValueConfig {
    fn is_test_case_var(&self) -> bool {
        matches!(self, Self::TestCaseVar { .. })
    }
}

impl From<&ValueConfig> for Resolver {
    fn from(value: &ValueConfig) -> Self {
        match value {
            ValueConfig::Literal(s) => Resolver::value(s.clone()),
            ValueConfig::Integer(n) => Resolver::value(n.to_string()),
            ValueConfig::Env { env } => Resolver::env(env.clone()),
            ValueConfig::ProjectVar { project_var } => Resolver::project_var(project_var.clone()),
            ValueConfig::TestCaseVar { test_case_var } => {
                Resolver::test_case_var(test_case_var.clone())
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub driver: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, ValueConfig>,
}

/// `{ project = "name" }` or `{ test_case = "name" }`, with an optional alias
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkRefConfig {
    pub project: Option<String>,
    pub test_case: Option<String>,
    pub alias: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default = "default_dockerfile")]
    pub dockerfile: PathBuf,
    #[serde(default = "default_context")]
    pub context: PathBuf,
    #[serde(default)]
    pub labels: BTreeMap<String, ValueConfig>,
    #[serde(default)]
    pub build_args: BTreeMap<String, ValueConfig>,
}

fn default_dockerfile() -> PathBuf {
    PathBuf::from("Dockerfile")
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PortBindingConfig {
    pub host: Option<ValueConfig>,
    pub port: Option<ValueConfig>,
    pub container_port: ValueConfig,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ContainerConfig {
    pub image: Option<String>,
    pub build: Option<BuildConfig>,
    #[serde(default)]
    pub env: BTreeMap<String, ValueConfig>,
    #[serde(default)]
    pub labels: BTreeMap<String, ValueConfig>,
    #[serde(default)]
    pub exposed_ports: Vec<ValueConfig>,
    #[serde(default)]
    pub port_bindings: Vec<PortBindingConfig>,
    #[serde(default)]
    pub networks: Vec<NetworkRefConfig>,
    #[serde(default)]
    pub cmd: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TestCaseConfig {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerConfig>,
}

/// A project environment described in a TOML or YAML file
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvFile {
    /// Constant project variables set before `run`
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Project variables filled with free host ports before `run`
    #[serde(default)]
    pub free_ports: Vec<String>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerConfig>,
    #[serde(default)]
    pub test_case: TestCaseConfig,
}

/// A validated file, ready to become a `ProjectEnv`
#[derive(Debug)]
pub struct EnvPlan {
    pub desc: ProjectEnvDesc,
    pub variables: BTreeMap<String, String>,
    pub free_ports: Vec<String>,
}

impl EnvFile {
    pub fn parse(content: &str, format: FileFormat) -> Result<Self> {
        match format {
            FileFormat::Toml => toml::from_str(content).context("parsing TOML"),
            FileFormat::Yaml => serde_yml::from_str(content).context("parsing YAML"),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let file = Self::parse(&content, FileFormat::from_path(path))
            .with_context(|| format!("loading {}", path.display()))?;
        file.validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        for name in self
            .variables
            .keys()
            .chain(&self.free_ports)
            .chain(self.networks.keys())
            .chain(self.containers.keys())
            .chain(self.test_case.networks.keys())
            .chain(self.test_case.containers.keys())
        {
            validate_name(name)?;
        }

        for key in &self.free_ports {
            if self.variables.contains_key(key) {
                bail!("Variable '{key}' is set in both 'variables' and 'free_ports'");
            }
        }

        for (name, container) in &self.containers {
            self.validate_container(name, container, false)?;
        }
        for (name, container) in &self.test_case.containers {
            self.validate_container(name, container, true)?;
        }

        Ok(())
    }

    fn validate_container(
        &self,
        name: &str,
        container: &ContainerConfig,
        in_test_case: bool,
    ) -> Result<()> {
        match (&container.image, &container.build) {
            (Some(_), Some(_)) => bail!("Container '{name}' sets both 'image' and 'build'"),
            (Some(image), None) if image.trim().is_empty() => {
                bail!("Container '{name}' has an empty 'image'")
            }
            _ => {}
        }

        for net in &container.networks {
            match (&net.project, &net.test_case) {
                (Some(network), None) => {
                    if !self.networks.contains_key(network) {
                        bail!("Container '{name}' references unknown project network '{network}'");
                    }
                }
                (None, Some(network)) => {
                    if !in_test_case {
                        bail!("Project container '{name}' can't join test case network '{network}'");
                    }
                    if !self.test_case.networks.contains_key(network) {
                        bail!("Container '{name}' references unknown test case network '{network}'");
                    }
                }
                _ => bail!(
                    "Container '{name}': each network needs exactly one of 'project' or 'test_case'"
                ),
            }
        }

        if !in_test_case {
            let port_values = container.port_bindings.iter().flat_map(|binding| {
                binding
                    .host
                    .iter()
                    .chain(&binding.port)
                    .chain(std::iter::once(&binding.container_port))
            });
            let build_values = container
                .build
                .iter()
                .flat_map(|build| build.labels.values().chain(build.build_args.values()));
            let uses_test_case_var = container
                .env
                .values()
                .chain(container.labels.values())
                .chain(&container.exposed_ports)
                .chain(port_values)
                .chain(build_values)
                .any(ValueConfig::is_test_case_var);
            if uses_test_case_var {
                bail!("Project container '{name}' can't use 'test_case_var'");
            }
        }

        Ok(())
    }

    /// Build the descriptors. Relative build paths are taken from `base_dir`.
    pub fn plan(&self, base_dir: &Path) -> Result<EnvPlan> {
        let mut desc = ProjectEnvDesc::new();
        for (name, network) in &self.networks {
            desc = desc.network(name.clone(), network_desc(network));
        }
        for (name, container) in &self.containers {
            desc = desc.container(name.clone(), container_desc(name, container, base_dir)?);
        }

        let mut test_case = TestCaseEnvDesc::new();
        for (name, network) in &self.test_case.networks {
            test_case = test_case.network(name.clone(), network_desc(network));
        }
        for (name, container) in &self.test_case.containers {
            test_case = test_case.container(name.clone(), container_desc(name, container, base_dir)?);
        }

        Ok(EnvPlan {
            desc: desc.test_case(test_case),
            variables: self.variables.clone(),
            free_ports: self.free_ports.clone(),
        })
    }
}

impl EnvPlan {
    /// Create the project and seed its variables, including free ports.
    /// The project is not run yet.
    pub fn into_project(self, engine: Arc<dyn EngineClient>) -> Result<ProjectEnv> {
        let project = ProjectEnv::new(self.desc, engine);

        for (key, value) in self.variables {
            project.set(key, value);
        }

        if let Err(e) = seed_free_ports(&project, self.free_ports) {
            if let Err(close_err) = project.close() {
                warn!("Failed to clean up after free port discovery: {close_err}");
            }
            return Err(e);
        }

        Ok(project)
    }
}

fn seed_free_ports(project: &ProjectEnv, keys: Vec<String>) -> Result<()> {
    for key in keys {
        let port = project
            .find_free_host_port()
            .with_context(|| format!("finding a free port for '{key}'"))?;
        info!("Stored free port {port} in '{key}'");
        project.set(key, port);
    }
    Ok(())
}

/// Same rules as container names: alphanumeric start, then `[A-Za-z0-9_.-]`
fn validate_name(name: &str) -> Result<()> {
    let Some(first_char) = name.chars().next() else {
        bail!("Empty name found");
    };

    if !first_char.is_ascii_alphanumeric() {
        bail!("Name '{name}' must start with a letter or digit");
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '.' && c != '-' {
            bail!("Name '{name}' contains invalid character '{c}'");
        }
    }

    Ok(())
}

fn network_desc(config: &NetworkConfig) -> NetworkDesc {
    let mut desc = NetworkDesc::new();
    if let Some(driver) = &config.driver {
        desc = desc.driver(driver.clone());
    }
    for (key, value) in &config.options {
        desc = desc.option(key.clone(), value.clone());
    }
    for (key, value) in &config.labels {
        desc = desc.label(key.clone(), Resolver::from(value));
    }
    desc
}

fn container_desc(name: &str, config: &ContainerConfig, base_dir: &Path) -> Result<ContainerDesc> {
    let image = match (&config.image, &config.build) {
        (_, Some(build)) => ImageResolver::build(image_desc(build, base_dir)?),
        (Some(image), None) => ImageResolver::external(image.clone()),
        (None, None) => ImageResolver::default(),
    };

    let mut desc = ContainerDesc::new(image).cmd(config.cmd.iter().cloned());

    for (key, value) in &config.env {
        desc = desc.env(key.clone(), Resolver::from(value));
    }
    for (key, value) in &config.labels {
        desc = desc.label(key.clone(), Resolver::from(value));
    }
    for port in &config.exposed_ports {
        desc = desc.expose(Resolver::from(port));
    }
    for binding in &config.port_bindings {
        desc = desc.port_binding(PortBinding::new(
            binding.host.as_ref().map(Resolver::from).unwrap_or_else(|| Resolver::value("")),
            binding.port.as_ref().map(Resolver::from).unwrap_or_else(|| Resolver::value("")),
            Resolver::from(&binding.container_port),
        ));
    }
    for net in &config.networks {
        let network = match (&net.project, &net.test_case) {
            (Some(network), _) => NetworkResolver::project(network.clone()),
            (None, Some(network)) => NetworkResolver::test_case(network.clone()),
            (None, None) => bail!("Container '{name}' has a network without 'project' or 'test_case'"),
        };
        desc = match &net.alias {
            Some(alias) => desc.network_with_alias(network, alias.clone()),
            None => desc.network(network),
        };
    }

    Ok(desc)
}

fn image_desc(config: &BuildConfig, base_dir: &Path) -> Result<ImageDesc> {
    let context_dir = expand_path(&config.context, base_dir)?;
    let dockerfile = expand_path(&config.dockerfile, &context_dir)?;

    let mut desc = ImageDesc::new(dockerfile, context_dir);
    for (key, value) in &config.labels {
        desc = desc.label(key.clone(), Resolver::from(value));
    }
    for (key, value) in &config.build_args {
        desc = desc.build_arg(key.clone(), Resolver::from(value));
    }
    Ok(desc)
}

/// Expand `~` and `$VARS`, then anchor relative paths at `base_dir`
fn expand_path(path: &Path, base_dir: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(path.to_string_lossy().as_ref())
        .with_context(|| format!("expanding {}", path.display()))?
        .into_owned();
    let expanded = PathBuf::from(expanded);

    Ok(if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    })
}
