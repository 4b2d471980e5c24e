use super::auth::AuthConfigs;
use crate::domain::EngineClient;
use crate::domain::engine::{
    BuildImageParams, ContainerInfo, CreateNetworkParams, NetworkInfo, RunContainerParams,
};
use crate::error::EngineError;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;
use uuid::Uuid;

const NAME_PREFIX: &str = "testenv";

/// Engine client shelling out to the `docker` command line
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    config_dir: Option<PathBuf>,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            config_dir: None,
        }
    }

    /// Use `dir` instead of the default client config directory
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Whether the engine binary answers `--version`
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn docker<I, S>(&self, args: I, action: &str) -> Result<String, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        if let Some(dir) = &self.config_dir {
            cmd.arg("--config").arg(dir);
        }
        cmd.args(args);
        debug!(?cmd, "Running engine command");

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| EngineError::failed(action, format!("running {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.binary, output.status)
            } else {
                stderr
            };
            return Err(EngineError::failed(action, message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl EngineClient for DockerCli {
    fn create_container(&self, params: &RunContainerParams) -> Result<String, EngineError> {
        self.docker(create_args(params), &format!("creating container from {}", params.image))
            .map_err(|e| match e {
                EngineError::Failed { ref message, .. } if is_no_such_image(message) => {
                    EngineError::NoSuchImage(params.image.clone())
                }
                other => other,
            })
    }

    fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker(["start", id], &format!("starting container {id}"))
            .map(drop)
    }

    fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<(), EngineError> {
        let mut args = vec!["network".to_string(), "connect".to_string()];
        for alias in aliases {
            args.push("--alias".into());
            args.push(alias.clone());
        }
        args.push(network_id.into());
        args.push(container_id.into());

        self.docker(
            args,
            &format!("connecting container {container_id} to network {network_id}"),
        )
        .map(drop)
    }

    fn inspect_container(&self, id: &str) -> Result<ContainerInfo, EngineError> {
        let action = format!("inspecting container {id}");
        let output = self.docker(["container", "inspect", id], &action)?;
        parse_inspect(&output).map_err(|e| EngineError::failed(action, e))
    }

    fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker(["rm", "-f", "-v", id], &format!("removing container {id}"))
            .map(drop)
    }

    fn create_network(&self, params: &CreateNetworkParams) -> Result<NetworkInfo, EngineError> {
        let name = unique_name();
        let id = self.docker(network_args(params, &name), &format!("creating network {name}"))?;
        Ok(NetworkInfo { id, name })
    }

    fn remove_network(&self, id: &str) -> Result<(), EngineError> {
        self.docker(["network", "rm", id], &format!("removing network {id}"))
            .map(drop)
    }

    /// The docker binary authenticates from its own config; the lookup here
    /// only logs which registry entry applies and never fails the pull.
    fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        match AuthConfigs::load(self.config_dir.as_deref()) {
            Ok(auth) => match auth.registry_for(reference) {
                Some(registry) => debug!(reference, registry, "Pulling with stored credentials"),
                None => debug!(reference, "Pulling anonymously"),
            },
            Err(e) => debug!(reference, "Ignoring unreadable registry config: {e}"),
        }

        self.docker(["pull", "-q", reference], &format!("pulling image {reference}"))
            .map(drop)
    }

    fn build_image(&self, params: &BuildImageParams) -> Result<String, EngineError> {
        let tag = unique_name();
        self.docker(
            build_args(params, &tag),
            &format!("building image from {}", params.dockerfile.display()),
        )?;
        Ok(tag)
    }

    fn remove_image(&self, id: &str) -> Result<(), EngineError> {
        self.docker(["rmi", "-f", id], &format!("removing image {id}"))
            .map(drop)
    }
}

fn unique_name() -> String {
    format!("{NAME_PREFIX}-{}", Uuid::new_v4().simple())
}

fn create_args(params: &RunContainerParams) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "create".into(),
        "--pull".into(),
        "never".into(),
        "--publish-all".into(),
    ];

    for (key, value) in &params.labels {
        args.push("--label".into());
        args.push(format!("{key}={value}"));
    }

    for (key, value) in &params.envs {
        args.push("--env".into());
        args.push(format!("{key}={value}"));
    }

    for port in &params.exposed_ports {
        args.push("--expose".into());
        args.push(port.clone());
    }

    for (container_port, bindings) in &params.port_bindings {
        for binding in bindings {
            args.push("--publish".into());
            args.push(publish_spec(&binding.host, &binding.port, container_port));
        }
    }

    if let Some(first) = params.networks.first() {
        args.push("--network".into());
        args.push(first.network_id.clone());
        for alias in &first.aliases {
            args.push("--network-alias".into());
            args.push(alias.clone());
        }
    }

    args.push(params.image.clone());
    args.extend(params.cmd.iter().cloned());
    args
}

/// `host:port:cport`, with empty parts letting the engine choose
fn publish_spec(host: &str, port: &str, container_port: &str) -> String {
    match (host.is_empty(), port.is_empty()) {
        (true, true) => container_port.to_string(),
        (true, false) => format!("{port}:{container_port}"),
        (false, true) => format!("{host}::{container_port}"),
        (false, false) => format!("{host}:{port}:{container_port}"),
    }
}

fn network_args(params: &CreateNetworkParams, name: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["network".into(), "create".into()];

    if let Some(driver) = &params.driver {
        args.push("--driver".into());
        args.push(driver.clone());
    }
    for (key, value) in &params.options {
        args.push("--opt".into());
        args.push(format!("{key}={value}"));
    }
    for (key, value) in &params.labels {
        args.push("--label".into());
        args.push(format!("{key}={value}"));
    }

    args.push(name.into());
    args
}

fn build_args(params: &BuildImageParams, tag: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "build".into(),
        "-q".into(),
        "-t".into(),
        tag.into(),
        "-f".into(),
        params.dockerfile.clone().into_os_string(),
    ];

    for (key, value) in &params.labels {
        args.push("--label".into());
        args.push(format!("{key}={value}").into());
    }
    for (key, value) in &params.build_args {
        args.push("--build-arg".into());
        args.push(format!("{key}={value}").into());
    }

    args.push(params.context_dir.clone().into_os_string());
    args
}

fn is_no_such_image(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    ["no such image", "unable to find image", "image not known"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

fn parse_inspect(output: &str) -> Result<ContainerInfo, String> {
    let mut infos: Vec<ContainerInfo> =
        serde_json::from_str(output).map_err(|e| format!("malformed inspect output: {e}"))?;
    if infos.is_empty() {
        return Err("inspect returned no containers".into());
    }

    let mut info = infos.swap_remove(0);
    info.name = info.name.trim_start_matches('/').to_string();
    Ok(info)
}
