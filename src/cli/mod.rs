pub mod check;
pub mod free_port;
pub mod up;

pub use check::CheckOptions;
pub use up::UpOptions;

use crate::domain::{Container, EngineClient};
use crate::infra::DockerCli;
use anyhow::{Result, bail};
use std::path::Path;
use std::sync::Arc;

/// Engine client for `binary`, failing early when it is not installed
pub fn engine(binary: &str) -> Result<Arc<dyn EngineClient>> {
    let cli = DockerCli::new(binary);
    if !cli.is_available() {
        bail!("Container engine '{binary}' not found or not responding to --version");
    }
    Ok(Arc::new(cli))
}

/// Directory relative build paths of `file` are resolved against
pub(crate) fn base_dir(file: &Path) -> &Path {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// One line per published port: `name  9999/tcp -> 0.0.0.0:49153`
pub(crate) fn published_ports(containers: &[Container]) -> Vec<String> {
    let mut lines = Vec::new();

    for container in containers {
        let ports = container
            .info
            .network_settings
            .as_ref()
            .map(|settings| &settings.ports);

        let mut published = false;
        for (container_port, bindings) in ports.into_iter().flatten() {
            for binding in bindings.iter().flatten() {
                published = true;
                lines.push(format!(
                    "{:<16} {container_port} -> {}:{}",
                    container.name, binding.host, binding.port
                ));
            }
        }

        if !published {
            lines.push(format!("{:<16} (no published ports)", container.name));
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine::{ContainerInfo, HostBinding, NetworkSettings};
    use std::collections::BTreeMap;

    #[test]
    fn base_dir_of_bare_file_is_cwd() {
        assert_eq!(base_dir(Path::new("testenv.toml")), Path::new("."));
        assert_eq!(base_dir(Path::new("suite/testenv.toml")), Path::new("suite"));
    }

    #[test]
    fn lists_published_ports() {
        let info = ContainerInfo {
            id: "c1".into(),
            name: "c1".into(),
            network_settings: Some(NetworkSettings {
                ports: BTreeMap::from([
                    (
                        "9999/tcp".to_string(),
                        Some(vec![HostBinding {
                            host: "0.0.0.0".into(),
                            port: "49153".into(),
                        }]),
                    ),
                    ("53/udp".to_string(), None),
                ]),
            }),
        };
        let lines = published_ports(&[
            Container::new("web", info),
            Container::new("idle", ContainerInfo::default()),
        ]);

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("web"));
        assert!(lines[0].ends_with("9999/tcp -> 0.0.0.0:49153"));
        assert!(lines[1].contains("no published ports"));
    }
}
