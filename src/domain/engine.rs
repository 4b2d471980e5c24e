use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Host side of a published port
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct HostBinding {
    #[serde(rename = "HostIp", default)]
    pub host: String,
    #[serde(rename = "HostPort", default)]
    pub port: String,
}

/// A network the container joins, with its aliases there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub network_id: String,
    pub aliases: Vec<String>,
}

/// Fully resolved container parameters handed to the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContainerParams {
    pub image: String,
    pub cmd: Vec<String>,
    pub envs: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub exposed_ports: Vec<String>,
    /// The first attachment is joined at creation, the rest after start
    pub networks: Vec<NetworkAttachment>,
    /// Container port (`"80"` or `"80/tcp"`) to host bindings
    pub port_bindings: BTreeMap<String, Vec<HostBinding>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateNetworkParams {
    pub driver: Option<String>,
    pub options: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildImageParams {
    pub dockerfile: PathBuf,
    pub context_dir: PathBuf,
    pub labels: BTreeMap<String, String>,
    pub build_args: BTreeMap<String, String>,
}

/// Network as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NetworkSettings {
    /// Keyed by `"{port}/{protocol}"`; unpublished ports map to `None`
    #[serde(rename = "Ports", default, deserialize_with = "null_as_empty")]
    pub ports: BTreeMap<String, Option<Vec<HostBinding>>>,
}

// engines report `"Ports": null` for containers without a network namespace
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Container state as of the last inspect
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContainerInfo {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "NetworkSettings", default)]
    pub network_settings: Option<NetworkSettings>,
}
