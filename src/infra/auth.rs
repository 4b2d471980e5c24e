use crate::error::EngineError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const DOCKER_HUB: &str = "docker.io";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AuthEntry {
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default, rename = "identitytoken")]
    pub identity_token: Option<String>,
}

/// Registry credentials from the engine client's `config.json`
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AuthConfigs {
    #[serde(default)]
    pub auths: BTreeMap<String, AuthEntry>,
    #[serde(default, rename = "credHelpers")]
    pub cred_helpers: BTreeMap<String, String>,
    #[serde(default, rename = "credsStore")]
    pub creds_store: Option<String>,
}

impl AuthConfigs {
    /// `$DOCKER_CONFIG`, else `~/.docker`
    pub fn default_dir() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
            return Some(PathBuf::from(dir));
        }
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".docker"))
    }

    /// Load `config.json` from `dir` (or the default location). A missing
    /// file yields empty credentials; a malformed one is an error.
    pub fn load(dir: Option<&Path>) -> Result<Self, EngineError> {
        let Some(dir) = dir.map(Path::to_path_buf).or_else(Self::default_dir) else {
            return Ok(Self::default());
        };
        let path = dir.join("config.json");

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(EngineError::failed(
                    format!("reading registry credentials from {}", path.display()),
                    e,
                ));
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            EngineError::failed(
                format!("parsing registry credentials from {}", path.display()),
                e,
            )
        })
    }

    /// Registry entry holding credentials for `image`, if any
    pub fn registry_for(&self, image: &str) -> Option<&str> {
        let registry = image_registry(image);

        self.auths
            .keys()
            .chain(self.cred_helpers.keys())
            .map(String::as_str)
            .find(|server| {
                let host = server_host(server);
                image.starts_with(host) || host == registry
            })
    }

    pub fn is_empty(&self) -> bool {
        self.auths.is_empty() && self.cred_helpers.is_empty() && self.creds_store.is_none()
    }
}

/// Registry host of an image reference, `docker.io` when it has none
fn image_registry(image: &str) -> &str {
    match image.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first
        }
        _ => DOCKER_HUB,
    }
}

/// `https://index.docker.io/v1/` -> `docker.io`
fn server_host(server: &str) -> &str {
    let server = server
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = server.split('/').next().unwrap_or(server);
    match host {
        "index.docker.io" | "registry-1.docker.io" => DOCKER_HUB,
        other => other,
    }
}
