use crate::domain::EngineClient;
use crate::domain::engine::{
    BuildImageParams, ContainerInfo, CreateNetworkParams, HostBinding, NetworkInfo,
    NetworkSettings, RunContainerParams,
};
use crate::error::EngineError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::thread;
use std::time::Duration;

/// First host port handed out by publish-all
pub const FIRST_EPHEMERAL_PORT: u16 = 49153;

/// One `connect_network` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub network_id: String,
    pub container_id: String,
    pub aliases: Vec<String>,
}

/// In-memory engine recording every call
#[derive(Debug)]
pub struct MockEngine {
    containers: RwLock<HashMap<String, ContainerInfo>>,
    networks: RwLock<HashMap<String, NetworkInfo>>,
    created_containers: RwLock<Vec<RunContainerParams>>,
    created_networks: RwLock<Vec<CreateNetworkParams>>,
    built_images: RwLock<Vec<BuildImageParams>>,
    connections: RwLock<Vec<Connection>>,
    missing_images: RwLock<HashSet<String>>,
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<HashSet<String>>,
    build_delay: Mutex<Duration>,
    next_id: AtomicUsize,
    next_port: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            networks: RwLock::new(HashMap::new()),
            created_containers: RwLock::new(Vec::new()),
            created_networks: RwLock::new(Vec::new()),
            built_images: RwLock::new(Vec::new()),
            connections: RwLock::new(Vec::new()),
            missing_images: RwLock::new(HashSet::new()),
            commands: RwLock::new(Vec::new()),
            fail_on: RwLock::new(HashSet::new()),
            build_delay: Mutex::new(Duration::ZERO),
            next_id: AtomicUsize::new(1),
            next_port: AtomicUsize::new(FIRST_EPHEMERAL_PORT as usize),
        }
    }

    /// Fail every call of `operation` (e.g. `"remove_container"`), or only
    /// the call on one resource (`"remove_container:<id>"`)
    pub fn set_fail_on(&self, operation: &str) {
        self.fail_on.write().unwrap().insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_on.write().unwrap().clear();
    }

    /// `create_container` reports `NoSuchImage` until the image is pulled
    pub fn add_missing_image(&self, image: &str) {
        self.missing_images.write().unwrap().insert(image.to_string());
    }

    pub fn set_build_delay(&self, delay: Duration) {
        *self.build_delay.lock().unwrap() = delay;
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn created_containers(&self) -> Vec<RunContainerParams> {
        self.created_containers.read().unwrap().clone()
    }

    pub fn created_networks(&self) -> Vec<CreateNetworkParams> {
        self.created_networks.read().unwrap().clone()
    }

    pub fn built_images(&self) -> Vec<BuildImageParams> {
        self.built_images.read().unwrap().clone()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.connections.read().unwrap().clone()
    }

    pub fn build_count(&self) -> usize {
        self.count("build_image:")
    }

    pub fn live_containers(&self) -> usize {
        self.containers.read().unwrap().len()
    }

    pub fn live_networks(&self) -> usize {
        self.networks.read().unwrap().len()
    }

    fn count(&self, prefix: &str) -> usize {
        self.commands
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record_command(&self, operation: &str, arg: &str) {
        self.commands
            .write()
            .unwrap()
            .push(format!("{operation}:{arg}"));
    }

    fn check_fail(&self, operation: &str, arg: &str) -> Result<(), EngineError> {
        let fail_on = self.fail_on.read().unwrap();
        if fail_on.contains(operation) || fail_on.contains(&format!("{operation}:{arg}")) {
            return Err(EngineError::failed(
                format!("{operation} {arg}"),
                "mock failure",
            ));
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn next_port(&self) -> String {
        self.next_port.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn publish(&self, params: &RunContainerParams) -> NetworkSettings {
        let mut ports: BTreeMap<String, Option<Vec<HostBinding>>> = BTreeMap::new();

        for (container_port, bindings) in &params.port_bindings {
            let bindings = bindings
                .iter()
                .map(|b| HostBinding {
                    host: b.host.clone(),
                    port: if b.port.is_empty() {
                        self.next_port()
                    } else {
                        b.port.clone()
                    },
                })
                .collect();
            ports.insert(with_protocol(container_port), Some(bindings));
        }

        for port in &params.exposed_ports {
            ports.entry(with_protocol(port)).or_insert_with(|| {
                Some(vec![HostBinding {
                    host: "0.0.0.0".into(),
                    port: self.next_port(),
                }])
            });
        }

        NetworkSettings { ports }
    }
}

fn with_protocol(port: &str) -> String {
    if port.contains('/') {
        port.to_string()
    } else {
        format!("{port}/tcp")
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineClient for MockEngine {
    fn create_container(&self, params: &RunContainerParams) -> Result<String, EngineError> {
        self.record_command("create_container", &params.image);
        self.check_fail("create_container", &params.image)?;

        if self.missing_images.read().unwrap().contains(&params.image) {
            return Err(EngineError::NoSuchImage(params.image.clone()));
        }

        let id = self.next_id("container-");
        let info = ContainerInfo {
            id: id.clone(),
            name: format!("/{id}"),
            network_settings: Some(self.publish(params)),
        };
        self.containers.write().unwrap().insert(id.clone(), info);
        self.created_containers.write().unwrap().push(params.clone());
        Ok(id)
    }

    fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.record_command("start_container", id);
        self.check_fail("start_container", id)
    }

    fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<(), EngineError> {
        let arg = format!("{network_id}:{container_id}");
        self.record_command("connect_network", &arg);
        self.check_fail("connect_network", &arg)?;
        self.connections.write().unwrap().push(Connection {
            network_id: network_id.to_string(),
            container_id: container_id.to_string(),
            aliases: aliases.to_vec(),
        });
        Ok(())
    }

    fn inspect_container(&self, id: &str) -> Result<ContainerInfo, EngineError> {
        self.record_command("inspect_container", id);
        self.check_fail("inspect_container", id)?;

        self.containers
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::failed(format!("inspecting container {id}"), "no such container"))
    }

    fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        self.record_command("remove_container", id);
        self.check_fail("remove_container", id)?;
        self.containers.write().unwrap().remove(id);
        Ok(())
    }

    fn create_network(&self, params: &CreateNetworkParams) -> Result<NetworkInfo, EngineError> {
        let id = self.next_id("network-");
        self.record_command("create_network", &id);
        self.check_fail("create_network", &id)?;

        let network = NetworkInfo {
            id: id.clone(),
            name: format!("testenv-{id}"),
        };
        self.networks.write().unwrap().insert(id, network.clone());
        self.created_networks.write().unwrap().push(params.clone());
        Ok(network)
    }

    fn remove_network(&self, id: &str) -> Result<(), EngineError> {
        self.record_command("remove_network", id);
        self.check_fail("remove_network", id)?;
        self.networks.write().unwrap().remove(id);
        Ok(())
    }

    fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        self.record_command("pull_image", reference);
        self.check_fail("pull_image", reference)?;
        self.missing_images.write().unwrap().remove(reference);
        Ok(())
    }

    fn build_image(&self, params: &BuildImageParams) -> Result<String, EngineError> {
        let dockerfile = params.dockerfile.display().to_string();
        self.record_command("build_image", &dockerfile);

        let delay = *self.build_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.check_fail("build_image", &dockerfile)?;

        self.built_images.write().unwrap().push(params.clone());
        Ok(self.next_id("image-"))
    }

    fn remove_image(&self, id: &str) -> Result<(), EngineError> {
        self.record_command("remove_image", id);
        self.check_fail("remove_image", id)
    }
}
