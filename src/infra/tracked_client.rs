use crate::domain::EngineClient;
use crate::domain::engine::{
    BuildImageParams, ContainerInfo, CreateNetworkParams, NetworkInfo, RunContainerParams,
};
use crate::error::{AggregateError, EngineError, ResourceKind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// IDs of everything created through a `TrackedClient` and not yet removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedResources {
    pub containers: Vec<String>,
    pub networks: Vec<String>,
    pub images: Vec<String>,
}

/// Engine client that remembers what it created so `cleanup` can reverse it.
///
/// Clones share the same engine and bookkeeping.
#[derive(Debug, Clone)]
pub struct TrackedClient {
    engine: Arc<dyn EngineClient>,
    tracked: Arc<Mutex<TrackedResources>>,
}

impl TrackedClient {
    pub fn new(engine: Arc<dyn EngineClient>) -> Self {
        Self {
            engine,
            tracked: Arc::new(Mutex::new(TrackedResources::default())),
        }
    }

    pub fn engine(&self) -> &Arc<dyn EngineClient> {
        &self.engine
    }

    /// Snapshot of the resources still tracked
    pub fn tracked(&self) -> TrackedResources {
        self.lock().clone()
    }

    /// Create and start a container, then connect its extra networks and
    /// inspect it. A missing image is pulled once and creation retried once.
    pub fn run_container(&self, params: &RunContainerParams) -> Result<ContainerInfo, EngineError> {
        let id = match self.engine.create_container(params) {
            Ok(id) => id,
            Err(EngineError::NoSuchImage(_)) => {
                info!(image = %params.image, "Image not found locally, pulling");
                self.pull_image(&params.image)?;
                self.engine.create_container(params)?
            }
            Err(e) => return Err(e),
        };
        self.lock().containers.push(id.clone());
        debug!(%id, image = %params.image, "Created container");

        self.engine.start_container(&id)?;

        for attachment in params.networks.iter().skip(1) {
            self.engine
                .connect_network(&attachment.network_id, &id, &attachment.aliases)?;
        }

        self.engine.inspect_container(&id)
    }

    pub fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        self.engine.remove_container(id)?;
        self.lock().containers.retain(|c| c != id);
        Ok(())
    }

    pub fn create_network(&self, params: &CreateNetworkParams) -> Result<NetworkInfo, EngineError> {
        let network = self.engine.create_network(params)?;
        self.lock().networks.push(network.id.clone());
        Ok(network)
    }

    pub fn remove_network(&self, id: &str) -> Result<(), EngineError> {
        self.engine.remove_network(id)?;
        self.lock().networks.retain(|n| n != id);
        Ok(())
    }

    pub fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        self.engine.pull_image(reference)
    }

    pub fn build_image(&self, params: &BuildImageParams) -> Result<String, EngineError> {
        let image = self.engine.build_image(params)?;
        self.lock().images.push(image.clone());
        Ok(image)
    }

    pub fn remove_image(&self, id: &str) -> Result<(), EngineError> {
        self.engine.remove_image(id)?;
        self.lock().images.retain(|i| i != id);
        Ok(())
    }

    /// Remove every tracked container, then network, then built image.
    /// Each gets exactly one attempt; all failures are returned together.
    pub fn cleanup(&self) -> Result<(), AggregateError> {
        let TrackedResources {
            containers,
            networks,
            images,
        } = self.tracked();
        let mut failures = AggregateError::default();

        for id in containers {
            self.sweep(ResourceKind::Container, &id, &mut failures, |id| {
                self.remove_container(id)
            });
        }
        for id in networks {
            self.sweep(ResourceKind::Network, &id, &mut failures, |id| {
                self.remove_network(id)
            });
        }
        for id in images {
            self.sweep(ResourceKind::Image, &id, &mut failures, |id| {
                self.remove_image(id)
            });
        }

        failures.into_result()
    }

    fn sweep(
        &self,
        kind: ResourceKind,
        id: &str,
        failures: &mut AggregateError,
        remove: impl FnOnce(&str) -> Result<(), EngineError>,
    ) {
        match remove(id) {
            Ok(()) => debug!(%kind, %id, "Removed"),
            Err(e) => {
                warn!(%kind, %id, error = %e, "Failed to remove");
                failures.push(kind, id, e);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackedResources> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
