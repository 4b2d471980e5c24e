use super::engine::{
    BuildImageParams, ContainerInfo, CreateNetworkParams, NetworkInfo, RunContainerParams,
};
use crate::error::EngineError;
use std::fmt::Debug;

/// Raw container engine operations.
///
/// Implementations do no bookkeeping; `TrackedClient` layers resource
/// tracking and the run-container sequence on top.
pub trait EngineClient: Send + Sync + Debug {
    /// Create (not start) a container attached to the first network in
    /// `params.networks`. Must return `EngineError::NoSuchImage` when the
    /// image is not available locally.
    fn create_container(&self, params: &RunContainerParams) -> Result<String, EngineError>;

    fn start_container(&self, id: &str) -> Result<(), EngineError>;

    fn connect_network(
        &self,
        network_id: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<(), EngineError>;

    fn inspect_container(&self, id: &str) -> Result<ContainerInfo, EngineError>;

    /// Force-remove a container together with its volumes
    fn remove_container(&self, id: &str) -> Result<(), EngineError>;

    fn create_network(&self, params: &CreateNetworkParams) -> Result<NetworkInfo, EngineError>;

    fn remove_network(&self, id: &str) -> Result<(), EngineError>;

    /// Pull an image, using registry credentials from the ambient config if any
    fn pull_image(&self, reference: &str) -> Result<(), EngineError>;

    /// Build an image and return its reference
    fn build_image(&self, params: &BuildImageParams) -> Result<String, EngineError>;

    fn remove_image(&self, id: &str) -> Result<(), EngineError>;
}
