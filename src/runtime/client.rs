use tokio::sync::mpsc;

use crate::container::{ContainerID, ContainerSnapshot, ContainerSummary};

use super::{Event, Result};

/// Runtime wide information, fetched once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    /// Storage (graph) driver used for container filesystems, e.g. `overlay2`.
    pub driver: String,
    pub docker_root_dir: String,
    pub server_version: String,
}

pub trait RuntimeClient: Send + Sync + 'static {
    /// Enumerates the containers currently known to the runtime.
    ///
    /// The result may be stale and is only used to learn container ids.
    fn list_containers(&self) -> impl Future<Output = Result<Vec<ContainerSummary>>> + Send;

    /// Fetches the current metadata of a single container.
    ///
    /// Fails with [`super::Error::NotFound`] if the container does not exist.
    fn fetch_container(
        &self,
        id: &ContainerID,
    ) -> impl Future<Output = Result<ContainerSnapshot>> + Send;

    /// Subscribes to the lifecycle event feed.
    ///
    /// The returned receiver closes once the connection to the runtime is lost.
    fn stream_events(&self) -> impl Future<Output = Result<mpsc::Receiver<Event>>> + Send;

    fn info(&self) -> impl Future<Output = Result<RuntimeInfo>> + Send;
}
