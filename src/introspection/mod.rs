//! Per-container introspection servers.
//!
//! A server is started for every running container and lives until its cancellation
//! token fires. [`UnixSocketServer`] exposes the container metadata over HTTP on a unix
//! socket named after the container id.
mod error;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::container::ContainerSnapshot;

pub use error::{Error, Result};
pub use server::UnixSocketServer;

/// Everything a server knows about the container it serves.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub snapshot: Arc<ContainerSnapshot>,
    /// Storage driver of the runtime, shared by all containers.
    pub driver: Arc<str>,
}

pub trait IntrospectionServer: Send + Sync + 'static {
    /// Serves `ctx` until `cancel` fires, then releases every resource it holds.
    fn serve(
        &self,
        ctx: ServerContext,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Socket path used for the container with the given id.
pub fn socket_path(socket_dir: &std::path::Path, ctx: &ServerContext) -> PathBuf {
    socket_dir.join(format!("{}.sock", ctx.snapshot.id))
}
