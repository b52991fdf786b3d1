use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::routing::get;
use tokio_util::sync::CancellationToken;

use crate::container::ContainerSnapshot;

use super::{Error, IntrospectionServer, Result, ServerContext};

#[derive(Debug, serde::Serialize)]
struct InfoResponse {
    id: String,
    name: String,
    driver: String,
    graph_dir: PathBuf,
}

#[derive(Debug)]
struct ServerState {
    ctx: ServerContext,
    graph_dir: PathBuf,
}

async fn container(State(state): State<Arc<ServerState>>) -> Json<ContainerSnapshot> {
    Json(state.ctx.snapshot.as_ref().clone())
}

async fn info(State(state): State<Arc<ServerState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        id: state.ctx.snapshot.id.to_string(),
        name: state.ctx.snapshot.name.clone(),
        driver: state.ctx.driver.to_string(),
        graph_dir: state.graph_dir.clone(),
    })
}

async fn healthz() -> &'static str {
    "ok"
}

/// How long open connections may keep a cancelled server alive.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Introspection server bound to `<socket_dir>/<container id>.sock`.
#[derive(Debug, Clone)]
pub struct UnixSocketServer {
    socket_dir: PathBuf,
    graph_dir: PathBuf,
    drain_timeout: Duration,
}

impl UnixSocketServer {
    pub fn new(socket_dir: impl Into<PathBuf>, graph_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            graph_dir: graph_dir.into(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Bounds the graceful shutdown. Connections still open after `timeout` are dropped.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    fn router(&self, ctx: ServerContext) -> axum::Router {
        let state = Arc::new(ServerState {
            ctx,
            graph_dir: self.graph_dir.clone(),
        });
        axum::Router::new()
            .route("/container", get(container))
            .route("/info", get(info))
            .route("/healthz", get(healthz))
            .with_state(state)
    }
}

fn remove_socket(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Device and inode of the file at `path`.
fn file_identity(path: &Path) -> std::io::Result<(u64, u64)> {
    let metadata = std::fs::symlink_metadata(path)?;
    Ok((metadata.dev(), metadata.ino()))
}

/// Removes `path` only if it is still the socket this server bound.
///
/// A restarted server for the same container binds a new socket at the same path; that
/// one must survive the old server's exit.
fn remove_own_socket(path: &Path, identity: Option<(u64, u64)>) -> std::io::Result<()> {
    let Some(identity) = identity else {
        return Ok(());
    };
    match file_identity(path) {
        Ok(current) if current == identity => remove_socket(path),
        Ok(_) => {
            log::debug!("socket `{}` was replaced, leaving it", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

impl IntrospectionServer for UnixSocketServer {
    async fn serve(&self, ctx: ServerContext, cancel: CancellationToken) -> Result<()> {
        let path = super::socket_path(&self.socket_dir, &ctx);
        remove_socket(&path).map_err(|source| Error::RemoveStale {
            path: path.clone(),
            source,
        })?;
        let listener = tokio::net::UnixListener::bind(&path).map_err(|source| Error::Bind {
            path: path.clone(),
            source,
        })?;
        let identity = match file_identity(&path) {
            Ok(identity) => Some(identity),
            Err(err) => {
                log::warn!("failed to stat socket `{}`: {}", path.display(), err);
                None
            }
        };
        log::debug!("Listening on {}", path.display());

        let serve = axum::serve(listener, self.router(ctx))
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .into_future();
        let drain_deadline = async {
            cancel.cancelled().await;
            tokio::time::sleep(self.drain_timeout).await;
        };
        let served = tokio::select! {
            served = serve => served,
            () = drain_deadline => {
                log::warn!(
                    "dropping open connections on `{}` after {:?}",
                    path.display(),
                    self.drain_timeout
                );
                Ok(())
            }
        };

        if let Err(err) = remove_own_socket(&path, identity) {
            log::warn!("failed to remove socket `{}`: {}", path.display(), err);
        }
        log::debug!("Closed {}", path.display());

        served.map_err(|source| Error::Serve { path, source })
    }
}
