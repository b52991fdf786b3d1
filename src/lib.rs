//! Lestrade: keeps one introspection server alive for every running container.
//!
//! The library watches the lifecycle event feed of the container runtime (docker), starts an
//! introspection server on a unix socket when a container starts and tears it down when the
//! container stops. On startup the already running containers are picked up by an initial
//! sync that runs concurrently with the event subscription.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use event_loop::EventLoop;
use introspection::{IntrospectionServer, UnixSocketServer};
use reconciler::Reconciler;
use registry::Registry;
use runtime::{DockerClient, RuntimeClient};

pub mod config;
pub mod container;
pub mod error;
pub mod event_loop;
pub mod introspection;
pub mod reconciler;
pub mod registry;
pub mod runtime;
pub mod sequencer;
pub mod uds;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};

/// Runs Lestrade against the docker daemon described by `config`.
///
/// Returns `Ok(())` after a graceful shutdown triggered by SIGINT or SIGTERM.
///
/// # Errors
///
/// Possible errors include:
/// - The docker socket cannot be reached or `/info` fails.
/// - The socket directory cannot be created.
/// - Subscribing to events or enumerating the containers fails.
/// - The event stream closes while running ([`Error::EventStreamClosed`]).
pub async fn run(config: Config) -> Result<()> {
    log::debug!("Configuration: {:?}", config);
    let client = Arc::new(DockerClient::new(
        &config.docker_socket,
        config.api_version.clone(),
    ));
    let info = client.info().await?;
    log::info!(
        "Connected to docker {} at {} (storage driver `{}`)",
        info.server_version,
        config.docker_socket.display(),
        info.driver
    );

    std::fs::create_dir_all(&config.socket_dir).map_err(|source| Error::SocketDir {
        path: config.socket_dir.clone(),
        source,
    })?;
    let graph_dir = config
        .graph_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&info.docker_root_dir));
    log::debug!("Graph dir: {}", graph_dir.display());

    let server = Arc::new(
        UnixSocketServer::new(&config.socket_dir, graph_dir)
            .with_drain_timeout(config.shutdown_grace),
    );
    let reconciler = Reconciler::new(
        Arc::clone(&client),
        server,
        Arc::new(Registry::default()),
        info.driver,
    );

    supervise(
        client.as_ref(),
        reconciler,
        shutdown_signal()?,
        config.shutdown_grace,
    )
    .await
}

/// Subscribes to events, performs the initial sync and reconciles until `shutdown` resolves
/// or the event stream closes. All servers are cancelled before returning.
pub async fn supervise<C, S>(
    client: &C,
    reconciler: Reconciler<C, S>,
    shutdown: impl Future<Output = ()>,
    grace: Duration,
) -> Result<()>
where
    C: RuntimeClient,
    S: IntrospectionServer,
{
    let events = client.stream_events().await?;
    let mut event_loop = tokio::spawn(EventLoop::new(reconciler.clone()).run(events));

    if let Err(err) = reconciler.initial_sync().await {
        event_loop.abort();
        reconciler.shutdown(grace).await;
        return Err(err.into());
    }

    let outcome = tokio::select! {
        summary = &mut event_loop => {
            match summary {
                Ok(summary) => log::error!(
                    "Event stream closed ({} events handled), no further containers will be tracked",
                    summary.start + summary.stop + summary.ignored
                ),
                Err(err) => log::error!("event loop failed: {}", err),
            }
            Err(Error::EventStreamClosed)
        }
        () = shutdown => Ok(()),
    };

    event_loop.abort();
    let stopped = reconciler.shutdown(grace).await;
    log::info!("Stopped {} introspection servers", stopped);

    outcome
}

fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).map_err(Error::Signal)?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT, shutting down"),
            _ = terminate.recv() => log::info!("Received SIGTERM, shutting down"),
        }
    })
}
