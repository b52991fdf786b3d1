use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::container::ContainerID;
use crate::error::ResultOkLogExt;
use crate::introspection::{IntrospectionServer, ServerContext};
use crate::registry::{Registry, WatcherHandle};
use crate::runtime::{self, RuntimeClient};
use crate::sequencer::Sequencer;

/// What to do for a single container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new introspection server was launched.
    Started,
    /// A server is already active for the container; nothing was started.
    AlreadyActive,
    /// The container is not running (anymore).
    NotRunning,
    /// The container metadata could not be fetched.
    FetchFailed,
    /// The reconciler is shutting down and no longer launches servers.
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Cancelled,
    NotRegistered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Start(StartOutcome),
    Stop(StopOutcome),
}

/// Result of the startup reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub enumerated: usize,
    pub started: usize,
    pub already_active: usize,
    pub not_running: usize,
    pub failed: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: StartOutcome) {
        match outcome {
            StartOutcome::Started => self.started += 1,
            StartOutcome::AlreadyActive => self.already_active += 1,
            StartOutcome::NotRunning => self.not_running += 1,
            StartOutcome::FetchFailed | StartOutcome::ShuttingDown => self.failed += 1,
        }
    }
}

struct Inner<C, S> {
    client: Arc<C>,
    server: Arc<S>,
    registry: Arc<Registry>,
    driver: Arc<str>,
    sequencer: Sequencer,
    /// Dispatched handlers, queued or running.
    handlers: TaskTracker,
    servers: TaskTracker,
    /// Parent of every server token; cancelled once by `shutdown`.
    shutdown: CancellationToken,
}

/// Keeps the set of introspection servers in line with the running containers.
///
/// Cloning is cheap; clones share the registry and the running servers.
pub struct Reconciler<C, S> {
    inner: Arc<Inner<C, S>>,
}

impl<C, S> Clone for Reconciler<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, S> Reconciler<C, S>
where
    C: RuntimeClient,
    S: IntrospectionServer,
{
    /// Creates a reconciler. `driver` is the runtime's storage driver, handed to every server.
    pub fn new(
        client: Arc<C>,
        server: Arc<S>,
        registry: Arc<Registry>,
        driver: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                server,
                registry,
                driver: driver.into(),
                sequencer: Sequencer::default(),
                handlers: TaskTracker::new(),
                servers: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Runs `action` for `id` on its own task.
    ///
    /// Actions for the same container run one after another in dispatch order, actions for
    /// different containers run concurrently. The returned receiver yields the outcome; it may
    /// be dropped if the caller does not care.
    pub fn dispatch(&self, id: ContainerID, action: Action) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let handler = {
            let this = self.clone();
            let id = id.clone();
            self.inner.handlers.track_future(async move {
                let outcome = match action {
                    Action::Start => Outcome::Start(this.handle_start(&id).await),
                    Action::Stop => Outcome::Stop(this.handle_stop(&id)),
                };
                let _ = tx.send(outcome);
            })
        };
        self.inner.sequencer.spawn(id, handler);
        rx
    }

    /// Starts an introspection server for `id` unless one is already active.
    ///
    /// The container is refetched first and only started when the fresh snapshot reports it
    /// as running.
    pub async fn handle_start(&self, id: &ContainerID) -> StartOutcome {
        let snapshot = match self.inner.client.fetch_container(id).await {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_not_found() => {
                log::debug!("container `{}` vanished before it could be inspected", id);
                return StartOutcome::FetchFailed;
            }
            Err(err) => {
                log::warn!("failed to fetch container `{}`: {}", id, err);
                return StartOutcome::FetchFailed;
            }
        };
        if !snapshot.running {
            log::debug!("container `{}` is not running, skipping", id);
            return StartOutcome::NotRunning;
        }
        if self.inner.registry.lookup(&snapshot.id).is_some() {
            log::debug!("introspection server for `{}` is already active", id);
            return StartOutcome::AlreadyActive;
        }
        if self.inner.shutdown.is_cancelled() {
            log::debug!("shutting down, not starting a server for `{}`", id);
            return StartOutcome::ShuttingDown;
        }

        let handle =
            WatcherHandle::with_token(Arc::new(snapshot), self.inner.shutdown.child_token());
        if !self.inner.registry.register(handle.id().clone(), handle.clone()) {
            log::debug!("introspection server for `{}` was registered concurrently", id);
            return StartOutcome::AlreadyActive;
        }
        log::info!(
            "Creating introspection server for {} ({})",
            handle.id().short(),
            handle.snapshot().name
        );
        self.launch(&handle);

        StartOutcome::Started
    }

    /// Cancels and forgets the introspection server of `id`. Unknown ids are ignored.
    pub fn handle_stop(&self, id: &ContainerID) -> StopOutcome {
        match self.inner.registry.unregister(id) {
            Some(handle) => {
                log::info!("Stopping introspection server for {}", id.short());
                handle.cancel();
                StopOutcome::Cancelled
            }
            None => {
                log::debug!("no introspection server registered for `{}`", id);
                StopOutcome::NotRegistered
            }
        }
    }

    /// Starts servers for every container that is running right now.
    ///
    /// # Errors
    ///
    /// Fails only if the containers cannot be enumerated. Containers that cannot be fetched
    /// are skipped and counted in [`SyncReport::failed`].
    pub async fn initial_sync(&self) -> runtime::Result<SyncReport> {
        let containers = self.inner.client.list_containers().await?;
        let mut report = SyncReport {
            enumerated: containers.len(),
            ..SyncReport::default()
        };

        let pending: Vec<_> = containers
            .into_iter()
            .map(|container| self.dispatch(container.id, Action::Start))
            .collect();
        for outcome in pending {
            match outcome.await {
                Ok(Outcome::Start(outcome)) => report.record(outcome),
                Ok(Outcome::Stop(_)) => {}
                Err(_) => report.failed += 1,
            }
        }

        log::info!(
            "Initial sync: {} containers, {} started, {} already active, {} not running, {} failed",
            report.enumerated,
            report.started,
            report.already_active,
            report.not_running,
            report.failed
        );
        Ok(report)
    }

    /// Cancels every active server and waits up to `grace` for them to finish.
    ///
    /// Handlers still in flight finish first; starts that have not registered yet are
    /// refused with [`StartOutcome::ShuttingDown`]. Returns the number of servers that were
    /// cancelled.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + grace;
        self.inner.shutdown.cancel();

        self.inner.handlers.close();
        if tokio::time::timeout_at(deadline, self.inner.handlers.wait())
            .await
            .is_err()
        {
            log::warn!(
                "{} event handlers did not finish within {:?}",
                self.inner.handlers.len(),
                grace
            );
        }

        let handles = self.inner.registry.drain();
        for handle in &handles {
            handle.cancel();
        }
        self.inner.servers.close();
        if tokio::time::timeout_at(deadline, self.inner.servers.wait())
            .await
            .is_err()
        {
            log::warn!(
                "{} introspection servers did not stop within {:?}",
                self.inner.servers.len(),
                grace
            );
        }

        handles.len()
    }

    fn launch(&self, handle: &WatcherHandle) {
        let server = Arc::clone(&self.inner.server);
        let ctx = ServerContext {
            snapshot: Arc::clone(handle.snapshot()),
            driver: Arc::clone(&self.inner.driver),
        };
        let cancel = handle.token();
        let id = handle.id().clone();
        self.inner.servers.spawn(async move {
            if server.serve(ctx, cancel).await.ok_log().is_some() {
                log::debug!("introspection server for `{}` exited", id);
            }
        });
    }
}
