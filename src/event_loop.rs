use tokio::sync::mpsc;

use crate::introspection::IntrospectionServer;
use crate::reconciler::{Action, Reconciler};
use crate::runtime::{Event, EventStatus, RuntimeClient};

/// Counts of the events seen before the feed closed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub start: usize,
    pub stop: usize,
    pub ignored: usize,
}

/// Feeds runtime events into the [`Reconciler`].
pub struct EventLoop<C, S> {
    reconciler: Reconciler<C, S>,
}

impl<C, S> EventLoop<C, S>
where
    C: RuntimeClient,
    S: IntrospectionServer,
{
    pub fn new(reconciler: Reconciler<C, S>) -> Self {
        Self { reconciler }
    }

    /// Dispatches events until the feed closes.
    ///
    /// Handlers run on their own tasks; the loop never waits for them.
    pub async fn run(self, mut events: mpsc::Receiver<Event>) -> LoopSummary {
        let mut summary = LoopSummary::default();
        while let Some(event) = events.recv().await {
            log::debug!(
                "Received event: status={}, id={}",
                event.status,
                event.container_id
            );
            match event.status {
                EventStatus::Start => {
                    summary.start += 1;
                    self.reconciler.dispatch(event.container_id, Action::Start);
                }
                EventStatus::Stop => {
                    summary.stop += 1;
                    self.reconciler.dispatch(event.container_id, Action::Stop);
                }
                EventStatus::Other(status) => {
                    summary.ignored += 1;
                    log::trace!("ignoring `{}` event for `{}`", status, event.container_id);
                }
            }
        }
        log::warn!(
            "event feed closed after {} start, {} stop and {} other events",
            summary.start,
            summary.stop,
            summary.ignored
        );

        summary
    }
}
