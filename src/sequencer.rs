use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::container::ContainerID;

/// Runs tasks concurrently while keeping tasks for the same container in submission order.
///
/// Every spawned task first awaits the previous task submitted for the same container, so a
/// stop notification can never be handled before an earlier start for that container.
#[derive(Debug, Default)]
pub struct Sequencer {
    tails: DashMap<ContainerID, JoinHandle<()>>,
}

impl Sequencer {
    pub fn spawn<F>(&self, id: ContainerID, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tails.retain(|_, tail| !tail.is_finished());

        // The new task becomes the tail before it learns its predecessor, so concurrent
        // spawns for one id still form a single chain.
        let (previous_tx, previous_rx) = oneshot::channel::<JoinHandle<()>>();
        let tail = tokio::spawn({
            let id = id.clone();
            async move {
                if let Ok(previous) = previous_rx.await {
                    if let Err(err) = previous.await {
                        log::error!("previous task for container `{}` failed: {}", id, err);
                    }
                }
                task.await
            }
        });
        if let Some(previous) = self.tails.insert(id, tail) {
            let _ = previous_tx.send(previous);
        }
    }

    /// Number of containers with queued or running tasks.
    pub fn pending(&self) -> usize {
        self.tails.iter().filter(|tail| !tail.is_finished()).count()
    }
}
