//! Per-tab sequential work lanes.
//!
//! All state-mutating work for one tab must run in arrival order, while
//! different tabs proceed independently. Each tab gets a lane: an unbounded
//! queue drained by one worker task, so FIFO holds even when an early job
//! takes longer than a later one.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use lector_core::TabId;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Default)]
pub struct TabLanes {
    lanes: Mutex<HashMap<TabId, mpsc::UnboundedSender<Job>>>,
}

impl TabLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `work` on the tab's lane; the receiver resolves with its output
    /// once every earlier job on the lane has finished.
    ///
    /// A lane whose worker already exited (tab cleaned up, then revisited) is
    /// replaced transparently.
    pub fn run<T, F>(&self, tab: TabId, work: F) -> oneshot::Receiver<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done_tx.send(work.await);
        });

        let mut lanes = self.lanes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let sender = lanes.entry(tab).or_insert_with(|| spawn_lane(tab));
        if let Err(mpsc::error::SendError(job)) = sender.send(job) {
            let sender = spawn_lane(tab);
            let _ = sender.send(job);
            lanes.insert(tab, sender);
        }
        done_rx
    }

    /// Drop the tab's lane. Queued jobs still drain, then the worker exits.
    pub fn remove(&self, tab: TabId) {
        self.lanes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&tab);
    }
}

fn spawn_lane(tab: TabId) -> mpsc::UnboundedSender<Job> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            job.await;
        }
        debug!(%tab, "lane drained");
    });
    tx
}
