//! Pipeline-wide tracker for stage worker tasks.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

/// A worker that panicked, reported by [`WorkerGroup::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPanic {
    /// The stage the worker belonged to.
    pub stage: String,
    /// The panic payload, when it was a string.
    pub message: String,
}

/// Decrements the live counter when a worker finishes, even by panicking.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Every worker spawned on behalf of one pipeline.
///
/// Stages register their workers here so that a terminal operation can wait
/// for the whole pipeline to go quiet before it returns.
#[derive(Default)]
pub struct WorkerGroup {
    /// Handles of spawned workers, with their stage names.
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    /// Workers currently running.
    live: Arc<AtomicUsize>,
    /// Workers spawned over the group's lifetime.
    spawned: AtomicUsize,
}

impl WorkerGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a worker for `stage` on the current tokio runtime.
    pub fn spawn<Fut>(&self, stage: &'static str, worker: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.live.fetch_add(1, Ordering::SeqCst);
        let index = self.spawned.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(&self.live));
        let span = tracing::debug_span!("worker", stage, index);
        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                worker.await;
                debug!("worker finished");
            }
            .instrument(span),
        );
        self.handles.lock().push((stage, handle));
    }

    /// Waits for every worker spawned so far, including ones spawned while waiting.
    ///
    /// Returns the workers that panicked.
    pub async fn wait(&self) -> Vec<WorkerPanic> {
        let mut panics = Vec::new();
        loop {
            let handles = std::mem::take(&mut *self.handles.lock());
            if handles.is_empty() {
                break;
            }
            let (stages, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
            let results = futures::future::join_all(handles).await;
            for (stage, result) in stages.into_iter().zip(results) {
                if let Err(join_error) = result {
                    if join_error.is_panic() {
                        panics.push(WorkerPanic {
                            stage: stage.to_string(),
                            message: panic_message(join_error.into_panic()),
                        });
                    }
                }
            }
        }
        panics
    }

    /// Returns the number of workers still running.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Returns the number of workers spawned over the group's lifetime.
    #[must_use]
    pub fn spawned_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

impl std::fmt::Debug for WorkerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerGroup")
            .field("live", &self.live_count())
            .field("spawned", &self.spawned_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_joins_all_workers() {
        let group = WorkerGroup::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let counter = counter.clone();
            group.spawn("count", async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        let panics = group.wait().await;
        assert!(panics.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(group.live_count(), 0);
        assert_eq!(group.spawned_count(), 4);
    }

    #[tokio::test]
    async fn test_wait_reports_panics() {
        let group = WorkerGroup::new();
        group.spawn("ok", async {});
        group.spawn("boom", async { panic!("worker exploded") });

        let panics = group.wait().await;
        assert_eq!(
            panics,
            vec![WorkerPanic {
                stage: "boom".to_string(),
                message: "worker exploded".to_string(),
            }]
        );
        assert_eq!(group.live_count(), 0);
    }

    #[tokio::test]
    async fn test_workers_respect_cancellation() {
        let group = WorkerGroup::new();
        let token = CancellationToken::new();

        let worker_token = token.clone();
        group.spawn("forever", async move {
            worker_token.cancelled().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(group.live_count(), 1);

        token.cancel("stop");
        let panics = group.wait().await;
        assert!(panics.is_empty());
        assert_eq!(group.live_count(), 0);
    }
}
