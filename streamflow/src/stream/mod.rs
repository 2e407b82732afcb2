//! Lazy stream pipelines built on worker tasks and channels.
//!
//! A [`Stream`] is a handle on the pipeline built so far. Source constructors
//! spawn a producer; every intermediate operator takes the current output
//! channel, spawns the workers of a new stage and installs that stage's output
//! channel in the handle. A terminal operator drains the last channel, cancels
//! the pipeline, waits for every worker and returns the result.
//!
//! ## Ownership and reuse
//!
//! Intermediate operators take the handle by value and hand it back, so a
//! handle cannot be linked twice. Terminal operators borrow the handle
//! mutably; any operation after a terminal one records
//! [`UsageError::AlreadyConsumed`] and is reported by the next terminal call.
//!
//! ## Parallelism
//!
//! [`Stream::parallel`] must be the first call on a fresh handle. Afterwards
//! each streaming stage (`map`, `filter`, `peek`, `skip`, `limit`) runs that
//! many workers sharing one input and one output channel, so element order is
//! no longer guaranteed. Barrier stages (`distinct`, `sorted`) always run a
//! single worker.

mod channel;
mod ops;
mod outlet;
mod source;
mod terminal;
mod transform;


pub use outlet::Outlet;
pub use source::StreamBuilder;
pub use transform::{flat_map_to, group_by, map_to, reduce_to};

use crate::cancellation::{CancellationToken, CleanupRegistry, WorkerGroup};
use crate::config::StreamConfig;
use crate::errors::{ErrorCell, Result, StreamError, UsageError};
use async_channel::{Receiver, Sender};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

/// Reason given to the pipeline token when a terminal operation shuts it down.
const SHUTDOWN_REASON: &str = "stream closed";

/// Reason given to the pipeline token when its last handle is dropped.
const DROPPED_REASON: &str = "stream dropped";

/// State shared by every stage of one pipeline.
pub(crate) struct PipelineCore {
    /// Correlates this pipeline's log events.
    run_id: Uuid,
    config: StreamConfig,
    /// Child of the caller's scope; cancelling it stops every stage.
    token: Arc<CancellationToken>,
    workers: WorkerGroup,
    errors: Arc<ErrorCell>,
    close_handlers: CleanupRegistry,
    /// Guards the shutdown sequence so it runs once.
    shutdown: OnceCell<()>,
}

impl PipelineCore {
    fn new(scope: &Arc<CancellationToken>, config: StreamConfig) -> Arc<Self> {
        let core = Arc::new(Self {
            run_id: Uuid::new_v4(),
            config,
            token: scope.child_token(),
            workers: WorkerGroup::new(),
            errors: Arc::new(ErrorCell::new()),
            close_handlers: CleanupRegistry::new(),
            shutdown: OnceCell::new(),
        });
        debug!(pipeline = %core.run_id, name = %core.config.name, "pipeline created");
        core
    }

    /// Records `error` (first one wins) and cancels every stage.
    fn fail(&self, error: StreamError) {
        if self.errors.record(error.clone()) {
            if error.is_usage() {
                warn!(pipeline = %self.run_id, name = %self.config.name, %error, "stream misuse");
            } else {
                debug!(pipeline = %self.run_id, name = %self.config.name, %error, "stream failed");
            }
        }
        self.token.cancel(error.to_string());
    }

    /// Records the token's cancellation as the pipeline error.
    fn fail_cancelled(&self) {
        let reason = self.token.reason().unwrap_or_default();
        self.fail(StreamError::Cancelled(reason));
    }

    /// Records a cancellation from outside the pipeline (scope, deadline) that
    /// stopped it before a shutdown did.
    fn record_cancellation(&self) {
        if !self.token.is_cancelled() || self.errors.is_set() {
            return;
        }
        if self.token.reason().as_deref() != Some(SHUTDOWN_REASON) {
            self.fail_cancelled();
        }
    }

    fn channel<U>(&self, parallelism: usize) -> (Sender<U>, Receiver<U>) {
        async_channel::bounded(self.config.capacity_for(parallelism))
    }

    /// Spawns `width` workers that share one input and one output channel.
    ///
    /// The output closes once the last worker's sender is dropped.
    fn spawn_stage<T, U, F, Fut>(
        &self,
        stage: &'static str,
        width: usize,
        upstream: Receiver<T>,
        downstream: Sender<U>,
        worker: F,
    ) where
        F: Fn(Receiver<T>, Sender<U>, Arc<CancellationToken>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        debug!(
            pipeline = %self.run_id,
            name = %self.config.name,
            stage,
            workers = width,
            "stage started"
        );
        for _ in 0..width {
            self.workers.spawn(
                stage,
                worker(upstream.clone(), downstream.clone(), Arc::clone(&self.token)),
            );
        }
    }

    /// Cancels the pipeline, waits for all of its workers and runs the close
    /// handlers. Concurrent and repeated calls share a single run.
    async fn shutdown(&self) {
        self.shutdown
            .get_or_init(|| async {
                self.token.cancel(SHUTDOWN_REASON);
                for panic in self.workers.wait().await {
                    self.errors.record(StreamError::WorkerPanicked {
                        stage: panic.stage,
                        message: panic.message,
                    });
                }
                self.close_handlers.run_all();
                debug!(
                    pipeline = %self.run_id,
                    name = %self.config.name,
                    workers = self.workers.spawned_count(),
                    "pipeline shut down"
                );
            })
            .await;
    }

    /// Turns the error cell into the terminal result.
    fn result<R>(&self, value: R) -> Result<R> {
        self.errors.get().map_or(Ok(value), Err)
    }
}

impl Drop for PipelineCore {
    fn drop(&mut self) {
        self.token.cancel(DROPPED_REASON);
    }
}

/// A lazily evaluated, single-use pipeline of elements of type `T`.
///
/// Build one with a source constructor such as [`Stream::of`], extend it with
/// intermediate operators and finish it with an async terminal operator.
///
/// ```rust,ignore
/// let scope = CancellationToken::new();
/// let evens = Stream::of(&scope, [1, 2, 3, 4])
///     .filter(|x| x % 2 == 0)
///     .to_vec()
///     .await?;
/// assert_eq!(evens, vec![2, 4]);
/// ```
pub struct Stream<T> {
    core: Arc<PipelineCore>,
    /// The current output channel. Exactly one holder at a time.
    outlet: Option<Receiver<T>>,
    linked_or_consumed: bool,
    has_operations: bool,
    parallelism: usize,
}

impl<T: Send + 'static> Stream<T> {
    fn with_outlet(core: Arc<PipelineCore>, outlet: Receiver<T>) -> Self {
        Self {
            core,
            outlet: Some(outlet),
            linked_or_consumed: false,
            has_operations: false,
            parallelism: 1,
        }
    }

    /// A handle of another element type continuing the same pipeline.
    fn derive<R: Send + 'static>(&self) -> Stream<R> {
        Stream {
            core: Arc::clone(&self.core),
            outlet: None,
            linked_or_consumed: false,
            has_operations: true,
            parallelism: self.parallelism,
        }
    }

    /// Requests fan-out across `n` workers for every later streaming stage.
    ///
    /// Must be the first operation on a fresh stream and `n` must be at least
    /// one; otherwise a usage error is recorded and returned by the terminal
    /// operation. On a consumed stream the error is
    /// [`UsageError::AlreadyConsumed`].
    #[must_use]
    pub fn parallel(mut self, n: usize) -> Self {
        if self.linked_or_consumed {
            self.core.fail(UsageError::AlreadyConsumed.into());
        } else if n == 0 {
            self.core.fail(UsageError::NonPositiveParallelism(n).into());
        } else if self.has_operations {
            self.core.fail(UsageError::ParallelNotFirst.into());
        } else {
            self.parallelism = n;
        }
        self.has_operations = true;
        self
    }

    /// Returns true when streaming stages fan out across several workers.
    #[must_use]
    pub const fn is_parallel(&self) -> bool {
        self.parallelism != 1
    }

    /// Returns the parallelism degree.
    #[must_use]
    pub const fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Returns the id correlating this pipeline's log events.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.core.run_id
    }

    /// Returns the pipeline name from its configuration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.config.name
    }

    /// Returns the number of this pipeline's workers still running.
    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.core.workers.live_count()
    }

    /// Returns the first error recorded for this pipeline, if any.
    #[must_use]
    pub fn error(&self) -> Option<StreamError> {
        self.core.errors.get()
    }

    /// Takes the current output channel for the next stage.
    ///
    /// A handle that was already consumed yields `None` and poisons the
    /// pipeline with [`UsageError::AlreadyConsumed`].
    fn claim_outlet(&mut self) -> Option<Receiver<T>> {
        let outlet = self.outlet.take();
        if self.linked_or_consumed || outlet.is_none() {
            self.core.fail(UsageError::AlreadyConsumed.into());
            return None;
        }
        self.has_operations = true;
        outlet
    }

    /// Returns the stage input and the sender of the newly installed output.
    ///
    /// On a consumed handle both are pre-closed so the stage's workers exit
    /// at once.
    fn begin_intermediate(&mut self) -> (Receiver<T>, Sender<T>) {
        let Some(upstream) = self.claim_outlet() else {
            let (tx, rx) = channel::closed();
            self.outlet = Some(rx.clone());
            return (rx, tx);
        };
        let (tx, rx) = self.core.channel(self.parallelism);
        self.outlet = Some(rx);
        (upstream, tx)
    }

    /// Returns the channel a terminal operation drains and marks the handle
    /// consumed.
    fn begin_terminal(&mut self) -> Receiver<T> {
        let upstream = self.claim_outlet();
        self.linked_or_consumed = true;
        upstream.unwrap_or_else(|| channel::closed().1)
    }
}

impl<T> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("run_id", &self.core.run_id)
            .field("name", &self.core.config.name)
            .field("parallelism", &self.parallelism)
            .field("linked_or_consumed", &self.linked_or_consumed)
            .field("error", &self.core.errors.get())
            .finish_non_exhaustive()
    }
}
