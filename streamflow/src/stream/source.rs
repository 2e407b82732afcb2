//! Source constructors.

use super::{channel, PipelineCore, Stream};
use crate::cancellation::CancellationToken;
use crate::config::StreamConfig;
use crate::function::Supplier;
use async_channel::Receiver;
use std::sync::Arc;

/// Builds the source of a pipeline with a given configuration.
///
/// Every source derives its own pipeline token from `scope`, so cancelling
/// the scope (or letting a deadline set on it fire) stops the pipeline.
#[derive(Debug, Clone)]
pub struct StreamBuilder {
    scope: Arc<CancellationToken>,
    config: StreamConfig,
}

impl StreamBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new(scope: &Arc<CancellationToken>) -> Self {
        Self {
            scope: Arc::clone(scope),
            config: StreamConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Sets the minimum per-stage channel capacity.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_channel_capacity(capacity);
        self
    }

    /// Sets the parallelism applied as the pipeline's first operation.
    #[must_use]
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.config.parallelism = parallelism;
        self
    }

    fn start<T: Send + 'static>(self, outlet: Receiver<T>, core: Arc<PipelineCore>) -> Stream<T> {
        let parallelism = core.config.parallelism;
        let stream = Stream::with_outlet(core, outlet);
        if parallelism == 1 {
            stream
        } else {
            stream.parallel(parallelism)
        }
    }

    /// A finite stream of the given values, in order.
    pub fn of<T, I>(self, values: I) -> Stream<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        if values.is_empty() {
            return self.empty();
        }
        let core = PipelineCore::new(&self.scope, self.config.clone());
        let (tx, rx) = async_channel::bounded(values.len());
        let token = Arc::clone(&core.token);
        core.workers.spawn("of", async move {
            for value in values {
                if !channel::send(&tx, value, &token).await {
                    return;
                }
            }
        });
        self.start(rx, core)
    }

    /// A stream merging the elements of external channels.
    ///
    /// Each input is forwarded by its own worker, so elements of different
    /// inputs interleave. The stream ends once every input is closed.
    pub fn of_channels<T, I>(self, inputs: I) -> Stream<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = Receiver<T>>,
    {
        let core = PipelineCore::new(&self.scope, self.config.clone());
        let (tx, rx) = core.channel(1);
        for input in inputs {
            let tx = tx.clone();
            let token = Arc::clone(&core.token);
            core.workers.spawn("of_channels", async move {
                while let Some(value) = channel::recv(&input, &token).await {
                    if !channel::send(&tx, value, &token).await {
                        return;
                    }
                }
            });
        }
        self.start(rx, core)
    }

    /// An infinite stream of values produced by `supplier`.
    ///
    /// Bound it with [`Stream::limit`] or a short-circuiting terminal
    /// operation.
    pub fn generate<T, F>(self, supplier: F) -> Stream<T>
    where
        T: Send + 'static,
        F: FnMut() -> T + Send + 'static,
    {
        let core = PipelineCore::new(&self.scope, self.config.clone());
        let (tx, rx) = core.channel(1);
        let token = Arc::clone(&core.token);
        let mut supplier: Supplier<T> = Box::new(supplier);
        core.workers.spawn("generate", async move {
            while channel::send(&tx, supplier(), &token).await {}
        });
        self.start(rx, core)
    }

    /// A stream of every element of `streams`, one stream after another.
    ///
    /// Each input pipeline is shut down once drained; an error recorded by an
    /// input becomes this stream's error.
    pub fn concat<T, I>(self, streams: I) -> Stream<T>
    where
        T: Send + 'static,
        I: IntoIterator<Item = Stream<T>>,
    {
        let streams: Vec<Stream<T>> = streams.into_iter().collect();
        if streams.is_empty() {
            return self.empty();
        }
        let core = PipelineCore::new(&self.scope, self.config.clone());
        let (tx, rx) = core.channel(1);
        let token = Arc::clone(&core.token);
        let errors = Arc::clone(&core.errors);
        core.workers.spawn("concat", async move {
            let mut inputs = streams.into_iter();
            for mut input in inputs.by_ref() {
                let upstream = input.begin_terminal();
                let mut open = true;
                while let Some(value) = channel::recv(&upstream, &token).await {
                    if !channel::send(&tx, value, &token).await {
                        open = false;
                        break;
                    }
                }
                drop(upstream);
                if let Err(error) = input.close().await {
                    errors.record(error);
                    token.cancel("concatenated stream failed");
                    break;
                }
                if !open || token.is_cancelled() {
                    break;
                }
            }
            // Dropping cancels the pipelines that were never reached.
            drop(inputs);
        });
        self.start(rx, core)
    }

    /// A stream with no elements.
    pub fn empty<T: Send + 'static>(self) -> Stream<T> {
        let core = PipelineCore::new(&self.scope, self.config.clone());
        let (_, rx) = channel::closed();
        self.start(rx, core)
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Returns a builder for configuring a new stream under `scope`.
    #[must_use]
    pub fn builder(scope: &Arc<CancellationToken>) -> StreamBuilder {
        StreamBuilder::new(scope)
    }

    /// A finite stream of the given values, in order.
    pub fn of<I: IntoIterator<Item = T>>(scope: &Arc<CancellationToken>, values: I) -> Self {
        StreamBuilder::new(scope).of(values)
    }

    /// A stream merging the elements of external channels.
    pub fn of_channels<I: IntoIterator<Item = Receiver<T>>>(
        scope: &Arc<CancellationToken>,
        inputs: I,
    ) -> Self {
        StreamBuilder::new(scope).of_channels(inputs)
    }

    /// An infinite stream of values produced by `supplier`.
    pub fn generate<F: FnMut() -> T + Send + 'static>(
        scope: &Arc<CancellationToken>,
        supplier: F,
    ) -> Self {
        StreamBuilder::new(scope).generate(supplier)
    }

    /// The elements of `streams`, one stream after another.
    pub fn concat<I: IntoIterator<Item = Self>>(
        scope: &Arc<CancellationToken>,
        streams: I,
    ) -> Self {
        StreamBuilder::new(scope).concat(streams)
    }

    /// A stream with no elements.
    pub fn empty(scope: &Arc<CancellationToken>) -> Self {
        StreamBuilder::new(scope).empty()
    }
}
