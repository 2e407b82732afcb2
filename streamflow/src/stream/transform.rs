//! Operators that change the element type.
//!
//! A method on `Stream<T>` cannot hand back a `Stream<R>` continuing the same
//! handle state cleanly, so these are free functions. Each one continues the
//! source pipeline: the new handle shares its scope, workers and error cell.

use super::{channel, Stream};
use crate::errors::{Result, StreamError};
use crate::function::{BiFunction, BinaryOperator, Function};
use async_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Claims the source's output and returns it with a handle of the new type
/// and the sender feeding that handle.
fn relink<T, R>(source: &mut Stream<T>) -> (Receiver<T>, Sender<R>, Stream<R>)
where
    T: Send + 'static,
    R: Send + 'static,
{
    let mut target = source.derive::<R>();
    let Some(upstream) = source.claim_outlet() else {
        let (tx, rx) = channel::closed();
        target.outlet = Some(rx);
        return (channel::closed().1, tx, target);
    };
    source.linked_or_consumed = true;
    let (tx, rx) = source.core.channel(source.parallelism);
    target.outlet = Some(rx);
    (upstream, tx, target)
}

/// Applies `mapper` to every element, producing a stream of another type.
///
/// Fans out like [`Stream::map`] when the source is parallel.
pub fn map_to<T, R, F>(mut source: Stream<T>, mapper: F) -> Stream<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let (upstream, downstream, target) = relink(&mut source);
    let mapper: Function<T, R> = Arc::new(mapper);
    source.core.spawn_stage("map_to", source.parallelism, upstream, downstream, |rx, tx, token| {
        let mapper = Arc::clone(&mapper);
        async move {
            while let Some(value) = channel::recv(&rx, &token).await {
                if !channel::send(&tx, mapper(value), &token).await {
                    break;
                }
            }
        }
    });
    target
}

/// Replaces every element with the elements of the stream `mapper` returns.
///
/// A nested stream is forwarded completely, then shut down, before the next
/// source element is read. `mapper` may return `None` to contribute nothing.
/// A nested stream's error fails the whole pipeline.
pub fn flat_map_to<T, R, S, F>(mut source: Stream<T>, mapper: F) -> Stream<R>
where
    T: Send + 'static,
    R: Send + 'static,
    S: Into<Option<Stream<R>>> + 'static,
    F: Fn(T) -> S + Send + Sync + 'static,
{
    let (upstream, downstream, target) = relink(&mut source);
    let mapper: Function<T, S> = Arc::new(mapper);
    let errors = Arc::clone(&source.core.errors);
    let width = source.parallelism;
    source.core.spawn_stage("flat_map_to", width, upstream, downstream, |rx, tx, token| {
        let mapper = Arc::clone(&mapper);
        let errors = Arc::clone(&errors);
        async move {
            while let Some(value) = channel::recv(&rx, &token).await {
                let Some(mut nested) = mapper(value).into() else {
                    continue;
                };
                let inner = nested.begin_terminal();
                let mut open = true;
                while let Some(element) = channel::recv(&inner, &token).await {
                    if !channel::send(&tx, element, &token).await {
                        open = false;
                        break;
                    }
                }
                drop(inner);
                if let Err(error) = nested.close().await {
                    errors.record(error);
                    token.cancel("nested stream failed");
                    break;
                }
                if !open {
                    break;
                }
            }
        }
    });
    target
}

/// Folds the elements into a value of another type.
///
/// A sequential source is folded in order from `identity`. A parallel source
/// is folded by one worker per unit of parallelism, each starting from a
/// clone of `identity`; the partial results are then merged with `combiner`.
pub async fn reduce_to<T, R, A, C>(
    mut source: Stream<T>,
    identity: R,
    accumulator: A,
    combiner: C,
) -> Result<R>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
    A: Fn(R, T) -> R + Send + Sync + 'static,
    C: Fn(R, R) -> R + Send + Sync + 'static,
{
    if !source.is_parallel() {
        let mut result = Some(identity);
        source
            .for_each(|value| {
                result = result.take().map(|acc| accumulator(acc, value));
            })
            .await?;
        return result.ok_or(StreamError::EmptyStream);
    }

    let upstream = source.begin_terminal();
    let core = Arc::clone(&source.core);
    let width = source.parallelism;
    let accumulator: BiFunction<T, R> = Arc::new(accumulator);
    let (partial_tx, partial_rx) = async_channel::bounded(width);
    for _ in 0..width {
        let upstream = upstream.clone();
        let partial_tx = partial_tx.clone();
        let token = Arc::clone(&core.token);
        let accumulator = Arc::clone(&accumulator);
        let mut partial = identity.clone();
        core.workers.spawn("reduce_to", async move {
            while let Some(value) = channel::recv(&upstream, &token).await {
                partial = accumulator(partial, value);
            }
            if !token.is_cancelled() {
                // Capacity matches the worker count, so this never waits.
                let _ = partial_tx.send(partial).await;
            }
        });
    }
    drop((upstream, partial_tx));

    let mut partials = Vec::with_capacity(width);
    while let Ok(partial) = partial_rx.recv().await {
        partials.push(partial);
    }
    if core.token.is_cancelled() {
        core.fail_cancelled();
    }
    core.shutdown().await;

    let combiner: BinaryOperator<R> = Arc::new(combiner);
    let merged = partials
        .into_iter()
        .reduce(|a, b| combiner(a, b))
        .unwrap_or(identity);
    core.result(merged)
}

/// Buckets the elements by `classifier`.
///
/// Within a key, elements keep the order in which they were received.
pub async fn group_by<T, K, F>(
    mut source: Stream<T>,
    classifier: F,
) -> Result<HashMap<K, Vec<T>>>
where
    T: Send + 'static,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut groups: HashMap<K, Vec<T>> = HashMap::new();
    source
        .for_each(|value| groups.entry(classifier(&value)).or_default().push(value))
        .await?;
    Ok(groups)
}
