//! Intermediate operators.
//!
//! Streaming operators run one worker per unit of parallelism and emit as
//! elements arrive. Barrier operators run a single worker that drains its
//! input before emitting anything.

use super::{channel, Stream};
use crate::cancellation::CancellationToken;
use crate::function::{Comparator, Consumer, Predicate, UnaryOperator};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

impl<T: Send + 'static> Stream<T> {
    /// Replaces each element with `mapper(element)`.
    #[must_use]
    pub fn map<F>(mut self, mapper: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        let (upstream, downstream) = self.begin_intermediate();
        let mapper: UnaryOperator<T> = Arc::new(mapper);
        self.core.spawn_stage("map", self.parallelism, upstream, downstream, |rx, tx, token| {
            let mapper = Arc::clone(&mapper);
            async move {
                while let Some(value) = channel::recv(&rx, &token).await {
                    if !channel::send(&tx, mapper(value), &token).await {
                        break;
                    }
                }
            }
        });
        self
    }

    /// Calls `action` on each element as it passes through.
    #[must_use]
    pub fn peek<F>(mut self, action: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let (upstream, downstream) = self.begin_intermediate();
        let action: Consumer<T> = Arc::new(action);
        self.core.spawn_stage("peek", self.parallelism, upstream, downstream, |rx, tx, token| {
            let action = Arc::clone(&action);
            async move {
                while let Some(value) = channel::recv(&rx, &token).await {
                    action(&value);
                    if !channel::send(&tx, value, &token).await {
                        break;
                    }
                }
            }
        });
        self
    }

    /// Keeps the elements matching `predicate`.
    #[must_use]
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let (upstream, downstream) = self.begin_intermediate();
        let predicate: Predicate<T> = Arc::new(predicate);
        self.core.spawn_stage("filter", self.parallelism, upstream, downstream, |rx, tx, token| {
            let predicate = Arc::clone(&predicate);
            async move {
                while let Some(value) = channel::recv(&rx, &token).await {
                    if predicate(&value) && !channel::send(&tx, value, &token).await {
                        break;
                    }
                }
            }
        });
        self
    }

    /// Drops the first `n` elements.
    ///
    /// Under fan-out the skipped elements are the first `n` received by the
    /// stage, whichever workers received them.
    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        let (upstream, downstream) = self.begin_intermediate();
        let seen = Arc::new(AtomicUsize::new(0));
        self.core.spawn_stage("skip", self.parallelism, upstream, downstream, |rx, tx, token| {
            let seen = Arc::clone(&seen);
            async move {
                while let Some(value) = channel::recv(&rx, &token).await {
                    if seen.fetch_add(1, AtomicOrdering::SeqCst) < n {
                        continue;
                    }
                    if !channel::send(&tx, value, &token).await {
                        break;
                    }
                }
            }
        });
        self
    }

    /// Forwards at most `max_size` elements, then stops reading upstream.
    ///
    /// Once the quota is met every worker of the stage drops its receiver, so
    /// upstream senders fail instead of blocking.
    #[must_use]
    pub fn limit(mut self, max_size: usize) -> Self {
        let (upstream, downstream) = self.begin_intermediate();
        let taken = Arc::new(AtomicUsize::new(0));
        // Releases sibling workers parked on an idle upstream once the quota is met.
        let quota = CancellationToken::new();
        if max_size == 0 {
            quota.cancel("limit reached");
        }
        self.core.spawn_stage("limit", self.parallelism, upstream, downstream, |rx, tx, token| {
            let taken = Arc::clone(&taken);
            let quota = Arc::clone(&quota);
            async move {
                loop {
                    let value = tokio::select! {
                        biased;
                        () = quota.cancelled() => break,
                        value = channel::recv(&rx, &token) => match value {
                            Some(value) => value,
                            None => break,
                        },
                    };
                    let index = taken.fetch_add(1, AtomicOrdering::SeqCst);
                    if index >= max_size {
                        break;
                    }
                    if index + 1 == max_size {
                        quota.cancel("limit reached");
                    }
                    if !channel::send(&tx, value, &token).await {
                        break;
                    }
                }
            }
        });
        self
    }

    /// Keeps the first occurrence of each distinct element.
    ///
    /// Drains the whole input before emitting.
    #[must_use]
    pub fn distinct(mut self) -> Self
    where
        T: Eq + Hash,
    {
        let (upstream, downstream) = self.begin_intermediate();
        self.core.spawn_stage("distinct", 1, upstream, downstream, |rx, tx, token| async move {
            let mut buffer = Vec::new();
            while let Some(value) = channel::recv(&rx, &token).await {
                buffer.push(value);
            }
            if token.is_cancelled() {
                return;
            }
            drop(rx);

            let keep: Vec<bool> = {
                let mut seen = HashSet::with_capacity(buffer.len());
                buffer.iter().map(|value| seen.insert(value)).collect()
            };
            for (value, keep) in buffer.into_iter().zip(keep) {
                if keep && !channel::send(&tx, value, &token).await {
                    break;
                }
            }
        });
        self
    }

    /// Orders the elements with `comparator`. The sort is stable.
    ///
    /// Drains the whole input before emitting.
    #[must_use]
    pub fn sorted<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.push_sorted(comparator);
        self
    }

    pub(super) fn push_sorted<F>(&mut self, comparator: F)
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        let (upstream, downstream) = self.begin_intermediate();
        let comparator: Comparator<T> = Arc::new(comparator);
        self.core.spawn_stage("sorted", 1, upstream, downstream, |rx, tx, token| {
            let comparator = Arc::clone(&comparator);
            async move {
                let mut buffer = Vec::new();
                while let Some(value) = channel::recv(&rx, &token).await {
                    buffer.push(value);
                }
                if token.is_cancelled() {
                    return;
                }
                drop(rx);

                buffer.sort_by(|a, b| comparator(a, b));
                for value in buffer {
                    if !channel::send(&tx, value, &token).await {
                        break;
                    }
                }
            }
        });
    }

    /// Registers `handler` to run when the pipeline shuts down.
    ///
    /// Handlers run once, last registered first, after every worker has
    /// stopped. A handler registered after the pipeline has shut down runs
    /// immediately. Registering a handler does not count as an operation for
    /// [`Stream::parallel`].
    #[must_use]
    pub fn on_close<F>(self, handler: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.core.close_handlers.register(handler, None);
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::function::{natural_order, reverse_order};
    use crate::stream::Stream;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_map() {
        let scope = CancellationToken::new();
        let values = Stream::of(&scope, [1, 2, 3]).map(|x| x * 2).to_vec().await.unwrap();
        assert_eq!(values, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_filter_even() {
        let scope = CancellationToken::new();
        let values = Stream::of(&scope, [1, 2, 3, 4])
            .filter(|x| x % 2 == 0)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(values, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_peek_sees_every_element() {
        let scope = CancellationToken::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let values = Stream::of(&scope, [1, 2, 3])
            .peek(move |_| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            })
            .to_vec()
            .await
            .unwrap();

        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_skip() {
        let scope = CancellationToken::new();
        let cases: [(&[i32], usize, &[i32]); 3] = [
            (&[1, 2, 3, 4], 2, &[3, 4]),
            (&[1, 2], 3, &[]),
            (&[1, 2, 3], 0, &[1, 2, 3]),
        ];
        for (input, n, expected) in cases {
            let values = Stream::of(&scope, input.to_vec()).skip(n).to_vec().await.unwrap();
            assert_eq!(values, expected.to_vec(), "skip({n}) of {input:?}");
        }
    }

    #[tokio::test]
    async fn test_limit() {
        let scope = CancellationToken::new();
        let cases: [(&[i32], usize, &[i32]); 3] = [
            (&[1, 2, 3, 4], 2, &[1, 2]),
            (&[1, 2], 3, &[1, 2]),
            (&[1, 2, 3], 0, &[]),
        ];
        for (input, n, expected) in cases {
            let values = Stream::of(&scope, input.to_vec()).limit(n).to_vec().await.unwrap();
            assert_eq!(values, expected.to_vec(), "limit({n}) of {input:?}");
        }
    }

    #[tokio::test]
    async fn test_distinct_first_occurrence() {
        let scope = CancellationToken::new();
        let values = Stream::of(&scope, [1, 2, 2, 3, 1]).distinct().to_vec().await.unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sorted() {
        let scope = CancellationToken::new();
        let values = Stream::of(&scope, [3, 1, 2])
            .sorted(natural_order())
            .to_vec()
            .await
            .unwrap();
        assert_eq!(values, vec![1, 2, 3]);

        let values = Stream::of(&scope, [3, 1, 2])
            .sorted(reverse_order())
            .to_vec()
            .await
            .unwrap();
        assert_eq!(values, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_sorted_is_stable() {
        let scope = CancellationToken::new();
        let values = Stream::of(&scope, [(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')])
            .sorted(|a, b| a.0.cmp(&b.0))
            .to_vec()
            .await
            .unwrap();
        assert_eq!(values, vec![(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
    }

    #[tokio::test]
    async fn test_chained_operators() {
        let scope = CancellationToken::new();
        let values = Stream::of(&scope, 1..=20)
            .filter(|x| x % 3 != 0)
            .map(|x| x * 10)
            .skip(2)
            .limit(4)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(values, vec![40, 50, 70, 80]);
    }

    #[tokio::test]
    async fn test_on_close_runs_once_after_terminal() {
        let scope = CancellationToken::new();
        let closed = Arc::new(AtomicUsize::new(0));
        let closed_clone = closed.clone();

        let mut stream = Stream::of(&scope, [1, 2, 3]).on_close(move || {
            closed_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        assert_eq!(stream.count().await.unwrap(), 3);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        assert!(stream.count().await.is_err());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
