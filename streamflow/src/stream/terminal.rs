//! Terminal operators.
//!
//! Every terminal operation drains the final channel on the calling task,
//! then shuts the pipeline down (cancel, wait for all workers, run close
//! handlers) before it returns, whether it finished, short-circuited or was
//! cancelled.

use super::{Outlet, Stream};
use crate::errors::{Result, StreamError};
use std::cmp::Ordering;
use std::ops::ControlFlow;

impl<T: Send + 'static> Stream<T> {
    /// Feeds every element to `visit` until it breaks, the channel closes or
    /// the pipeline is cancelled, then shuts the pipeline down.
    async fn drain<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(T) -> ControlFlow<()>,
    {
        let upstream = self.begin_terminal();
        if self.core.errors.is_set() {
            drop(upstream);
            self.core.shutdown().await;
            return self.core.result(());
        }

        let token = &self.core.token;
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    self.core.fail_cancelled();
                    break;
                }
                received = upstream.recv() => match received {
                    Ok(value) => {
                        if visit(value).is_break() {
                            break;
                        }
                    }
                    Err(_) => {
                        // Stages also end early on cancellation, so a close
                        // after cancel is not a complete result.
                        if token.is_cancelled() {
                            self.core.fail_cancelled();
                        }
                        break;
                    }
                },
            }
        }

        drop(upstream);
        self.core.shutdown().await;
        self.core.result(())
    }

    /// Calls `action` on every element in the order received.
    ///
    /// The order is the source order only when the stream is not parallel.
    pub async fn for_each<F>(&mut self, mut action: F) -> Result<()>
    where
        F: FnMut(T),
    {
        self.drain(|value| {
            action(value);
            ControlFlow::Continue(())
        })
        .await
    }

    /// Sorts the elements with `comparator`, then calls `action` on each.
    pub async fn for_each_ordered<C, F>(
        &mut self,
        comparator: C,
        action: F,
    ) -> Result<()>
    where
        C: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
        F: FnMut(T),
    {
        self.push_sorted(comparator);
        self.for_each(action).await
    }

    /// Collects every element.
    pub async fn to_vec(&mut self) -> Result<Vec<T>> {
        let mut values = Vec::new();
        self.for_each(|value| values.push(value)).await?;
        Ok(values)
    }

    /// Counts the elements.
    pub async fn count(&mut self) -> Result<usize> {
        let mut count = 0;
        self.for_each(|_| count += 1).await?;
        Ok(count)
    }

    /// Returns the smallest element according to `comparator`.
    ///
    /// The running minimum starts at `T::default()`, not at the first
    /// element, so a default value smaller than every element is returned
    /// as is. Use [`Stream::reduce_with_identity`] when that matters.
    pub async fn min<C>(&mut self, comparator: C) -> Result<T>
    where
        T: Default,
        C: Fn(&T, &T) -> Ordering,
    {
        let mut best = T::default();
        self.for_each(|value| {
            if comparator(&value, &best) == Ordering::Less {
                best = value;
            }
        })
        .await?;
        Ok(best)
    }

    /// Returns the largest element according to `comparator`.
    ///
    /// Seeded with `T::default()` like [`Stream::min`].
    pub async fn max<C>(&mut self, comparator: C) -> Result<T>
    where
        T: Default,
        C: Fn(&T, &T) -> Ordering,
    {
        let mut best = T::default();
        self.for_each(|value| {
            if comparator(&value, &best) == Ordering::Greater {
                best = value;
            }
        })
        .await?;
        Ok(best)
    }

    /// Returns the first element received.
    ///
    /// Fails with [`StreamError::EmptyStream`] when there is none.
    pub async fn find_first(&mut self) -> Result<T> {
        let mut found = None;
        self.drain(|value| {
            found = Some(value);
            ControlFlow::Break(())
        })
        .await?;
        found.ok_or_else(|| {
            self.core.fail(StreamError::EmptyStream);
            StreamError::EmptyStream
        })
    }

    /// Returns any element.
    ///
    /// Currently the first one received, exactly like [`Stream::find_first`].
    pub async fn find_any(&mut self) -> Result<T> {
        self.find_first().await
    }

    /// Folds the elements with `accumulator`, starting from `T::default()`.
    pub async fn reduce<F>(&mut self, accumulator: F) -> Result<T>
    where
        T: Default,
        F: Fn(T, T) -> T,
    {
        self.reduce_with_identity(T::default(), accumulator).await
    }

    /// Folds the elements with `accumulator`, starting from `identity`.
    pub async fn reduce_with_identity<F>(
        &mut self,
        identity: T,
        accumulator: F,
    ) -> Result<T>
    where
        F: Fn(T, T) -> T,
    {
        let mut result = Some(identity);
        self.for_each(|value| {
            result = result.take().map(|acc| accumulator(acc, value));
        })
        .await?;
        result.ok_or(StreamError::EmptyStream)
    }

    /// Returns true as soon as an element matches `predicate`.
    pub async fn any_match<F>(&mut self, predicate: F) -> Result<bool>
    where
        F: Fn(&T) -> bool,
    {
        let mut matched = false;
        self.drain(|value| {
            if predicate(&value) {
                matched = true;
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })
        .await?;
        Ok(matched)
    }

    /// Returns false as soon as an element fails `predicate`.
    pub async fn all_match<F>(&mut self, predicate: F) -> Result<bool>
    where
        F: Fn(&T) -> bool,
    {
        let mut all = true;
        self.drain(|value| {
            if !predicate(&value) {
                all = false;
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })
        .await?;
        Ok(all)
    }

    /// Returns false as soon as an element matches `predicate`.
    pub async fn none_match<F>(&mut self, predicate: F) -> Result<bool>
    where
        F: Fn(&T) -> bool,
    {
        Ok(!self.any_match(predicate).await?)
    }

    /// Shuts the pipeline down without draining it.
    ///
    /// Returns the pipeline's recorded error, if any, including a
    /// cancellation of its scope. Safe to call repeatedly and after a
    /// terminal operation.
    pub async fn close(&mut self) -> Result<()> {
        self.linked_or_consumed = true;
        self.outlet = None;
        self.core.record_cancellation();
        self.core.shutdown().await;
        self.core.result(())
    }

    /// Hands the final channel to the caller.
    ///
    /// The returned [`Outlet`] keeps the pipeline alive until it is closed or
    /// dropped.
    pub fn into_outlet(mut self) -> Outlet<T> {
        let upstream = self.begin_terminal();
        Outlet::new(upstream, std::sync::Arc::clone(&self.core))
    }
}
