//! The final channel of a pipeline, handed to the caller.

use super::PipelineCore;
use crate::errors::Result;
use async_channel::Receiver;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Receiving end of a pipeline returned by [`Stream::into_outlet`].
///
/// Also implements [`futures::Stream`], so the usual combinators apply.
/// Dropping the outlet cancels the pipeline.
///
/// [`Stream::into_outlet`]: super::Stream::into_outlet
pub struct Outlet<T> {
    rx: Pin<Box<Receiver<T>>>,
    core: Arc<PipelineCore>,
}

impl<T> Outlet<T> {
    pub(super) fn new(rx: Receiver<T>, core: Arc<PipelineCore>) -> Self {
        Self {
            rx: Box::pin(rx),
            core,
        }
    }

    /// Receives the next element, or `None` once the pipeline is exhausted
    /// or cancelled.
    pub async fn recv(&mut self) -> Option<T> {
        let token = &self.core.token;
        tokio::select! {
            biased;
            () = token.cancelled() => None,
            received = self.rx.recv() => received.ok(),
        }
    }

    /// Stops the pipeline, waits for its workers and returns its error, if any.
    pub async fn close(self) -> Result<()> {
        let Self { rx, core } = self;
        drop(rx);
        core.record_cancellation();
        core.shutdown().await;
        core.result(())
    }
}

impl<T> futures::Stream for Outlet<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if self.core.token.is_cancelled() {
            return Poll::Ready(None);
        }
        futures::Stream::poll_next(self.rx.as_mut(), cx)
    }
}

impl<T> std::fmt::Debug for Outlet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outlet")
            .field("run_id", &self.core.run_id)
            .field("name", &self.core.config.name)
            .field("pending", &self.rx.len())
            .finish_non_exhaustive()
    }
}
