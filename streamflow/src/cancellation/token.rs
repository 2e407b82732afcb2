//! Cancellation token for cooperative cancellation.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// A callback type for cancellation notifications. Receives the reason.
pub type CancelCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Key of a callback registered with [`CancellationToken::on_cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackId(u64);

/// Reason recorded when a deadline set by [`CancellationToken::cancel_after`] fires.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// A token for cooperative cancellation.
///
/// Tokens are shared as `Arc<CancellationToken>`. Every stage of a stream holds
/// the same token, so cancelling it stops the whole pipeline.
///
/// Cancellation is idempotent - only the first cancellation reason is kept.
#[derive(Default)]
pub struct CancellationToken {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Callbacks to invoke on cancellation, in registration order.
    callbacks: RwLock<BTreeMap<CallbackId, CancelCallback>>,
    /// Source of callback keys.
    next_callback: AtomicU64,
    /// The parent this token is registered with, if it is a child.
    parent: Mutex<Option<(Weak<CancellationToken>, CallbackId)>>,
    /// Wakes tasks parked in [`CancellationToken::cancelled`].
    notify: Notify,
}

impl CancellationToken {
    /// Creates a new, uncancelled root token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Derives a child token.
    ///
    /// The child is cancelled whenever this token is, with the parent's reason.
    /// Cancelling the child leaves the parent untouched. Once the child is
    /// cancelled or dropped its registration is removed from the parent.
    #[must_use]
    pub fn child_token(self: &Arc<Self>) -> Arc<Self> {
        let child = Self::new();
        let weak: Weak<Self> = Arc::downgrade(&child);
        let id = self.on_cancel(move |reason| {
            if let Some(child) = weak.upgrade() {
                child.cancel(reason);
            }
        });
        *child.parent.lock() = Some((Arc::downgrade(self), id));
        if child.is_cancelled() {
            child.detach();
        }
        child
    }

    /// Removes this token's registration from its parent.
    fn detach(&self) {
        let link = self.parent.lock().take();
        if let Some((parent, id)) = link {
            if let Some(parent) = parent.upgrade() {
                parent.remove_callback(id);
            }
        }
    }

    /// Requests cancellation with a reason.
    ///
    /// This is idempotent - only the first reason is kept.
    /// Callbacks are invoked immediately. Panics in callbacks are logged and suppressed.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        // Registration and cancellation serialize on the callbacks lock, so a
        // callback is either queued here or sees the reason already set.
        let callbacks = {
            let mut callbacks = self.callbacks.write();
            if self
                .cancelled
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
            *self.reason.write() = Some(reason.clone());
            std::mem::take(&mut *callbacks)
        };
        debug!(reason = %reason, "cancellation requested");
        self.notify.notify_waiters();
        self.detach();

        for callback in callbacks.values() {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&reason);
            })) {
                warn!("Cancellation callback panicked: {:?}", e);
            }
        }
    }

    /// Cancels the token with [`DEADLINE_EXCEEDED`] once `timeout` elapses.
    ///
    /// The timer task exits early if the token is cancelled first.
    /// Must be called from within a tokio runtime.
    pub fn cancel_after(self: &Arc<Self>, timeout: Duration) {
        let token = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(timeout) => token.cancel(DEADLINE_EXCEEDED),
            }
        });
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately. The returned
    /// key removes the callback with [`CancellationToken::remove_callback`].
    pub fn on_cancel<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_callback.fetch_add(1, Ordering::Relaxed));
        {
            let mut callbacks = self.callbacks.write();
            if !self.is_cancelled() {
                callbacks.insert(id, Box::new(callback));
                return id;
            }
        }
        let reason = self.reason().unwrap_or_default();
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback(&reason);
        })) {
            warn!("Cancellation callback panicked: {:?}", e);
        }
        id
    }

    /// Removes a callback that has not run yet.
    ///
    /// Returns false if it already ran or was removed.
    pub fn remove_callback(&self, id: CallbackId) -> bool {
        self.callbacks.write().remove(&id).is_some()
    }

    /// Returns the number of callbacks waiting for cancellation.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Completes once the token is cancelled.
    ///
    /// Returns immediately for a token that is already cancelled.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

impl Drop for CancellationToken {
    fn drop(&mut self) {
        self.detach();
    }
}
