//! Close handlers run when a pipeline shuts down.

use parking_lot::Mutex;
use tracing::warn;

/// A close handler, with optional name.
struct CleanupCallback {
    /// The callback function.
    callback: Box<dyn FnOnce() + Send>,
    /// Optional name for the callback.
    name: Option<String>,
}

impl CleanupCallback {
    /// Runs the callback, returning false if it panicked.
    fn run(self) -> bool {
        let name = self.name.as_deref().unwrap_or("<unnamed>");
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(self.callback)) {
            Ok(()) => true,
            Err(panic) => {
                warn!("{}: close handler panicked: {:?}", name, panic);
                false
            }
        }
    }
}

/// Registry for close handlers executed in LIFO order.
///
/// Once [`CleanupRegistry::run_all`] has run, the registry is closed and
/// later registrations run immediately.
pub struct CleanupRegistry {
    /// Registered callbacks; `None` once closed.
    callbacks: Mutex<Option<Vec<CleanupCallback>>>,
}

impl Default for CleanupRegistry {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(Some(Vec::new())),
        }
    }
}

impl CleanupRegistry {
    /// Creates a new cleanup registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a close handler, or runs it at once if the registry is
    /// already closed.
    ///
    /// If a name is provided, it's reported alongside any panic.
    pub fn register<F>(&self, callback: F, name: Option<&str>)
    where
        F: FnOnce() + Send + 'static,
    {
        let entry = CleanupCallback {
            callback: Box::new(callback),
            name: name.map(String::from),
        };
        let late = {
            let mut callbacks = self.callbacks.lock();
            match callbacks.as_mut() {
                Some(pending) => {
                    pending.push(entry);
                    None
                }
                None => Some(entry),
            }
        };
        if let Some(entry) = late {
            entry.run();
        }
    }

    /// Runs all registered handlers in LIFO order and closes the registry.
    ///
    /// A panicking handler is logged and does not stop the others.
    /// Returns the names of the handlers that panicked.
    pub fn run_all(&self) -> Vec<String> {
        let callbacks = self.callbacks.lock().take().unwrap_or_default();
        let mut failures = Vec::new();

        for entry in callbacks.into_iter().rev() {
            let name = entry.name.clone().unwrap_or_else(|| "<unnamed>".to_string());
            if !entry.run() {
                failures.push(name);
            }
        }

        failures
    }

    /// Returns the number of pending handlers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.callbacks.lock().as_ref().map_or(0, Vec::len)
    }

    /// Returns true once the handlers have run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.callbacks.lock().is_none()
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}
