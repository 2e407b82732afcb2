//! Structured cancellation and shutdown utilities.
//!
//! This module provides:
//! - CancellationToken for cooperative cancellation shared by every stage
//! - WorkerGroup for tracking the worker tasks of one pipeline
//! - CleanupRegistry for LIFO close handlers

mod cleanup;
mod task_group;
mod token;

pub use cleanup::CleanupRegistry;
pub use task_group::{WorkerGroup, WorkerPanic};
pub use token::{CallbackId, CancelCallback, CancellationToken, DEADLINE_EXCEEDED};
