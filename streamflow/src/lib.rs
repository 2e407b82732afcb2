//! # Streamflow
//!
//! Lazy stream pipelines whose stages run as tokio tasks connected by
//! bounded channels.
//!
//! Streamflow provides:
//!
//! - **Sources**: finite values, external channels, generators and concatenation
//! - **Streaming and barrier operators**: `map`, `filter`, `skip`, `limit`, `distinct`, `sorted`
//! - **Fan-out parallelism**: several workers per stage sharing one input and one output
//! - **Cooperative cancellation**: every channel operation races the caller's scope
//! - **First-error-wins reporting**: misuse and cancellation surface from the terminal operation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use streamflow::prelude::*;
//!
//! let scope = CancellationToken::new();
//! let lengths = map_to(
//!     Stream::of(&scope, ["hello", "golang", "hi"]).filter(|w| w.len() > 2),
//!     str::len,
//! )
//! .to_vec()
//! .await?;
//! assert_eq!(lengths, vec![5, 6]);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod function;
pub mod observability;
pub mod stream;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, DEADLINE_EXCEEDED};
    pub use crate::config::StreamConfig;
    pub use crate::errors::{StreamError, UsageError};
    pub use crate::function::{comparing, from_sign, natural_order, reverse_order};
    pub use crate::stream::{
        flat_map_to, group_by, map_to, reduce_to, Outlet, Stream, StreamBuilder,
    };
}
