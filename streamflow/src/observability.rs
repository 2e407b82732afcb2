//! Log output setup.
//!
//! Pipelines emit `tracing` events: stage start-up and shutdown at `debug`,
//! usage errors and panicking handlers at `warn`. Events carry the pipeline's
//! run id and name.

use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`, or `default_filter`
/// when the variable is unset.
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Installs a JSON subscriber, for log shippers.
///
/// Returns false if a global subscriber was already installed.
pub fn init_json_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        init_tracing("streamflow=debug");
        assert!(!init_tracing("streamflow=debug"));
        assert!(!init_json_tracing("info"));
    }
}
