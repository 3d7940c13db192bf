//! Diagnostics via `RUST_LOG`, written to stderr.
//!
//! Blocking history is the durable record of refused attempts; tracing
//! output is for operators and is never persisted.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Calling it again after a
/// subscriber is installed does nothing.
///
/// ```bash
/// RUST_LOG=agentgate=debug my-pipeline
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        init();
        init();
        tracing::warn!("logging initialized twice");
    }
}
