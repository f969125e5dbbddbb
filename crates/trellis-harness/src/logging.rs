//! Diagnostic logging for harness binaries
//!
//! Reporter output goes to the console sinks. This is for the framework's
//! own `tracing` events, written to stderr.

use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: Once = Once::new();

/// Filter used when neither `RUST_LOG` nor `--log` is given
pub const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber, once per process
///
/// `RUST_LOG` wins over `fallback`. If another subscriber is already
/// installed (e.g. by the embedding binary) it is left in place.
pub fn init_tracing(fallback: Option<&str>) {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(fallback.unwrap_or(DEFAULT_FILTER)))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(Some("debug"));
        init_tracing(Some("not a [valid filter"));
        tracing::debug!("still logging");
    }
}
