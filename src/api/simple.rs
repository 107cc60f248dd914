// Process-wide logging setup for embedders that do not install their own subscriber.

use std::sync::Once;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset. Connection churn from the HTTP stack stays quiet.
pub const DEFAULT_LOG_FILTER: &str = "info,hyper=warn,reqwest=warn";

static INIT_TRACING: Once = Once::new();

/// Install the global tracing subscriber once. Later calls, and hosts that
/// already installed a subscriber, are left alone.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok();

        if installed {
            info!(
                "offline cache logging ready version={}",
                env!("CARGO_PKG_VERSION")
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_repeatable() {
        init_tracing();
        init_tracing();
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
