//! Tracing subscriber bootstrap for binaries and tests.

use crate::config::EngineConfig;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. Returns `false` when a subscriber
/// was already installed, which makes repeated calls from tests harmless.
pub fn init_logging(level: &str, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Logging already initialized: {}", e);
            false
        }
    }
}

/// Install the global subscriber from the `[general]` section
pub fn init_from_config(config: &EngineConfig) -> bool {
    init_logging(&config.general().log_level, config.general().log_json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let _ = init_logging("warn", false);
        assert!(!init_logging("debug", true));
    }
}
