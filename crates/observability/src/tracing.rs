//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

use crate::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `config.level`. Safe to call multiple times
/// (subsequent calls are no-ops).
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.pretty().try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig {
            level: "not a valid directive ===".to_string(),
            json: true,
        };
        init(&config);
        init(&LoggingConfig::default());
    }
}
