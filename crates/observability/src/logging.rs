//! Logging configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `taskmgr_auth=debug,info`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,

    /// JSON lines when true, human-readable output otherwise.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: LoggingConfig = serde_json::from_value(serde_json::json!({ "json": false })).unwrap();
        assert_eq!(cfg.level, "info");
        assert!(!cfg.json);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_value::<LoggingConfig>(serde_json::json!({ "format": "json" })).is_err());
    }
}
