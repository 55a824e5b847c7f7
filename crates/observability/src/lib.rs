//! Tracing and logging (shared setup).

pub mod logging;
pub mod tracing;

pub use logging::LoggingConfig;

/// Initialize process-wide tracing/logging.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &LoggingConfig) {
    tracing::init(config);
}
