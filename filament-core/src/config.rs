//! Runtime configuration.
//!
//! The reactive runtime is per-thread, so configuration is installed per
//! thread as well. Hosts usually install it once at start-up, for example
//! from a JSON settings file:
//!
//! ```rust
//! use filament_core::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json(r#"{ "max_flush_iterations": 500 }"#).unwrap();
//! config.install();
//! assert_eq!(RuntimeConfig::current().max_flush_iterations, 500);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reactive::runtime;

/// Default number of flush waves before a flush is considered runaway.
pub const DEFAULT_MAX_FLUSH_ITERATIONS: usize = 10_000;

/// Tunables of the per-thread reactive runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many waves a single flush may process before it aborts.
    ///
    /// A wave is one pass over the pure queue or one effect. An effect that
    /// keeps writing to its own dependencies re-queues itself forever; this
    /// limit turns that into a diagnostic panic instead of a hang.
    pub max_flush_iterations: usize,
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_flush_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "max_flush_iterations",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Install this configuration for the current thread's runtime.
    pub fn install(self) {
        runtime::with_runtime(|rt| rt.set_config(self));
    }

    /// The configuration of the current thread's runtime.
    pub fn current() -> Self {
        runtime::with_runtime(|rt| rt.config())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: DEFAULT_MAX_FLUSH_ITERATIONS,
        }
    }
}

/// Whether this is a server build (the `server` cargo feature).
///
/// Timer-driven primitives are inert on the server.
pub const fn is_server() -> bool {
    cfg!(feature = "server")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let err = RuntimeConfig::from_json(r#"{ "max_flush_iterations": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_flush_iterations", .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = RuntimeConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
