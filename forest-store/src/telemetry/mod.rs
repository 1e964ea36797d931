//! Tracing Setup
//!
//! `TigerStyle`: Optional subscriber installation with graceful fallback. Never
//! panics if a global subscriber is already set.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the embedding application. This module is the convenience path.
//!
//! ```rust,no_run
//! use forest_store::telemetry::{init_tracing, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .filter("forest_store=debug")
//!     .ansi(false)
//!     .build();
//! init_tracing(&config).expect("tracing init");
//! ```

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::constants::TELEMETRY_FILTER_DEFAULT;

/// Telemetry configuration errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Subscriber installation failed
    #[error("tracing initialization failed: {reason}")]
    InitFailed {
        /// The reason for the failure
        reason: String,
    },

    /// Filter directive did not parse
    #[error("invalid filter directive {directive:?}: {reason}")]
    InvalidFilter {
        /// The rejected directive
        directive: String,
        /// Parser message
        reason: String,
    },
}

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Configuration for the fmt subscriber.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `"forest_store=debug,warn"`
    pub filter: String,
    /// Emit ANSI colour codes
    pub ansi: bool,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: TELEMETRY_FILTER_DEFAULT.to_string(),
            ansi: true,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create a new builder for `TelemetryConfig`
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns [`TelemetryError::InvalidFilter`] if the directive is empty or
    /// does not parse.
    pub fn validate(&self) -> Result<()> {
        self.env_filter().map(|_| ())
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        if self.filter.trim().is_empty() {
            return Err(TelemetryError::InvalidFilter {
                directive: self.filter.clone(),
                reason: "directive cannot be empty".to_string(),
            });
        }
        EnvFilter::try_new(&self.filter).map_err(|e| TelemetryError::InvalidFilter {
            directive: self.filter.clone(),
            reason: e.to_string(),
        })
    }
}

/// Builder for `TelemetryConfig`
#[derive(Default)]
pub struct TelemetryConfigBuilder {
    filter: Option<String>,
    ansi: Option<bool>,
    with_target: Option<bool>,
}

impl TelemetryConfigBuilder {
    /// Set the filter directive
    #[must_use]
    pub fn filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    /// Enable or disable ANSI colours
    #[must_use]
    pub fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = Some(ansi);
        self
    }

    /// Show or hide event targets
    #[must_use]
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = Some(with_target);
        self
    }

    /// Build the `TelemetryConfig`
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let default = TelemetryConfig::default();
        TelemetryConfig {
            filter: self.filter.unwrap_or(default.filter),
            ansi: self.ansi.unwrap_or(default.ansi),
            with_target: self.with_target.unwrap_or(default.with_target),
        }
    }
}

/// Install a global fmt subscriber.
///
/// # Errors
/// Returns [`TelemetryError::InvalidFilter`] for a bad directive and
/// [`TelemetryError::InitFailed`] if a global subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let filter = config.env_filter()?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(config.with_target)
        .try_init()
        .map_err(|e| TelemetryError::InitFailed {
            reason: e.to_string(),
        })?;

    tracing::debug!(filter = %config.filter, "tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.filter, TELEMETRY_FILTER_DEFAULT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = TelemetryConfig::builder()
            .filter("forest_store=trace")
            .ansi(false)
            .with_target(false)
            .build();

        assert_eq!(config.filter, "forest_store=trace");
        assert!(!config.ansi);
        assert!(!config.with_target);
    }

    #[test]
    fn test_config_validation() {
        let config = TelemetryConfig::builder().filter("   ").build();
        assert!(matches!(
            config.validate(),
            Err(TelemetryError::InvalidFilter { .. })
        ));

        let config = TelemetryConfig::builder().filter("forest_store=loud").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_second_init_fails_gracefully() {
        let config = TelemetryConfig::builder().ansi(false).build();
        // Another test binary thread may have won the race; either way the
        // second call must not panic.
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::InitFailed { .. })
        ));
    }
}
