#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Log
//!
//! tracing-subscriber initialisation for Weft binaries and tests. Library
//! crates only depend on `tracing`; installing a subscriber is the
//! application's call, made once through [`LoggerBuilder`].
//!
//! ```rust,ignore
//! weft_log::LoggerBuilder::new().pretty().init()?;
//! ```

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Failed to install the global subscriber.
#[derive(Debug, Error)]
#[error("logger initialisation failed: {0}")]
pub struct LogInitError(String);

/// Output format preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human-readable output for development.
    Pretty,
    /// Single-line output for terminals and CI.
    #[default]
    Compact,
    /// JSON lines for log shippers.
    Json,
}

/// Builder for the process-wide tracing subscriber.
#[derive(Debug, Clone, Default)]
pub struct LoggerBuilder {
    format: LogFormat,
    default_directive: Option<String>,
}

impl LoggerBuilder {
    /// Start building with the compact preset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the pretty preset.
    #[must_use]
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Use the compact preset.
    #[must_use]
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Use the JSON preset.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Directive used when `RUST_LOG` is unset (e.g. `"weft=debug,info"`).
    #[must_use]
    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = Some(directive.into());
        self
    }

    /// Install the global subscriber. Honors `RUST_LOG` when set.
    pub fn init(self) -> Result<(), LogInitError> {
        let filter = match &self.default_directive {
            Some(directive) => EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(directive))
                .map_err(|e| LogInitError(e.to_string()))?,
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let base = tracing_subscriber::fmt().with_env_filter(filter);
        let result = match self.format {
            LogFormat::Pretty => base.pretty().try_init(),
            LogFormat::Compact => base.compact().try_init(),
            LogFormat::Json => base.json().try_init(),
        };
        result.map_err(|e| LogInitError(e.to_string()))
    }
}
