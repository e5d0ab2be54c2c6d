//! Error handling for the cleanup job.
//!
//! Every fallible operation returns [`Result`], whose error is the
//! [`CleanupError`] enum. The variants follow the failure taxonomy of the job:
//!
//! - [`CleanupError::Config`]: connection parameters, table names or cleaning
//!   rules are missing or malformed. Raised before any remote I/O.
//! - [`CleanupError::Warehouse`]: the remote engine rejected a statement or the
//!   HTTP exchange failed. Propagated verbatim, never retried.
//! - [`CleanupError::DataProcessing`]: a frame operation failed (Polars errors,
//!   columns of an unexpected type).
//!
//! ```
//! use claims_cleanup::error::CleanupError;
//!
//! fn exit_reason(err: &CleanupError) -> &'static str {
//!     match err {
//!         CleanupError::Config(_) => "bad configuration",
//!         CleanupError::Warehouse(_) => "remote engine failure",
//!         _ => "other failure",
//!     }
//! }
//! ```
//!
//! ## Context
//!
//! [`ResultExt::context`] prefixes a message onto an error while keeping its
//! variant, so callers can still tell a configuration error from an I/O one:
//!
//! ```no_run
//! use claims_cleanup::error::{Result, ResultExt as _};
//!
//! fn load_rules(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path).context("Failed to read cleaning rules")
//! }
//! ```

use std::fmt;

/// Main error type for cleanup operations.
#[derive(Debug)]
pub enum CleanupError {
    /// Missing or malformed configuration (environment, rules file)
    Config(String),

    /// Failures reported by the remote SQL engine or its HTTP transport
    Warehouse(String),

    /// Frame-level failures (Polars, unexpected column types)
    DataProcessing(String),

    /// Local I/O errors (rules file, log directory)
    Io(std::io::Error),
}

impl CleanupError {
    /// Prefix `msg` onto the error, keeping the variant.
    #[must_use]
    pub fn context(self, msg: impl fmt::Display) -> Self {
        match self {
            Self::Config(m) => Self::Config(format!("{msg}: {m}")),
            Self::Warehouse(m) => Self::Warehouse(format!("{msg}: {m}")),
            Self::DataProcessing(m) => Self::DataProcessing(format!("{msg}: {m}")),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), format!("{msg}: {e}"))),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_warehouse(&self) -> bool {
        matches!(self, Self::Warehouse(_))
    }
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Warehouse(msg) => write!(f, "Warehouse error: {msg}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CleanupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CleanupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for CleanupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for CleanupError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<reqwest::Error> for CleanupError {
    fn from(err: reqwest::Error) -> Self {
        Self::Warehouse(err.to_string())
    }
}

/// Result type alias for cleanup operations.
pub type Result<T> = std::result::Result<T, CleanupError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error, converted and prefixed with `msg`.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    ///
    /// # Errors
    ///
    /// Returns the original error, converted and prefixed with the closure's message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<CleanupError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().context(f()))
    }
}
