//! Error types for the Ipwarden limiter.

use thiserror::Error;

/// Main error type for Ipwarden operations.
///
/// None of these are produced on the admission path; they surface while
/// loading and validating configuration at startup.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A whitelist or blacklist entry that is neither an IP nor a CIDR range
    #[error("Invalid {list} entry: {entry:?}")]
    InvalidListEntry {
        /// Which list the entry came from ("whitelist" or "blacklist")
        list: &'static str,
        /// The offending entry as configured
        entry: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for WardenError {
    fn from(err: config::ConfigError) -> Self {
        WardenError::Config(err.to_string())
    }
}

/// Result type alias for Ipwarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
