//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
///
/// Delivery rejections are not errors; they come back as an
/// [`postwire_smtp::Outcome`].
#[derive(Debug, Error)]
pub enum Error {
    /// Settings are missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// SMTP engine rejected its input.
    #[error("SMTP error: {0}")]
    Smtp(#[from] postwire_smtp::Error),

    /// Message could not be built.
    #[error("Message error: {0}")]
    Mime(#[from] postwire_mime::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
