//! Error types for SMTP operations.
//!
//! Server rejections are not errors: they are reported through
//! [`Outcome`](crate::Outcome). This type covers invalid input and
//! failures of the underlying stream.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Host name cannot be used for TLS server name verification.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Protocol error (malformed or unexpected data from the server).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    /// A connect, read or write deadline elapsed.
    #[error("Timed out during {0}")]
    Timeout(&'static str),
}

impl Error {
    /// Returns true if the error came from a deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<postwire_mime::Error> for Error {
    fn from(err: postwire_mime::Error) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}
