//! Error types for MIME operations.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Invalid header name or value.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Invalid mailbox or address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Missing required field when building a message.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Neither a text nor an HTML body was supplied.
    #[error("Message has no body")]
    MissingBody,
}
