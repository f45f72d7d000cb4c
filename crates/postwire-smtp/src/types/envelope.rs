//! SMTP envelope.

use super::Address;
use crate::error::{Error, Result};

/// Sender and recipients as presented to the server, independent of the
/// `From`/`To` headers inside the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    from: Address,
    to: Vec<Address>,
}

impl Envelope {
    /// Creates an envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if `to` is empty.
    pub fn new(from: Address, to: Vec<Address>) -> Result<Self> {
        if to.is_empty() {
            return Err(Error::InvalidAddress("envelope has no recipients".into()));
        }
        Ok(Self { from, to })
    }

    /// Creates an envelope with a single recipient.
    #[must_use]
    pub fn single(from: Address, to: Address) -> Self {
        Self { from, to: vec![to] }
    }

    /// Returns the reverse-path.
    #[must_use]
    pub const fn sender(&self) -> &Address {
        &self.from
    }

    /// Returns the forward-paths, in order.
    #[must_use]
    pub fn recipients(&self) -> &[Address] {
        &self.to
    }
}
