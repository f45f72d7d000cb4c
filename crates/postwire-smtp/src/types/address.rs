//! Envelope address types.

use crate::error::{Error, Result};
use postwire_mime::{Mailbox, validate_addr_spec};

/// Email address for the SMTP envelope (`MAIL FROM` / `RCPT TO`).
///
/// Validation rejects anything that could terminate the command line or
/// inject a second command, so the value can be written between angle
/// brackets as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        validate_addr_spec(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Mailbox> for Address {
    fn from(mailbox: &Mailbox) -> Self {
        Self(mailbox.email.clone())
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(Address::new("userexample.com").is_err());
        assert!(Address::new("").is_err());
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("user@").is_err());
        assert!(Address::new("a@b@c").is_err());
    }

    #[test]
    fn test_command_injection_rejected() {
        let err = Address::new("a@example.com>\r\nRCPT TO:<b@example.com").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
        assert!(Address::new("a@example.com> SIZE=1").is_err());
    }

    #[test]
    fn test_from_mailbox() {
        let mailbox = Mailbox::with_name("Desk", "desk@example.com").unwrap();
        assert_eq!(Address::from(&mailbox).as_str(), "desk@example.com");
    }
}
