//! Header mailboxes (`Display Name <local@domain>`).

use crate::encoding::{encode_rfc2047, needs_rfc2047};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Characters that require a display name to be quoted (RFC 5322 `specials`).
const SPECIALS: &str = "()<>[]:;@\\,.\"";

/// Mailbox (optional display name + address) as it appears in
/// `From`, `To` and `Reply-To` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (optional).
    pub name: Option<String>,
    /// Email address.
    pub email: String,
}

impl Mailbox {
    /// Creates a new mailbox with just an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(email: impl Into<String>) -> Result<Self> {
        let email = email.into();
        validate_addr_spec(&email)?;
        Ok(Self { name: None, email })
    }

    /// Creates a new mailbox with a display name and address.
    ///
    /// An empty display name is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or the name contains a line break.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.contains(['\r', '\n']) {
            return Err(Error::InvalidAddress("display name contains a line break".into()));
        }
        let mut mailbox = Self::new(email)?;
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            mailbox.name = Some(trimmed.to_string());
        }
        Ok(mailbox)
    }

    /// Returns the domain part of the address.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.email
            .rsplit_once('@')
            .map_or("localhost", |(_, domain)| domain)
    }

    /// Formats the mailbox for a header field, encoding the display name
    /// when it is not plain ASCII.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        match &self.name {
            None => self.email.clone(),
            Some(name) if needs_rfc2047(name) => {
                format!("{} <{}>", encode_rfc2047(name), self.email)
            }
            Some(name) if name.contains(|c: char| SPECIALS.contains(c)) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\" <{}>", self.email)
            }
            Some(name) => format!("{name} <{}>", self.email),
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.email),
            None => write!(f, "{}", self.email),
        }
    }
}

impl FromStr for Mailbox {
    type Err = Error;

    /// Parses `local@domain` or `Display Name <local@domain>`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match (s.rfind('<'), s.strip_suffix('>')) {
            (Some(open), Some(inner)) => {
                let email = &inner[open + 1..];
                let name = s[..open].trim().trim_matches('"');
                Self::with_name(name, email.trim())
            }
            _ => Self::new(s),
        }
    }
}

/// Validates an address (basic validation).
///
/// Rejects anything that could break out of a header or an SMTP command:
/// whitespace, control characters, angle brackets and commas.
///
/// # Errors
///
/// Returns an error describing the first problem found.
pub fn validate_addr_spec(addr: &str) -> Result<()> {
    if addr.is_empty() {
        return Err(Error::InvalidAddress("Address cannot be empty".into()));
    }

    if addr
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | ','))
    {
        return Err(Error::InvalidAddress(format!(
            "Address contains forbidden characters: {addr:?}"
        )));
    }

    let Some((local, domain)) = addr.rsplit_once('@') else {
        return Err(Error::InvalidAddress("Address must contain @".into()));
    };

    if local.is_empty() || domain.is_empty() {
        return Err(Error::InvalidAddress(
            "Local and domain parts cannot be empty".into(),
        ));
    }

    if domain.contains('@') || (local.contains('@') && !local.starts_with('"')) {
        return Err(Error::InvalidAddress(
            "Address must have exactly one @".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_new() {
        let mailbox = Mailbox::new("user@example.com").unwrap();
        assert_eq!(mailbox.email, "user@example.com");
        assert!(mailbox.name.is_none());
        assert_eq!(mailbox.to_header_value(), "user@example.com");
    }

    #[test]
    fn test_mailbox_with_name() {
        let mailbox = Mailbox::with_name("Review Desk", "desk@example.com").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Review Desk"));
        assert_eq!(mailbox.to_header_value(), "Review Desk <desk@example.com>");
        assert_eq!(mailbox.domain(), "example.com");
    }

    #[test]
    fn test_mailbox_quotes_specials() {
        let mailbox = Mailbox::with_name("Doe, John", "john@example.com").unwrap();
        assert_eq!(mailbox.to_header_value(), "\"Doe, John\" <john@example.com>");
    }

    #[test]
    fn test_mailbox_encodes_non_ascii_name() {
        let mailbox = Mailbox::with_name("Zoë", "zoe@example.com").unwrap();
        assert_eq!(mailbox.to_header_value(), "=?utf-8?B?Wm/Dqw==?= <zoe@example.com>");
    }

    #[test]
    fn test_mailbox_empty_name_is_absent() {
        let mailbox = Mailbox::with_name("  ", "a@example.com").unwrap();
        assert!(mailbox.name.is_none());
    }

    #[test]
    fn test_mailbox_parse() {
        let mailbox: Mailbox = "Review Desk <desk@example.com>".parse().unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Review Desk"));
        assert_eq!(mailbox.email, "desk@example.com");

        let mailbox: Mailbox = "\"Quoted Name\" <q@example.com>".parse().unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Quoted Name"));

        let mailbox: Mailbox = "plain@example.com".parse().unwrap();
        assert!(mailbox.name.is_none());
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(Mailbox::new("").is_err());
        assert!(Mailbox::new("userexample.com").is_err());
        assert!(Mailbox::new("@example.com").is_err());
        assert!(Mailbox::new("user@").is_err());
        assert!(Mailbox::new("a@b@c").is_err());
        assert!(Mailbox::new("user@example.com>\r\nRCPT TO:<x@y>").is_err());
        assert!(Mailbox::new("us er@example.com").is_err());
    }

    #[test]
    fn test_name_with_line_break_rejected() {
        assert!(Mailbox::with_name("Evil\r\nBcc: x@y", "a@example.com").is_err());
    }
}
