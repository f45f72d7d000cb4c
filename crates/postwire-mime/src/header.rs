//! MIME header handling.

use crate::error::{Error, Result};
use std::fmt;

/// Ordered collection of email headers.
///
/// Headers are emitted in insertion order. Names are matched
/// case-insensitively. Values are stored already encoded for the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a valid field name or the value
    /// contains a line break that is not folding whitespace.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        validate_name(&name)?;
        validate_value(&name, &value)?;
        self.headers.push((name, value));
        Ok(())
    }

    /// Sets a header value, replacing any existing values.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as [`Headers::add`].
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.remove(&name);
        self.add(name, value)
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the number of header fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if there are no header fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
        return Err(Error::InvalidHeader(format!("bad field name: {name:?}")));
    }
    Ok(())
}

/// Only CRLF followed by a space (folding produced by RFC 2047 encoding)
/// may appear inside a value.
fn validate_value(name: &str, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        let ok = match b {
            b'\r' => bytes.get(i + 1) == Some(&b'\n') && bytes.get(i + 2) == Some(&b' '),
            b'\n' => i > 0 && bytes[i - 1] == b'\r' && bytes.get(i + 1) == Some(&b' '),
            _ => true,
        };
        if !ok {
            return Err(Error::InvalidHeader(format!(
                "line break in value of {name}"
            )));
        }
    }
    Ok(())
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
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
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain").unwrap();
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_headers_set_replaces() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com").unwrap();
        headers.add("To", "bob@example.com").unwrap();
        headers.set("to", "charlie@example.com").unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("To"), Some("charlie@example.com"));
    }

    #[test]
    fn test_headers_keep_insertion_order() {
        let mut headers = Headers::new();
        headers.add("From", "a@example.com").unwrap();
        headers.add("To", "b@example.com").unwrap();
        headers.add("Subject", "Hi").unwrap();
        assert_eq!(
            headers.to_string(),
            "From: a@example.com\r\nTo: b@example.com\r\nSubject: Hi\r\n"
        );
    }

    #[test]
    fn test_header_injection_rejected() {
        let mut headers = Headers::new();
        assert!(headers.add("Subject", "Hi\r\nBcc: victim@example.com").is_err());
        assert!(headers.add("Subject", "Hi\nBcc: victim@example.com").is_err());
        assert!(headers.add("Subject", "trailing\r").is_err());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_folded_value_accepted() {
        let mut headers = Headers::new();
        headers
            .add("Subject", "=?utf-8?B?w6k=?=\r\n =?utf-8?B?w6k=?=")
            .unwrap();
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_bad_field_name_rejected() {
        let mut headers = Headers::new();
        assert!(headers.add("", "value").is_err());
        assert!(headers.add("Bad Name", "value").is_err());
        assert!(headers.add("Bad:Name", "value").is_err());
    }
}
