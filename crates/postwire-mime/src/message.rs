//! Built MIME messages and their wire form.

use crate::boundary::Boundary;
use crate::content_type::ContentType;
use crate::encoding::{dot_stuff, encode_quoted_printable, is_7bit_safe, normalize_line_endings};
use crate::header::Headers;
use std::fmt;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII, lines of at most 998 characters.
    SevenBit,
    /// Quoted-Printable encoding.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Picks the lightest encoding that keeps CRLF-normalized `text` intact.
    #[must_use]
    pub fn for_text(text: &str) -> Self {
        if is_7bit_safe(text) {
            Self::SevenBit
        } else {
            Self::QuotedPrintable
        }
    }

    /// Encodes CRLF-normalized text.
    #[must_use]
    pub fn encode(self, text: &str) -> String {
        match self {
            Self::SevenBit => text.to_string(),
            Self::QuotedPrintable => encode_quoted_printable(text),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
        }
    }
}

/// MIME message part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part content type.
    pub content_type: ContentType,
    /// Transfer encoding applied to `body`.
    pub transfer_encoding: TransferEncoding,
    /// Encoded body with CRLF line endings.
    pub body: String,
}

impl Part {
    /// Creates a text part, normalizing line endings and choosing an encoding.
    #[must_use]
    pub fn text(content: &str, content_type: ContentType) -> Self {
        let normalized = normalize_line_endings(content);
        let transfer_encoding = TransferEncoding::for_text(&normalized);
        Self {
            body: transfer_encoding.encode(&normalized),
            content_type,
            transfer_encoding,
        }
    }
}

/// MIME message ready for transmission.
///
/// Created by [`MessageBuilder`](crate::MessageBuilder).
#[derive(Debug, Clone)]
pub struct Message {
    pub(crate) headers: Headers,
    pub(crate) subject: String,
    pub(crate) text_body: String,
    pub(crate) html_body: Option<String>,
    pub(crate) boundary: Option<Boundary>,
    pub(crate) parts: Vec<Part>,
}

impl Message {
    /// Returns the top-level headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the subject as supplied to the builder.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the plain-text body as supplied (or derived from HTML).
    #[must_use]
    pub fn text_body(&self) -> &str {
        &self.text_body
    }

    /// Returns the HTML body, if any.
    #[must_use]
    pub fn html_body(&self) -> Option<&str> {
        self.html_body.as_deref()
    }

    /// Returns the multipart boundary, or `None` for single-part messages.
    #[must_use]
    pub const fn boundary(&self) -> Option<&Boundary> {
        self.boundary.as_ref()
    }

    /// Returns the body parts (one for single-part messages).
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Returns the RFC 5322 message with CRLF line endings.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Returns the exact bytes to transmit after `DATA` is accepted.
    ///
    /// The payload is dot-stuffed and ends with CRLF. The terminating
    /// `.` line is not included.
    #[must_use]
    pub fn data_payload(&self) -> Vec<u8> {
        let mut payload = dot_stuff(&self.to_bytes());
        if !payload.ends_with(b"\r\n") {
            payload.extend_from_slice(b"\r\n");
        }
        payload
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.headers)?;

        match &self.boundary {
            None => {
                for part in &self.parts {
                    f.write_str(&part.body)?;
                }
            }
            Some(boundary) => {
                for part in &self.parts {
                    write!(f, "{}\r\n", boundary.delimiter())?;
                    write!(f, "Content-Type: {}\r\n", part.content_type)?;
                    write!(
                        f,
                        "Content-Transfer-Encoding: {}\r\n\r\n",
                        part.transfer_encoding
                    )?;
                    write!(f, "{}\r\n", part.body)?;
                }
                write!(f, "{}\r\n", boundary.close_delimiter())?;
            }
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
    fn test_transfer_encoding_choice() {
        assert_eq!(TransferEncoding::for_text("plain"), TransferEncoding::SevenBit);
        assert_eq!(
            TransferEncoding::for_text("naïve"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::SevenBit.to_string(), "7bit");
        assert_eq!(
            TransferEncoding::QuotedPrintable.to_string(),
            "quoted-printable"
        );
    }

    #[test]
    fn test_text_part_normalizes_line_endings() {
        let part = Part::text("a\nb", ContentType::text_plain());
        assert_eq!(part.body, "a\r\nb");
        assert_eq!(part.transfer_encoding, TransferEncoding::SevenBit);
    }

    #[test]
    fn test_text_part_quoted_printable() {
        let part = Part::text("café", ContentType::text_plain());
        assert_eq!(part.transfer_encoding, TransferEncoding::QuotedPrintable);
        assert_eq!(part.body, "caf=C3=A9");
    }
}
