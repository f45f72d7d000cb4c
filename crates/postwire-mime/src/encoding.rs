//! MIME encoding utilities.
//!
//! Supports Base64, line-aware Quoted-Printable, RFC 2047 header words,
//! CRLF normalization and SMTP dot-stuffing (RFC 5321 section 4.5.2).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum line length for Quoted-Printable encoding.
const MAX_LINE_LENGTH: usize = 76;

/// Maximum raw bytes carried by one RFC 2047 encoded word.
///
/// 45 bytes become 60 Base64 characters, which keeps the whole
/// `=?utf-8?B?...?=` word under the 75 character limit.
const MAX_WORD_BYTES: usize = 45;

/// Maximum length of a line in a 7bit body, excluding CRLF (RFC 5322).
pub const MAX_7BIT_LINE_LENGTH: usize = 998;

/// Preferred header line width (RFC 5322 section 2.1.1).
const FOLD_WIDTH: usize = 78;

/// Longest space-free run a header value may carry unencoded.
///
/// Leaves room for the field name and the `<addr>` of a mailbox on the
/// same line.
const MAX_UNFOLDABLE_RUN: usize = MAX_7BIT_LINE_LENGTH - 300;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Converts every line ending (`\n`, `\r` or `\r\n`) to CRLF.
#[must_use]
pub fn normalize_line_endings(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + text.len() / 32);
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                result.push_str("\r\n");
            }
            '\n' => result.push_str("\r\n"),
            _ => result.push(ch),
        }
    }

    result
}

/// Returns true if CRLF-normalized text can travel as `7bit` unchanged.
#[must_use]
pub fn is_7bit_safe(text: &str) -> bool {
    text.is_ascii()
        && !text.contains('\0')
        && text
            .split("\r\n")
            .all(|line| line.len() <= MAX_7BIT_LINE_LENGTH && !line.contains(['\r', '\n']))
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// Hard line breaks are preserved as CRLF; long lines get soft breaks so no
/// encoded line exceeds 76 characters. Trailing whitespace is always encoded.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let normalized = normalize_line_endings(text);
    let mut result = String::with_capacity(normalized.len() + normalized.len() / 8);

    for (index, line) in normalized.split("\r\n").enumerate() {
        if index > 0 {
            result.push_str("\r\n");
        }
        encode_qp_line(line.as_bytes(), &mut result);
    }

    result
}

fn encode_qp_line(line: &[u8], out: &mut String) {
    let mut line_length = 0;

    for (i, &byte) in line.iter().enumerate() {
        let is_last = i + 1 == line.len();
        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            b' ' | b'\t' => !is_last,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // One column is reserved for the soft break marker.
        if line_length + width > MAX_LINE_LENGTH - 1 {
            out.push_str("=\r\n");
            line_length = 0;
        }

        if literal {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "={byte:02X}");
        }
        line_length += width;
    }
}

/// Returns true if a header value must be wrapped in encoded words.
///
/// That is the case for non-ASCII or control characters, for text that
/// looks like an encoded word, and for runs too long to fold.
#[must_use]
pub fn needs_rfc2047(text: &str) -> bool {
    text.chars().any(|c| !c.is_ascii() || c.is_ascii_control())
        || text.contains("=?")
        || text.split(' ').any(|run| run.len() > MAX_UNFOLDABLE_RUN)
}

/// Folds a header value at spaces so lines stay within 78 columns where
/// possible.
///
/// `offset` is the width already used on the first line (`Name: `).
/// Existing folds (`CRLF SP`) are kept. Unfolding the result gives back
/// `value`.
#[must_use]
pub fn fold_header(offset: usize, value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    let mut column = offset;

    for (i, segment) in value.split("\r\n ").enumerate() {
        if i > 0 {
            out.push_str("\r\n ");
            column = 1;
        }
        for (j, word) in segment.split(' ').enumerate() {
            if j > 0 {
                if !word.is_empty() && column + 1 + word.len() > FOLD_WIDTH {
                    out.push_str("\r\n ");
                    column = 1;
                } else {
                    out.push(' ');
                    column += 1;
                }
            }
            out.push_str(word);
            column += word.len();
        }
    }

    out
}

/// Encodes a header value using RFC 2047 encoded words (UTF-8, `B` encoding).
///
/// Plain ASCII values are returned unchanged. Long values are split on
/// character boundaries into several words joined by folding whitespace.
#[must_use]
pub fn encode_rfc2047(text: &str) -> String {
    if !needs_rfc2047(text) {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk_start = 0;
    let mut chunk_len = 0;

    for (idx, ch) in text.char_indices() {
        let len = ch.len_utf8();
        if chunk_len + len > MAX_WORD_BYTES {
            words.push(encoded_word(&text[chunk_start..idx]));
            chunk_start = idx;
            chunk_len = 0;
        }
        chunk_len += len;
    }
    words.push(encoded_word(&text[chunk_start..]));

    words.join("\r\n ")
}

fn encoded_word(chunk: &str) -> String {
    format!("=?utf-8?B?{}?=", encode_base64(chunk.as_bytes()))
}

/// Applies SMTP dot-stuffing: every line that starts with `.` gets a second
/// leading `.`, so no body line can be mistaken for the end-of-data marker.
///
/// The input is expected to use CRLF line endings.
#[must_use]
pub fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len() + 16);
    let mut at_line_start = true;

    for &byte in data {
        if at_line_start && byte == b'.' {
            result.push(b'.');
        }
        result.push(byte);
        at_line_start = byte == b'\n';
    }

    result
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
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode() {
        assert_eq!(encode_base64(b"Hello, World!"), "SGVsbG8sIFdvcmxkIQ==");
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings("a\nb\r\nc\rd"), "a\r\nb\r\nc\r\nd");
        assert_eq!(normalize_line_endings("no breaks"), "no breaks");
        assert_eq!(normalize_line_endings("\n\n"), "\r\n\r\n");
    }

    #[test]
    fn test_is_7bit_safe() {
        assert!(is_7bit_safe("Hello\r\nWorld"));
        assert!(!is_7bit_safe("Héllo"));
        assert!(!is_7bit_safe(&"a".repeat(MAX_7BIT_LINE_LENGTH + 1)));
        assert!(!is_7bit_safe("bare\nnewline"));
    }

    #[test]
    fn test_quoted_printable_ascii_passthrough() {
        assert_eq!(encode_quoted_printable("Hello, World!"), "Hello, World!");
    }

    #[test]
    fn test_quoted_printable_non_ascii() {
        let encoded = encode_quoted_printable("Héllo, Wørld!");
        assert_eq!(encoded, "H=C3=A9llo, W=C3=B8rld!");
    }

    #[test]
    fn test_quoted_printable_equals_sign() {
        assert_eq!(encode_quoted_printable("a=b"), "a=3Db");
    }

    #[test]
    fn test_quoted_printable_keeps_hard_breaks() {
        assert_eq!(encode_quoted_printable("one\ntwo"), "one\r\ntwo");
    }

    #[test]
    fn test_quoted_printable_trailing_whitespace() {
        assert_eq!(encode_quoted_printable("end \nnext\t"), "end=20\r\nnext=09");
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let encoded = encode_quoted_printable(&"x".repeat(200));
        for line in encoded.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH, "line too long: {line}");
        }
        assert_eq!(encoded.replace("=\r\n", ""), "x".repeat(200));
    }

    #[test]
    fn test_rfc2047_ascii_unchanged() {
        assert_eq!(encode_rfc2047("Your OTP code"), "Your OTP code");
        assert_eq!(encode_rfc2047("Question? a=b"), "Question? a=b");
    }

    #[test]
    fn test_rfc2047_non_ascii() {
        assert_eq!(encode_rfc2047("Héllo"), "=?utf-8?B?SMOpbGxv?=");
    }

    #[test]
    fn test_rfc2047_long_value_is_split() {
        let subject = "é".repeat(60);
        let encoded = encode_rfc2047(&subject);
        let words: Vec<&str> = encoded.split("\r\n ").collect();
        assert!(words.len() > 1);
        for word in words {
            assert!(word.len() <= 75, "encoded word too long: {word}");
            assert!(word.starts_with("=?utf-8?B?"));
        }
    }

    #[test]
    fn test_rfc2047_unbreakable_ascii_run_is_encoded() {
        let subject = "x".repeat(1200);
        let encoded = encode_rfc2047(&subject);
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.split("\r\n ").all(|word| word.len() <= 75));
    }

    #[test]
    fn test_fold_header_short_value_unchanged() {
        assert_eq!(fold_header(9, "Your OTP code"), "Your OTP code");
    }

    #[test]
    fn test_fold_header_wraps_at_spaces() {
        let value = "word ".repeat(60).trim_end().to_string();
        let folded = fold_header("Subject: ".len(), &value);

        let mut lines = folded.split("\r\n");
        let first = lines.next().unwrap();
        assert!("Subject: ".len() + first.len() <= FOLD_WIDTH);
        for line in lines {
            assert!(line.starts_with(' '));
            assert!(line.len() <= FOLD_WIDTH, "line too long: {line:?}");
        }
        assert_eq!(folded.replace("\r\n", ""), value);
    }

    #[test]
    fn test_fold_header_keeps_existing_folds() {
        let value = "=?utf-8?B?w6k=?=\r\n =?utf-8?B?w6k=?=";
        assert_eq!(fold_header(9, value), value);
    }

    #[test]
    fn test_fold_header_long_word_gets_own_line() {
        let long = "y".repeat(100);
        let folded = fold_header(4, &format!("a {long} b"));
        assert_eq!(folded, format!("a\r\n {long}\r\n b"));
    }

    #[test]
    fn test_dot_stuff_lone_dot() {
        assert_eq!(dot_stuff(b"a\r\n.\r\nb\r\n"), b"a\r\n..\r\nb\r\n");
    }

    #[test]
    fn test_dot_stuff_first_line() {
        assert_eq!(dot_stuff(b".hidden\r\n"), b"..hidden\r\n");
    }

    #[test]
    fn test_dot_stuff_inner_dots_untouched() {
        assert_eq!(dot_stuff(b"a.b\r\nc. d\r\n"), b"a.b\r\nc. d\r\n");
    }

    proptest! {
        #[test]
        fn prop_fold_header_round_trips(value in "[a-zA-Z,<>@. ]{0,400}") {
            let folded = fold_header(9, &value);
            prop_assert_eq!(folded.replace("\r\n", ""), value);
        }

        #[test]
        fn dot_stuffed_lines_never_terminate_data(
            lines in proptest::collection::vec("[.a-z ]{0,6}", 0..20)
        ) {
            let body = lines.iter().map(|l| format!("{l}\r\n")).collect::<String>();
            let stuffed = dot_stuff(body.as_bytes());
            let stuffed = String::from_utf8(stuffed).unwrap();

            let out_lines: Vec<&str> = stuffed.split("\r\n").collect();
            for (original, sent) in lines.iter().zip(out_lines.iter()) {
                prop_assert_ne!(*sent, ".");
                if original.starts_with('.') {
                    prop_assert_eq!(*sent, format!(".{original}"));
                } else {
                    prop_assert_eq!(*sent, original.as_str());
                }
            }
        }
    }
}
