//! SMTP response parser.
//!
//! Every reply line is tokenized before any field is used: three ASCII
//! digits (first digit 1-5), then `-` (more lines follow), a space, or the
//! end of the line. Anything else is a protocol error rather than a guess.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// One tokenized reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// Reply code.
    pub code: ReplyCode,
    /// True for the final line of a reply (space separator or bare code).
    pub is_last: bool,
    /// Text after the separator.
    pub text: String,
}

/// Tokenizes a single reply line (CRLF already stripped).
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the line is malformed.
pub fn parse_reply_line(line: &str) -> Result<ReplyLine> {
    let bytes = line.as_bytes();
    let malformed = || Error::Protocol(format!("Malformed reply line: {line:?}"));

    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    if !(b'1'..=b'5').contains(&bytes[0]) {
        return Err(malformed());
    }

    let code = u16::from(bytes[0] - b'0') * 100
        + u16::from(bytes[1] - b'0') * 10
        + u16::from(bytes[2] - b'0');

    let (is_last, text) = match bytes.get(3) {
        None => (true, ""),
        Some(b' ') => (true, &line[4..]),
        Some(b'-') => (false, &line[4..]),
        Some(_) => return Err(malformed()),
    };

    Ok(ReplyLine {
        code: ReplyCode::new(code),
        is_last,
        text: text.to_string(),
    })
}

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// # Errors
///
/// Returns an error if the reply is empty, a line is malformed, the codes
/// differ between lines, or the final-line marker is misplaced.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some((last, init)) = lines.split_last() else {
        return Err(Error::Protocol("Empty reply".into()));
    };

    let first = parse_reply_line(&lines[0])?;
    let mut texts = Vec::with_capacity(lines.len());

    for line in init {
        let parsed = parse_reply_line(line)?;
        check_code(&first, &parsed)?;
        if parsed.is_last {
            return Err(Error::Protocol(format!(
                "Final reply line followed by more lines: {line:?}"
            )));
        }
        texts.push(parsed.text);
    }

    let parsed = parse_reply_line(last)?;
    check_code(&first, &parsed)?;
    if !parsed.is_last {
        return Err(Error::Protocol("Reply ends with a continuation line".into()));
    }
    texts.push(parsed.text);

    Ok(Reply::new(first.code, texts))
}

fn check_code(first: &ReplyLine, line: &ReplyLine) -> Result<()> {
    if line.code == first.code {
        Ok(())
    } else {
        Err(Error::Protocol(format!(
            "Reply code changed mid-reply: {} then {}",
            first.code, line.code
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_single_line_reply() {
        let reply = parse_reply(&lines(&["250 OK"])).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.lines, vec!["OK"]);
        assert!(reply.is_success());
    }

    #[test]
    fn test_parse_multi_line_reply() {
        let reply = parse_reply(&lines(&[
            "250-smtp.example.com",
            "250-STARTTLS",
            "250 AUTH LOGIN PLAIN",
        ]))
        .unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(
            reply.lines,
            vec!["smtp.example.com", "STARTTLS", "AUTH LOGIN PLAIN"]
        );
    }

    #[test]
    fn test_parse_bare_code() {
        let reply = parse_reply(&lines(&["354"])).unwrap();
        assert_eq!(reply.code, ReplyCode::START_DATA);
        assert_eq!(reply.lines, vec![""]);

        let line = parse_reply_line("250 ").unwrap();
        assert!(line.is_last);
        assert_eq!(line.text, "");
    }

    #[test]
    fn test_parse_reply_line_markers() {
        assert!(parse_reply_line("250 OK").unwrap().is_last);
        assert!(!parse_reply_line("250-Continuing").unwrap().is_last);
        assert!(parse_reply_line("250").unwrap().is_last);
    }

    #[test]
    fn test_malformed_lines_rejected() {
        for line in ["", "25", "ABC OK", "2x0 OK", "250XOK", "650 OK", "050 OK", "2500 OK"] {
            assert!(
                matches!(parse_reply_line(line), Err(Error::Protocol(_))),
                "accepted {line:?}"
            );
        }
    }

    #[test]
    fn test_non_ascii_text_is_safe() {
        let line = parse_reply_line("250 héllo").unwrap();
        assert_eq!(line.text, "héllo");
        assert!(parse_reply_line("25é OK").is_err());
    }

    #[test]
    fn test_parse_error_empty() {
        assert!(parse_reply(&[]).is_err());
    }

    #[test]
    fn test_mixed_codes_rejected() {
        assert!(parse_reply(&lines(&["250-first", "251 second"])).is_err());
    }

    #[test]
    fn test_misplaced_markers_rejected() {
        assert!(parse_reply(&lines(&["250 first", "250 second"])).is_err());
        assert!(parse_reply(&lines(&["250-first", "250-second"])).is_err());
    }
}
