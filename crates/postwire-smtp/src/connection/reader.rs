//! Assembles reply lines into logical replies.

use tokio::io::{AsyncRead, AsyncWrite};

use super::transport::Transport;
use crate::parser::{parse_reply, parse_reply_line};
use crate::types::Reply;
use crate::{Error, Result};

/// Upper bound on lines in one reply.
pub const MAX_REPLY_LINES: usize = 256;

/// Reads one complete, possibly multi-line, reply.
///
/// # Errors
///
/// Returns an error if the transport fails or a line is malformed.
pub async fn read_reply<S>(transport: &mut Transport<S>) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = Vec::new();

    loop {
        let line = transport.read_line().await?;
        let is_last = parse_reply_line(&line)?.is_last;
        lines.push(line);

        if is_last {
            break;
        }
        if lines.len() >= MAX_REPLY_LINES {
            return Err(Error::Protocol(format!(
                "reply exceeds {MAX_REPLY_LINES} lines"
            )));
        }
    }

    parse_reply(&lines)
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
    use crate::types::ReplyCode;
    use proptest::prelude::*;
    use std::time::Duration;
    use tokio_test::io::Builder;

    const SECS: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_single_line() {
        let mock = Builder::new().read(b"220 smtp.example.com ESMTP\r\n").build();
        let mut transport = Transport::new(mock, false, SECS, SECS);
        let reply = read_reply(&mut transport).await.unwrap();
        assert_eq!(reply.code, ReplyCode::SERVICE_READY);
        assert_eq!(reply.lines, vec!["smtp.example.com ESMTP"]);
    }

    #[tokio::test]
    async fn test_multi_line_stops_at_terminal() {
        let mock = Builder::new()
            .read(b"250-smtp.example.com\r\n250-STARTTLS\r\n")
            .read(b"250 AUTH LOGIN\r\n354 go\r\n")
            .build();
        let mut transport = Transport::new(mock, false, SECS, SECS);

        let ehlo = read_reply(&mut transport).await.unwrap();
        assert_eq!(ehlo.lines.len(), 3);
        let next = read_reply(&mut transport).await.unwrap();
        assert_eq!(next.code, ReplyCode::START_DATA);
    }

    #[tokio::test]
    async fn test_malformed_line_rejected() {
        let mock = Builder::new().read(b"hello there\r\n").build();
        let mut transport = Transport::new(mock, false, SECS, SECS);
        assert!(matches!(
            read_reply(&mut transport).await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_code_change_rejected() {
        let mock = Builder::new().read(b"250-first\r\n220 second\r\n").build();
        let mut transport = Transport::new(mock, false, SECS, SECS);
        assert!(read_reply(&mut transport).await.is_err());
    }

    #[tokio::test]
    async fn test_eof_mid_reply() {
        let mock = Builder::new().read(b"250-first\r\n").build();
        let mut transport = Transport::new(mock, false, SECS, SECS);
        assert!(matches!(read_reply(&mut transport).await, Err(Error::Io(_))));
    }

    proptest! {
        #[test]
        fn continuation_lines_form_one_reply(
            texts in proptest::collection::vec("[a-zA-Z0-9 .-]{0,30}", 0..20),
            last in "[a-zA-Z0-9 .-]{0,30}",
        ) {
            let mut wire = String::new();
            for text in &texts {
                wire.push_str(&format!("250-{text}\r\n"));
            }
            wire.push_str(&format!("250 {last}\r\n221 bye\r\n"));

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (reply, next) = runtime.block_on(async {
                let mock = Builder::new().read(wire.as_bytes()).build();
                let mut transport = Transport::new(mock, false, SECS, SECS);
                let reply = read_reply(&mut transport).await.unwrap();
                let next = read_reply(&mut transport).await.unwrap();
                (reply, next)
            });

            prop_assert_eq!(reply.lines.len(), texts.len() + 1);
            prop_assert_eq!(reply.code, ReplyCode::OK);
            prop_assert_eq!(reply.lines.last().unwrap(), &last);
            prop_assert_eq!(next.code, ReplyCode::CLOSING);
        }
    }
}
