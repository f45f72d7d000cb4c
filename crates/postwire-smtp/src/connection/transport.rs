//! Line-oriented transport with deadlines and in-place TLS upgrade.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::time::timeout;

use crate::command::Command;
use crate::{Error, Result};

/// Default buffer size for reading and writing.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum reply line length. RFC 5321 allows 512; servers exceed it in
/// EHLO banners, so allow some slack before treating it as hostile.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Byte stream owned by one session.
///
/// Every read and write runs under its deadline. The stream is closed by
/// [`Transport::close`] or, failing that, when the transport is dropped.
#[derive(Debug)]
pub struct Transport<S> {
    reader: Option<BufReader<S>>,
    write_buffer: BytesMut,
    encrypted: bool,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an open stream.
    pub fn new(
        stream: S,
        encrypted: bool,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            reader: Some(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream)),
            write_buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            encrypted,
            read_timeout,
            write_timeout,
        }
    }

    /// Returns true once the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Returns true after [`Transport::close`].
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Number of received bytes not yet consumed.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.reader.as_ref().map_or(0, |reader| reader.buffer().len())
    }

    /// Reads one line and strips the line terminator.
    ///
    /// # Errors
    ///
    /// Returns an error on EOF, on timeout, or if the line exceeds
    /// [`MAX_LINE_LENGTH`].
    pub async fn read_line(&mut self) -> Result<String> {
        let deadline = self.read_timeout;
        let reader = self.reader_mut()?;
        timeout(deadline, read_bounded_line(reader))
            .await
            .map_err(|_| Error::Timeout("read"))?
    }

    /// Serializes `command` into the write buffer and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or timeout.
    pub async fn send_command(&mut self, command: &Command) -> Result<()> {
        self.write_buffer.clear();
        command.encode(&mut self.write_buffer);

        let reader = self.reader.as_mut().ok_or_else(closed)?;
        write_flushed(reader.get_mut(), &self.write_buffer, self.write_timeout).await
    }

    /// Writes raw bytes (the message payload) and flushes them.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or timeout.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let deadline = self.write_timeout;
        let reader = self.reader_mut()?;
        write_flushed(reader.get_mut(), data, deadline).await
    }

    /// Replaces the stream with the result of `handshake`.
    ///
    /// The caller must make sure nothing is buffered (see
    /// [`Transport::buffered_len`]); buffered plaintext would otherwise be
    /// read as if it had arrived over TLS. If the handshake fails the
    /// transport is left closed.
    ///
    /// # Errors
    ///
    /// Returns the handshake error, or [`Error::Timeout`] after the read
    /// deadline.
    pub async fn upgrade<F, Fut>(&mut self, handshake: F) -> Result<()>
    where
        F: FnOnce(S) -> Fut,
        Fut: Future<Output = Result<S>>,
    {
        let reader = self.reader.take().ok_or_else(closed)?;
        if !reader.buffer().is_empty() {
            return Err(Error::Protocol(
                "server sent data before the TLS handshake".into(),
            ));
        }

        let stream = timeout(self.read_timeout, handshake(reader.into_inner()))
            .await
            .map_err(|_| Error::Timeout("TLS handshake"))??;

        self.reader = Some(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream));
        self.encrypted = true;
        Ok(())
    }

    /// Shuts the stream down. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            let _ = timeout(self.write_timeout, reader.get_mut().shutdown()).await;
        }
    }

    fn reader_mut(&mut self) -> Result<&mut BufReader<S>> {
        self.reader.as_mut().ok_or_else(closed)
    }
}

fn closed() -> Error {
    Error::InvalidState("transport is closed".into())
}

async fn write_flushed<W>(stream: &mut W, data: &[u8], deadline: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    timeout(deadline, async {
        stream.write_all(data).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| Error::Timeout("write"))??;
    Ok(())
}

async fn read_bounded_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }

        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&buf[..pos]);
            reader.consume(pos + 1);
            break;
        }

        let len = buf.len();
        line.extend_from_slice(buf);
        reader.consume(len);

        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::Protocol("line too long".to_string()));
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.len() > MAX_LINE_LENGTH {
        return Err(Error::Protocol("line too long".to_string()));
    }

    Ok(String::from_utf8_lossy(&line).into_owned())
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
    use tokio_test::io::Builder;

    const SECS: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_read_lines() {
        let mock = Builder::new().read(b"220 ready\r\n250 ok\n").build();
        let mut transport = Transport::new(mock, false, SECS, SECS);

        assert_eq!(transport.read_line().await.unwrap(), "220 ready");
        assert_eq!(transport.read_line().await.unwrap(), "250 ok");
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let mock = Builder::new().read(b"250 hel").read(b"lo\r\n").build();
        let mut transport = Transport::new(mock, false, SECS, SECS);
        assert_eq!(transport.read_line().await.unwrap(), "250 hello");
    }

    #[tokio::test]
    async fn test_eof_is_error() {
        let mock = Builder::new().read(b"250 partial").build();
        let mut transport = Transport::new(mock, false, SECS, SECS);
        let err = transport.read_line().await.unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_overlong_line_rejected() {
        let long = vec![b'a'; MAX_LINE_LENGTH + 100];
        let mock = Builder::new().read(&long).build();
        let mut transport = Transport::new(mock, false, SECS, SECS);
        assert!(matches!(
            transport.read_line().await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_write_all() {
        let mock = Builder::new().write(b"EHLO localhost\r\n").build();
        let mut transport = Transport::new(mock, false, SECS, SECS);
        transport.write_all(b"EHLO localhost\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_command_reuses_buffer() {
        let mock = Builder::new()
            .write(b"EHLO client.example.com\r\n")
            .write(b"DATA\r\n")
            .build();
        let mut transport = Transport::new(mock, false, SECS, SECS);
        transport
            .send_command(&Command::Ehlo {
                hostname: "client.example.com".into(),
            })
            .await
            .unwrap();
        transport.send_command(&Command::Data).await.unwrap();
        assert_eq!(&transport.write_buffer[..], b"DATA\r\n");
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = Transport::new(client, false, Duration::from_millis(20), SECS);
        assert!(matches!(
            transport.read_line().await,
            Err(Error::Timeout("read"))
        ));
    }

    #[tokio::test]
    async fn test_upgrade_swaps_stream() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = Transport::new(client, false, SECS, SECS);
        transport.upgrade(|stream| async move { Ok(stream) }).await.unwrap();
        assert!(transport.is_encrypted());
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn test_upgrade_refuses_buffered_bytes() {
        let mock = Builder::new().read(b"220 go ahead\r\n250 injected\r\n").build();
        let mut transport = Transport::new(mock, false, SECS, SECS);
        transport.read_line().await.unwrap();
        assert!(transport.buffered_len() > 0);

        let result = transport.upgrade(|stream| async move { Ok(stream) }).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
        assert!(!transport.is_encrypted());
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_failed_upgrade_leaves_transport_closed() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = Transport::new(client, false, SECS, SECS);
        let result = transport
            .upgrade(|_stream| async move { Err(Error::Protocol("handshake".into())) })
            .await;
        assert!(result.is_err());
        assert!(transport.is_closed());
        assert!(matches!(
            transport.write_all(b"QUIT\r\n").await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _server) = tokio::io::duplex(64);
        let mut transport = Transport::new(client, false, SECS, SECS);
        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());
    }
}
