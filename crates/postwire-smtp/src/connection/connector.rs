//! Opening and upgrading connections.

use std::fmt;
use std::future::Future;

use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::config::Security;
use super::stream::{SmtpStream, create_tls_connector};
use crate::{Error, Result};

/// Opens connections for a session and upgrades them to TLS.
///
/// [`TcpConnector`] is the production implementation. Tests plug in
/// in-memory streams.
pub trait Connector: Send + Sync {
    /// Stream type produced by this connector.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens a connection. With [`Security::Implicit`] the returned stream
    /// is already encrypted.
    fn connect(
        &self,
        host: &str,
        port: u16,
        security: Security,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Performs the TLS handshake on an open plaintext stream (STARTTLS).
    fn upgrade(
        &self,
        stream: Self::Stream,
        host: &str,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Returns false if this connector has no TLS mechanism at all.
    fn supports_tls(&self) -> bool;
}

/// TCP connector with rustls for implicit TLS and STARTTLS.
#[derive(Clone)]
pub struct TcpConnector {
    tls: Option<TlsConnector>,
}

impl TcpConnector {
    /// Creates a connector trusting the webpki root certificates.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS configuration cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_root_certificates(std::iter::empty())
    }

    /// Creates a connector that also trusts `roots` (private relays,
    /// self-signed test servers).
    ///
    /// # Errors
    ///
    /// Returns an error if a certificate cannot be added to the trust store.
    pub fn with_root_certificates(
        roots: impl IntoIterator<Item = CertificateDer<'static>>,
    ) -> Result<Self> {
        Ok(Self {
            tls: Some(create_tls_connector(roots)?),
        })
    }

    /// Creates a connector without any TLS mechanism.
    ///
    /// Sessions using it fail with `TlsUnavailable` unless the configuration
    /// allows insecure fallback.
    #[must_use]
    pub const fn plaintext_only() -> Self {
        Self { tls: None }
    }

    async fn handshake(&self, tcp: TcpStream, host: &str) -> Result<TlsStream<TcpStream>> {
        let connector = self
            .tls
            .as_ref()
            .ok_or_else(|| Error::InvalidState("connector has no TLS support".into()))?;
        let server_name = ServerName::try_from(host.to_string())?;
        Ok(connector.connect(server_name, tcp).await?)
    }
}

impl fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnector")
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl Connector for TcpConnector {
    type Stream = SmtpStream;

    async fn connect(&self, host: &str, port: u16, security: Security) -> Result<SmtpStream> {
        let tcp = TcpStream::connect((host, port)).await?;
        match security {
            Security::Implicit => Ok(SmtpStream::Tls(Box::new(self.handshake(tcp, host).await?))),
            Security::None | Security::StartTls => Ok(SmtpStream::Plain(tcp)),
        }
    }

    async fn upgrade(&self, stream: SmtpStream, host: &str) -> Result<SmtpStream> {
        match stream {
            SmtpStream::Plain(tcp) => {
                let tls = self.handshake(tcp, host).await?;
                Ok(SmtpStream::Tls(Box::new(tls)))
            }
            SmtpStream::Tls(_) => Err(Error::InvalidState("Stream is already TLS".to_string())),
        }
    }

    fn supports_tls(&self) -> bool {
        self.tls.is_some()
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
    fn test_tls_support_flags() {
        assert!(TcpConnector::new().unwrap().supports_tls());
        assert!(!TcpConnector::plaintext_only().supports_tls());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpConnector::plaintext_only()
            .connect("127.0.0.1", port, Security::None)
            .await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_plaintext_connector_cannot_upgrade() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connector = TcpConnector::plaintext_only();

        let stream = connector
            .connect("127.0.0.1", port, Security::StartTls)
            .await
            .unwrap();
        assert!(!stream.is_tls());
        let result = connector.upgrade(stream, "localhost").await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }
}
