//! SMTP connection: configuration, streams, transport and reply reading.

mod config;
mod connector;
mod reader;
mod stream;
mod transport;

pub use config::{Config, ConfigBuilder, Credentials, Security};
pub use connector::{Connector, TcpConnector};
pub use reader::{MAX_REPLY_LINES, read_reply};
pub use stream::{SmtpStream, create_tls_connector};
pub use transport::{MAX_LINE_LENGTH, Transport};

use crate::types::{AuthMechanism, Extension, Reply};

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server hostname from the EHLO reply.
    pub hostname: String,
    /// Advertised extensions, in reply order.
    pub extensions: Vec<Extension>,
}

impl ServerInfo {
    /// Builds server information from a successful EHLO reply.
    ///
    /// The first line carries the server's name; each further line is one
    /// extension.
    #[must_use]
    pub fn from_ehlo(reply: &Reply) -> Self {
        let hostname = reply
            .lines
            .first()
            .and_then(|line| line.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        let extensions = reply
            .lines
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        Self {
            hostname,
            extensions,
        }
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns true if any AUTH line was advertised.
    #[must_use]
    pub fn advertises_auth(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Auth(_)))
    }

    /// Returns supported authentication mechanisms across all AUTH lines.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        let mut mechanisms = Vec::new();
        for ext in &self.extensions {
            if let Extension::Auth(advertised) = ext {
                for mechanism in advertised {
                    if !mechanisms.contains(mechanism) {
                        mechanisms.push(*mechanism);
                    }
                }
            }
        }
        mechanisms
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
    use crate::types::ReplyCode;

    fn ehlo(lines: &[&str]) -> Reply {
        Reply::new(
            ReplyCode::OK,
            lines.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn test_from_ehlo() {
        let info = ServerInfo::from_ehlo(&ehlo(&[
            "smtp.example.com Hello client",
            "SIZE 35882577",
            "STARTTLS",
            "AUTH LOGIN PLAIN",
            "AUTH=LOGIN",
        ]));
        assert_eq!(info.hostname, "smtp.example.com");
        assert!(info.supports_starttls());
        assert!(info.advertises_auth());
        assert_eq!(
            info.auth_mechanisms(),
            vec![AuthMechanism::Login, AuthMechanism::Plain]
        );
    }

    #[test]
    fn test_minimal_ehlo() {
        let info = ServerInfo::from_ehlo(&ehlo(&["mx.example.com"]));
        assert!(!info.supports_starttls());
        assert!(!info.advertises_auth());
        assert!(info.auth_mechanisms().is_empty());
    }
}
