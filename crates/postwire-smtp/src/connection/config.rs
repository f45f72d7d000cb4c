//! Connection configuration types.

use crate::error::{Error, Result};
use std::fmt;
use std::time::Duration;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 25). **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 587).
    #[default]
    StartTls,
    /// TLS from the start (port 465).
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Implicit => 465,
        }
    }
}

/// AUTH LOGIN credentials.
///
/// Held only for the lifetime of the configuration; `Debug` never prints
/// the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SMTP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Credentials for AUTH LOGIN; `None` skips authentication.
    pub credentials: Option<Credentials>,
    /// Name announced in EHLO.
    pub client_hostname: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Deadline for each reply line.
    pub read_timeout: Duration,
    /// Deadline for each write.
    pub write_timeout: Duration,
    /// Continue in plaintext when STARTTLS cannot be used.
    pub allow_insecure_fallback: bool,
}

impl Config {
    /// Creates a new configuration with STARTTLS on port 587.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Checks the configuration for values that can never work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() || self.host.contains(char::is_whitespace) {
            return Err(Error::InvalidConfig(format!("invalid host {:?}", self.host)));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must be non-zero".into()));
        }
        if self.client_hostname.is_empty()
            || self
                .client_hostname
                .contains(|c: char| c.is_whitespace() || c.is_control())
        {
            return Err(Error::InvalidConfig(format!(
                "invalid EHLO hostname {:?}",
                self.client_hostname
            )));
        }
        if self
            .credentials
            .as_ref()
            .is_some_and(|credentials| credentials.username.is_empty())
        {
            return Err(Error::InvalidConfig("username must not be empty".into()));
        }
        for (name, timeout) in [
            ("connect", self.connect_timeout),
            ("read", self.read_timeout),
            ("write", self.write_timeout),
        ] {
            if timeout.is_zero() {
                return Err(Error::InvalidConfig(format!("{name} timeout must be non-zero")));
            }
        }
        Ok(())
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    credentials: Option<Credentials>,
    client_hostname: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    allow_insecure_fallback: bool,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::StartTls,
            credentials: None,
            client_hostname: "localhost".to_string(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            allow_insecure_fallback: false,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the AUTH LOGIN credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Sets the name announced in EHLO.
    #[must_use]
    pub fn client_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.client_hostname = hostname.into();
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets connect, read and write timeouts at once.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self.read_timeout = timeout;
        self.write_timeout = timeout;
        self
    }

    /// Allows the session to continue unencrypted when STARTTLS is
    /// unavailable instead of failing with `TlsUnavailable`.
    #[must_use]
    pub const fn allow_insecure_fallback(mut self, allow: bool) -> Self {
        self.allow_insecure_fallback = allow;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            credentials: self.credentials,
            client_hostname: self.client_hostname,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            allow_insecure_fallback: self.allow_insecure_fallback,
        }
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
    fn test_default_ports() {
        assert_eq!(Security::None.default_port(), 25);
        assert_eq!(Security::StartTls.default_port(), 587);
        assert_eq!(Security::Implicit.default_port(), 465);
    }

    #[test]
    fn test_config_new() {
        let config = Config::new("smtp.example.com");
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.security, Security::StartTls);
        assert!(config.credentials.is_none());
        assert!(!config.allow_insecure_fallback);
        assert_eq!(config.client_hostname, "localhost");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("smtp.example.com")
            .port(2525)
            .security(Security::Implicit)
            .credentials("user", "secret")
            .client_hostname("app.example.com")
            .connect_timeout(Duration::from_secs(10))
            .allow_insecure_fallback(true)
            .build();

        assert_eq!(config.port, 2525);
        assert_eq!(config.security, Security::Implicit);
        assert_eq!(config.credentials, Some(Credentials::new("user", "secret")));
        assert_eq!(config.client_hostname, "app.example.com");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.allow_insecure_fallback);
    }

    #[test]
    fn test_config_builder_default_port() {
        let config = Config::builder("smtp.example.com")
            .security(Security::Implicit)
            .build();
        assert_eq!(config.port, 465);
    }

    #[test]
    fn test_timeout_sets_all() {
        let config = Config::builder("smtp.example.com")
            .timeout(Duration::from_secs(5))
            .build();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::new("").validate().is_err());
        assert!(Config::new("smtp example.com").validate().is_err());
        assert!(Config::builder("h").port(0).build().validate().is_err());
        assert!(
            Config::builder("h")
                .client_hostname("bad\r\nMAIL FROM:<x@y>")
                .build()
                .validate()
                .is_err()
        );
        assert!(
            Config::builder("h")
                .read_timeout(Duration::ZERO)
                .build()
                .validate()
                .is_err()
        );
        assert!(
            Config::builder("h")
                .credentials("", "pw")
                .build()
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let debug = format!("{:?}", Credentials::new("user", "hunter2"));
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }
}
