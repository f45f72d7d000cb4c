//! Mailer settings.
//!
//! Settings come from environment variables (the same names the deployment
//! has always used) or from a JSON document, and are turned into a
//! validated [`postwire_smtp::Config`] once, at startup.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use postwire_mime::Mailbox;
use postwire_smtp::{Config, Security};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Host used when `SMTP_HOST` is unset.
pub const DEFAULT_HOST: &str = "smtp.gmail.com";

/// Per-operation timeout used when `SMTP_TIMEOUT_SECS` is unset.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Security mode as written in configuration.
///
/// `tls` means STARTTLS on the submission port and `ssl` means TLS from the
/// first byte, following the usual mail-settings vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecureMode {
    /// Plaintext only.
    None,
    /// STARTTLS upgrade (port 587).
    #[default]
    Tls,
    /// Implicit TLS (port 465).
    Ssl,
}

impl FromStr for SecureMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "plain" => Ok(Self::None),
            "tls" | "starttls" => Ok(Self::Tls),
            "ssl" | "implicit" => Ok(Self::Ssl),
            other => Err(Error::Config(format!(
                "SMTP_SECURE must be tls, ssl or none (got {other:?})"
            ))),
        }
    }
}

impl From<SecureMode> for Security {
    fn from(mode: SecureMode) -> Self {
        match mode {
            SecureMode::None => Self::None,
            SecureMode::Tls => Self::StartTls,
            SecureMode::Ssl => Self::Implicit,
        }
    }
}

/// Everything the mailer needs to know.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerSettings {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port; derived from `secure` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// AUTH LOGIN user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// AUTH LOGIN password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Transport security.
    pub secure: SecureMode,
    /// Keep going in plaintext when STARTTLS is unavailable.
    pub allow_insecure_fallback: bool,
    /// Connect, read and write timeout in seconds.
    pub timeout_secs: u64,
    /// Name announced in EHLO.
    pub helo_name: String,
    /// Sender address; falls back to `username`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_email: Option<String>,
    /// Sender display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    /// Default `Reply-To` address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Default for MailerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: None,
            username: None,
            password: None,
            secure: SecureMode::default(),
            allow_insecure_fallback: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            helo_name: "localhost".to_string(),
            from_email: None,
            from_name: None,
            reply_to: None,
        }
    }
}

impl fmt::Debug for MailerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("secure", &self.secure)
            .field("allow_insecure_fallback", &self.allow_insecure_fallback)
            .field("timeout_secs", &self.timeout_secs)
            .field("helo_name", &self.helo_name)
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("reply_to", &self.reply_to)
            .finish()
    }
}

impl MailerSettings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its
    /// value. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut settings = Self::default();
        if let Some(host) = get("SMTP_HOST") {
            settings.host = host;
        }
        if let Some(port) = get("SMTP_PORT") {
            settings.port = Some(parse_number("SMTP_PORT", &port)?);
        }
        settings.username = get("SMTP_USERNAME");
        // Passwords may legitimately start or end with spaces.
        settings.password = lookup("SMTP_PASSWORD").filter(|value| !value.is_empty());
        if let Some(secure) = get("SMTP_SECURE") {
            settings.secure = secure.parse()?;
        }
        if let Some(flag) = get("SMTP_ALLOW_INSECURE_FALLBACK") {
            settings.allow_insecure_fallback = parse_flag("SMTP_ALLOW_INSECURE_FALLBACK", &flag)?;
        }
        if let Some(secs) = get("SMTP_TIMEOUT_SECS") {
            settings.timeout_secs = parse_number("SMTP_TIMEOUT_SECS", &secs)?;
        }
        if let Some(helo) = get("SMTP_HELO_NAME") {
            settings.helo_name = helo;
        }
        settings.from_email = get("MAIL_FROM_EMAIL");
        settings.from_name = get("MAIL_FROM_NAME");
        settings.reply_to = get("MAIL_REPLY_TO");
        Ok(settings)
    }

    /// Parses settings from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serde`] if the document is not valid.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds and validates the SMTP engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if only one of username and password is set
    /// or the resulting configuration is invalid.
    pub fn to_smtp_config(&self) -> Result<Config> {
        let mut builder = Config::builder(self.host.clone())
            .security(self.secure.into())
            .timeout(Duration::from_secs(self.timeout_secs))
            .client_hostname(self.helo_name.clone())
            .allow_insecure_fallback(self.allow_insecure_fallback);

        if let Some(port) = self.port {
            builder = builder.port(port);
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                builder = builder.credentials(username.clone(), password.clone());
            }
            (None, None) => {}
            _ => {
                return Err(Error::Config(
                    "SMTP_USERNAME and SMTP_PASSWORD must be set together".into(),
                ));
            }
        }

        let config = builder.build();
        config
            .validate()
            .map_err(|err| Error::Config(err.to_string()))?;
        Ok(config)
    }

    /// Returns the `From` mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no sender address is configured, or
    /// [`Error::Mime`] if it is not a valid address.
    pub fn sender(&self) -> Result<Mailbox> {
        let email = self
            .from_email
            .as_ref()
            .or(self.username.as_ref())
            .ok_or_else(|| Error::Config("MAIL_FROM_EMAIL is not set".into()))?;

        Ok(match &self.from_name {
            Some(name) => Mailbox::with_name(name.clone(), email.clone())?,
            None => Mailbox::new(email.clone())?,
        })
    }

    /// Returns the default `Reply-To` mailbox, if configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Mime`] if the address is not valid.
    pub fn reply_to_mailbox(&self) -> Result<Option<Mailbox>> {
        Ok(self
            .reply_to
            .as_deref()
            .map(str::parse::<Mailbox>)
            .transpose()?)
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a number (got {value:?})")))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!(
            "{name} must be true or false (got {value:?})"
        ))),
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
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = MailerSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, MailerSettings::default());

        let config = settings.to_smtp_config().unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, 587);
        assert_eq!(config.security, Security::StartTls);
        assert!(config.credentials.is_none());
        assert!(!config.allow_insecure_fallback);
    }

    #[test]
    fn test_full_environment() {
        let settings = MailerSettings::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "2525"),
            ("SMTP_USERNAME", "user@example.com"),
            ("SMTP_PASSWORD", " pass word "),
            ("SMTP_SECURE", "SSL"),
            ("SMTP_ALLOW_INSECURE_FALLBACK", "yes"),
            ("SMTP_TIMEOUT_SECS", "5"),
            ("SMTP_HELO_NAME", "app.example.com"),
            ("MAIL_FROM_EMAIL", "noreply@example.com"),
            ("MAIL_FROM_NAME", "Review Desk"),
            ("MAIL_REPLY_TO", "support@example.com"),
        ]))
        .unwrap();

        assert_eq!(settings.password.as_deref(), Some(" pass word "));
        let config = settings.to_smtp_config().unwrap();
        assert_eq!(config.port, 2525);
        assert_eq!(config.security, Security::Implicit);
        assert!(config.allow_insecure_fallback);
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.client_hostname, "app.example.com");
        assert_eq!(config.credentials.unwrap().username, "user@example.com");

        let sender = settings.sender().unwrap();
        assert_eq!(sender.to_string(), "Review Desk <noreply@example.com>");
        assert_eq!(
            settings.reply_to_mailbox().unwrap().unwrap().email,
            "support@example.com"
        );
    }

    #[test]
    fn test_secure_vocabulary() {
        assert_eq!("tls".parse::<SecureMode>().unwrap(), SecureMode::Tls);
        assert_eq!("ssl".parse::<SecureMode>().unwrap(), SecureMode::Ssl);
        assert_eq!("none".parse::<SecureMode>().unwrap(), SecureMode::None);
        assert!("maybe".parse::<SecureMode>().is_err());
        assert_eq!(Security::from(SecureMode::Ssl).default_port(), 465);
    }

    #[test]
    fn test_malformed_values_rejected() {
        assert!(MailerSettings::from_lookup(lookup(&[("SMTP_PORT", "smtp")])).is_err());
        assert!(MailerSettings::from_lookup(lookup(&[("SMTP_SECURE", "yes")])).is_err());
        assert!(
            MailerSettings::from_lookup(lookup(&[("SMTP_ALLOW_INSECURE_FALLBACK", "sure")]))
                .is_err()
        );
    }

    #[test]
    fn test_credentials_must_be_paired() {
        let settings =
            MailerSettings::from_lookup(lookup(&[("SMTP_USERNAME", "user@example.com")])).unwrap();
        assert!(matches!(settings.to_smtp_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_config_reported() {
        let settings = MailerSettings {
            timeout_secs: 0,
            ..MailerSettings::default()
        };
        assert!(matches!(settings.to_smtp_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_sender_falls_back_to_username() {
        let settings = MailerSettings {
            username: Some("user@example.com".into()),
            ..MailerSettings::default()
        };
        assert_eq!(settings.sender().unwrap().email, "user@example.com");
        assert!(MailerSettings::default().sender().is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "host": "relay.internal",
            "port": 25,
            "secure": "none",
            "from_email": "app@relay.internal"
        }"#;
        let settings = MailerSettings::from_json(json).unwrap();
        assert_eq!(settings.host, "relay.internal");
        assert_eq!(settings.secure, SecureMode::None);
        assert_eq!(settings.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(matches!(
            MailerSettings::from_json("{\"port\": \"x\"}"),
            Err(Error::Serde(_))
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let settings = MailerSettings {
            password: Some("hunter2".into()),
            ..MailerSettings::default()
        };
        assert!(!format!("{settings:?}").contains("hunter2"));
    }
}
