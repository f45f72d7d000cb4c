//! Mailer service for sending transactional email.
//!
//! Wraps one [`SmtpSession`] with the configured sender and turns
//! application-level requests (a verification code, a notification) into
//! MIME messages and envelopes.

use postwire_mime::{Mailbox, MessageBuilder};
use postwire_smtp::{Address, Connector, Envelope, Outcome, SmtpSession, TcpConnector};
use tracing::{info, warn};

use super::templates;
use crate::config::MailerSettings;
use crate::error::Result;

/// Value of the `X-Mailer` header on every message.
pub const X_MAILER: &str = concat!("postwire/", env!("CARGO_PKG_VERSION"));

/// An email to send.
#[derive(Debug, Clone, Default)]
pub struct OutgoingEmail {
    /// Recipients, as `addr` or `Name <addr>`.
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: Option<String>,
    /// Plain text body; derived from `html` when absent.
    pub text: Option<String>,
    /// `Reply-To` override.
    pub reply_to: Option<String>,
}

impl OutgoingEmail {
    /// Creates an email to one recipient.
    #[must_use]
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the `Reply-To` address.
    #[must_use]
    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

/// Sends mail through one configured SMTP server.
#[derive(Debug, Clone)]
pub struct Mailer<C = TcpConnector> {
    session: SmtpSession<C>,
    sender: Mailbox,
    reply_to: Option<Mailbox>,
    product: String,
}

impl Mailer {
    /// Creates a mailer using TCP and rustls.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are incomplete or invalid.
    pub fn from_settings(settings: &MailerSettings) -> Result<Self> {
        Self::with_connector(settings, TcpConnector::new()?)
    }
}

impl<C: Connector> Mailer<C> {
    /// Creates a mailer using a custom connector.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are incomplete or invalid.
    pub fn with_connector(settings: &MailerSettings, connector: C) -> Result<Self> {
        let session = SmtpSession::with_connector(settings.to_smtp_config()?, connector)?;
        let sender = settings.sender()?;
        let reply_to = settings.reply_to_mailbox()?;
        let product = sender
            .name
            .clone()
            .unwrap_or_else(|| sender.domain().to_string());

        Ok(Self {
            session,
            sender,
            reply_to,
            product,
        })
    }

    /// Returns the `From` mailbox.
    #[must_use]
    pub const fn sender(&self) -> &Mailbox {
        &self.sender
    }

    /// Returns the underlying session.
    #[must_use]
    pub const fn session(&self) -> &SmtpSession<C> {
        &self.session
    }

    /// Builds and sends `email`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the email cannot be built (invalid address,
    /// header injection, no body). Delivery results, including rejections,
    /// are in the returned [`Outcome`].
    pub async fn send(&self, email: OutgoingEmail) -> Result<Outcome> {
        let recipients = email
            .to
            .iter()
            .map(|to| to.parse::<Mailbox>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut builder = MessageBuilder::new()
            .from(self.sender.clone())
            .subject(email.subject.as_str())
            .header("X-Mailer", X_MAILER);
        for recipient in &recipients {
            builder = builder.to(recipient.clone());
        }
        let reply_to = match email.reply_to.as_deref() {
            Some(reply_to) => Some(reply_to.parse::<Mailbox>()?),
            None => self.reply_to.clone(),
        };
        if let Some(reply_to) = reply_to {
            builder = builder.reply_to(reply_to);
        }
        if let Some(text) = email.text {
            builder = builder.text_body(text);
        }
        if let Some(html) = email.html {
            builder = builder.html_body(html);
        }
        let message = builder.build()?;

        let envelope = Envelope::new(
            Address::from(&self.sender),
            recipients.iter().map(Address::from).collect(),
        )?;

        let outcome = self.session.send(&envelope, &message).await;
        match &outcome.failure {
            None => info!(subject = %email.subject, "email sent"),
            Some(failure) => warn!(subject = %email.subject, %failure, "email not sent"),
        }
        Ok(outcome)
    }

    /// Sends a verification code.
    ///
    /// # Errors
    ///
    /// See [`Mailer::send`].
    pub async fn send_otp(&self, to: &str, code: &str) -> Result<Outcome> {
        let email = OutgoingEmail::new(to, templates::OTP_SUBJECT)
            .html(templates::otp(code, &self.product));
        self.send(email).await
    }

    /// Sends `content_html` inside the notification frame.
    ///
    /// # Errors
    ///
    /// See [`Mailer::send`].
    pub async fn send_notification(
        &self,
        to: &str,
        subject: &str,
        content_html: &str,
    ) -> Result<Outcome> {
        use chrono::Datelike;

        let year = chrono::Utc::now().year();
        let email = OutgoingEmail::new(to, subject).html(templates::notification(
            subject,
            content_html,
            &self.product,
            year,
        ));
        self.send(email).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Error;

    fn settings() -> MailerSettings {
        MailerSettings {
            from_email: Some("noreply@example.com".into()),
            from_name: Some("Review Desk".into()),
            ..MailerSettings::default()
        }
    }

    #[test]
    fn test_outgoing_email_builder() {
        let email = OutgoingEmail::new("a@example.com", "Hi")
            .to("B <b@example.com>")
            .text("hello")
            .reply_to("support@example.com");
        assert_eq!(email.to, vec!["a@example.com", "B <b@example.com>"]);
        assert_eq!(email.text.as_deref(), Some("hello"));
        assert!(email.html.is_none());
    }

    #[test]
    fn test_mailer_uses_sender_name_as_product() {
        let mailer =
            Mailer::with_connector(&settings(), TcpConnector::plaintext_only()).unwrap();
        assert_eq!(mailer.sender().email, "noreply@example.com");
        assert_eq!(mailer.product, "Review Desk");
    }

    #[test]
    fn test_mailer_requires_sender() {
        let result = Mailer::with_connector(
            &MailerSettings::default(),
            TcpConnector::plaintext_only(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_an_error() {
        let mailer =
            Mailer::with_connector(&settings(), TcpConnector::plaintext_only()).unwrap();
        let result = mailer.send_otp("not an address", "123456").await;
        assert!(matches!(result, Err(Error::Mime(_))));
    }

    #[tokio::test]
    async fn test_header_injection_is_an_error() {
        let mailer =
            Mailer::with_connector(&settings(), TcpConnector::plaintext_only()).unwrap();
        let email =
            OutgoingEmail::new("a@example.com", "Hi\r\nBcc: victim@example.com").text("x");
        assert!(mailer.send(email).await.is_err());
    }
}
