//! The SMTP session state machine.
//!
//! One [`SmtpSession::send`] call opens a connection, walks the dialogue
//! strictly in order and closes the stream on every exit path:
//!
//! ```text
//! connect ─→ 220 ─→ EHLO ─→ [STARTTLS ─→ handshake ─→ EHLO] ─→ [AUTH LOGIN]
//!         ─→ MAIL FROM ─→ RCPT TO (each) ─→ DATA ─→ payload "." ─→ QUIT
//! ```
//!
//! The first unexpected reply aborts the send without QUIT; nothing is
//! retried.

mod outcome;
mod state;

pub use outcome::{Failure, FailureKind, Outcome};
pub use state::SessionState;

use crate::command::Command;
use crate::connection::{
    Config, Connector, Credentials, Security, ServerInfo, TcpConnector, Transport, read_reply,
};
use crate::types::{AuthMechanism, Envelope, Reply, ReplyCode};
use crate::{Error, Result};
use postwire_mime::Message;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};

type Step<T = ()> = std::result::Result<T, Failure>;

/// Reusable sender bound to one configuration.
///
/// The session holds no connection between calls; each `send` gets its own
/// stream, so concurrent sends through one `SmtpSession` never share state.
#[derive(Debug, Clone)]
pub struct SmtpSession<C = TcpConnector> {
    config: Config,
    connector: C,
}

impl SmtpSession {
    /// Creates a session using TCP and rustls.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or TLS cannot be
    /// initialised.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_connector(config, TcpConnector::new()?)
    }
}

impl<C: Connector> SmtpSession<C> {
    /// Creates a session using a custom connector.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_connector(config: Config, connector: C) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, connector })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the connector.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Delivers `message` to the envelope recipients.
    ///
    /// Never fails with `Err`: rejections and transport problems are
    /// described by the returned [`Outcome`].
    pub async fn send(&self, envelope: &Envelope, message: &Message) -> Outcome {
        let span = info_span!(
            "smtp_send",
            host = %self.config.host,
            port = self.config.port,
            recipients = envelope.recipients().len(),
        );

        async {
            let mut dialogue = Dialogue::new(&self.config, &self.connector);
            let result = dialogue.deliver(envelope, message).await;
            dialogue.finish(result).await
        }
        .instrument(span)
        .await
    }
}

/// Per-call state: the transport and everything learned so far.
struct Dialogue<'a, C: Connector> {
    config: &'a Config,
    connector: &'a C,
    transport: Option<Transport<C::Stream>>,
    transitions: Vec<SessionState>,
    last_reply: Option<Reply>,
}

impl<'a, C: Connector> Dialogue<'a, C> {
    const fn new(config: &'a Config, connector: &'a C) -> Self {
        Self {
            config,
            connector,
            transport: None,
            transitions: Vec::new(),
            last_reply: None,
        }
    }

    async fn deliver(&mut self, envelope: &Envelope, message: &Message) -> Step {
        let config = self.config;

        self.connect().await?;

        let greeting = self.read().await?;
        self.expect(
            &greeting,
            &[ReplyCode::SERVICE_READY],
            FailureKind::GreetingRejected,
        )?;
        self.advance(SessionState::Greeted);

        let mut server = self.ehlo().await?;
        self.advance(SessionState::EhloDone);

        if config.security == Security::StartTls {
            if let Some(upgraded) = self.starttls(&server).await? {
                server = upgraded;
            }
        }

        if let Some(credentials) = &config.credentials {
            self.authenticate(credentials, &server).await?;
            self.advance(SessionState::Authenticated);
        }

        let mail_from = Command::MailFrom {
            from: envelope.sender().clone(),
        };
        let reply = self.command(&mail_from).await?;
        self.expect(&reply, &[ReplyCode::OK], FailureKind::SenderRejected)?;
        self.advance(SessionState::SenderAccepted);

        for to in envelope.recipients() {
            let rcpt_to = Command::RcptTo { to: to.clone() };
            let reply = self.command(&rcpt_to).await?;
            self.expect(
                &reply,
                &[ReplyCode::OK, ReplyCode::FORWARD],
                FailureKind::RecipientRejected,
            )?;
        }
        self.advance(SessionState::RecipientAccepted);

        let reply = self.command(&Command::Data).await?;
        self.expect(
            &reply,
            &[ReplyCode::START_DATA],
            FailureKind::DataPhaseRejected,
        )?;
        self.advance(SessionState::DataAccepted);

        self.transmit(message).await?;
        self.advance(SessionState::Sent);
        Ok(())
    }

    async fn connect(&mut self) -> Step {
        let config = self.config;

        if config.security == Security::Implicit && !self.connector.supports_tls() {
            return Err(self.fail(
                FailureKind::TlsUnavailable,
                "implicit TLS requested but no TLS mechanism is available",
            ));
        }

        let connect = self
            .connector
            .connect(&config.host, config.port, config.security);
        let stream = match timeout(config.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(self.fail(FailureKind::ConnectionFailed, err.to_string())),
            Err(_) => {
                return Err(self.fail(
                    FailureKind::ConnectionFailed,
                    Error::Timeout("connect").to_string(),
                ));
            }
        };

        let encrypted = config.security == Security::Implicit;
        debug!(encrypted, "connected");
        self.transport = Some(Transport::new(
            stream,
            encrypted,
            config.read_timeout,
            config.write_timeout,
        ));
        self.advance(SessionState::Connected);
        Ok(())
    }

    async fn ehlo(&mut self) -> Step<ServerInfo> {
        let ehlo = Command::Ehlo {
            hostname: self.config.client_hostname.clone(),
        };
        let reply = self.command(&ehlo).await?;
        self.expect(&reply, &[ReplyCode::OK], FailureKind::EhloFailed)?;

        let server = ServerInfo::from_ehlo(&reply);
        debug!(
            server = %server.hostname,
            starttls = server.supports_starttls(),
            "capabilities"
        );
        Ok(server)
    }

    /// Returns the capabilities announced over TLS, or `None` when the
    /// session continues in plaintext.
    async fn starttls(&mut self, server: &ServerInfo) -> Step<Option<ServerInfo>> {
        if !self.connector.supports_tls() {
            return self.tls_unavailable("no TLS mechanism available").map(|()| None);
        }
        if !server.supports_starttls() {
            return self
                .tls_unavailable("server does not advertise STARTTLS")
                .map(|()| None);
        }

        let reply = self.command(&Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return self
                .tls_unavailable(&format!("STARTTLS refused: {reply}"))
                .map(|()| None);
        }

        let reached = self.reached();
        let connector = self.connector;
        let config = self.config;
        let host = config.host.as_str();
        let transport = self.transport()?;
        if transport.buffered_len() > 0 {
            return Err(Failure::new(
                FailureKind::TransportError,
                reached,
                "server sent data before the TLS handshake",
            ));
        }
        transport
            .upgrade(|stream| connector.upgrade(stream, host))
            .await
            .map_err(|err| Failure::new(FailureKind::TlsUpgradeFailed, reached, err.to_string()))?;
        debug!("TLS established");

        let server = self.ehlo().await?;
        self.advance(SessionState::TlsUpgraded);
        Ok(Some(server))
    }

    fn tls_unavailable(&self, detail: &str) -> Step {
        if self.config.allow_insecure_fallback {
            warn!(detail, "STARTTLS unavailable, continuing without encryption");
            Ok(())
        } else {
            Err(self.fail(FailureKind::TlsUnavailable, detail))
        }
    }

    async fn authenticate(&mut self, credentials: &Credentials, server: &ServerInfo) -> Step {
        let mechanisms = server.auth_mechanisms();
        if server.advertises_auth() && !mechanisms.contains(&AuthMechanism::Login) {
            let offered: Vec<&str> = mechanisms.iter().map(|m| m.as_str()).collect();
            return Err(self.fail(
                FailureKind::AuthUnsupported,
                format!("LOGIN not offered (server offers: {})", offered.join(" ")),
            ));
        }

        let auth = Command::Auth {
            mechanism: AuthMechanism::Login,
        };
        let reply = self.command(&auth).await?;
        if [
            ReplyCode::SYNTAX_ERROR,
            ReplyCode::NOT_IMPLEMENTED,
            ReplyCode::PARAMETER_NOT_IMPLEMENTED,
        ]
        .contains(&reply.code)
        {
            return Err(self.fail(FailureKind::AuthUnsupported, reply.to_string()));
        }
        self.expect(&reply, &[ReplyCode::AUTH_CONTINUE], FailureKind::AuthRejected)?;

        let username = Command::auth_response(&credentials.username);
        let reply = self.command(&username).await?;
        self.expect(&reply, &[ReplyCode::AUTH_CONTINUE], FailureKind::AuthRejected)?;

        let password = Command::auth_response(&credentials.password);
        let reply = self.command(&password).await?;
        self.expect(&reply, &[ReplyCode::AUTH_SUCCEEDED], FailureKind::AuthRejected)
    }

    async fn transmit(&mut self, message: &Message) -> Step {
        let mut payload = message.data_payload();
        payload.extend_from_slice(b".\r\n");
        debug!(bytes = payload.len(), "C: <message data>");

        let reached = self.reached();
        let transport = self.transport()?;
        transport
            .write_all(&payload)
            .await
            .map_err(|err| transport_failure(reached, &err))?;

        let reply = self.read().await?;
        self.expect(&reply, &[ReplyCode::OK], FailureKind::MessageRejected)
    }

    /// Best effort: the message is already accepted, so errors only get logged.
    async fn quit(&mut self) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        debug!("C: {}", Command::Quit);
        if let Err(err) = transport.send_command(&Command::Quit).await {
            debug!(%err, "QUIT not sent");
            return;
        }
        match read_reply(transport).await {
            Ok(reply) => debug!("S: {reply}"),
            Err(err) => debug!(%err, "no reply to QUIT"),
        }
    }

    async fn finish(mut self, result: Step) -> Outcome {
        let (stage, failure) = match result {
            Ok(()) => {
                self.quit().await;
                (SessionState::Sent, None)
            }
            Err(failure) => {
                self.advance(SessionState::Failed);
                (failure.stage, Some(failure))
            }
        };

        let encrypted = self
            .transport
            .as_ref()
            .is_some_and(Transport::is_encrypted);
        if let Some(transport) = self.transport.as_mut() {
            transport.close().await;
        }
        self.advance(SessionState::Closed);

        match &failure {
            None => info!(encrypted, "message accepted"),
            Some(failure) => warn!(
                kind = %failure.kind,
                stage = %failure.stage,
                detail = %failure.detail,
                "send failed"
            ),
        }

        Outcome {
            stage,
            last_reply: self.last_reply,
            failure,
            transitions: self.transitions,
            encrypted,
        }
    }

    async fn command(&mut self, command: &Command) -> Step<Reply> {
        debug!("C: {command}");
        let reached = self.reached();
        let transport = self.transport()?;
        transport
            .send_command(command)
            .await
            .map_err(|err| transport_failure(reached, &err))?;
        self.read().await
    }

    async fn read(&mut self) -> Step<Reply> {
        let reached = self.reached();
        let transport = self.transport()?;
        let reply = read_reply(transport)
            .await
            .map_err(|err| transport_failure(reached, &err))?;
        debug!("S: {reply}");
        self.last_reply = Some(reply.clone());
        Ok(reply)
    }

    fn transport(&mut self) -> Step<&mut Transport<C::Stream>> {
        let reached = self.reached();
        self.transport.as_mut().ok_or_else(|| {
            Failure::new(FailureKind::TransportError, reached, "transport is closed")
        })
    }

    /// Last state entered, or `Failed` before the connection is up.
    fn reached(&self) -> SessionState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(SessionState::Failed)
    }

    fn fail(&self, kind: FailureKind, detail: impl Into<String>) -> Failure {
        Failure::new(kind, self.reached(), detail)
    }

    fn expect(&self, reply: &Reply, accepted: &[ReplyCode], kind: FailureKind) -> Step {
        if accepted.contains(&reply.code) {
            Ok(())
        } else {
            Err(self.fail(kind, reply.to_string()))
        }
    }

    fn advance(&mut self, state: SessionState) {
        if self
            .transitions
            .last()
            .is_none_or(|current| *current < state)
        {
            debug!(%state, "session state");
            self.transitions.push(state);
        }
    }
}

fn transport_failure(stage: SessionState, err: &Error) -> Failure {
    Failure::new(FailureKind::TransportError, stage, err.to_string())
}
