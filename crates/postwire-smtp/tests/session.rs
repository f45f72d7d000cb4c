//! Integration tests for the SMTP session.
//!
//! A scripted server runs on the far end of an in-memory duplex stream (or
//! a real socket on 127.0.0.1) and records everything the client sends.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names,
    clippy::too_many_lines
)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
};
use tokio::net::TcpListener;

use postwire_mime::{Mailbox, Message, MessageBuilder};
use postwire_smtp::{
    Address, Config, ConfigBuilder, Connector, Envelope, Error, FailureKind, Outcome, ReplyCode,
    Security, SessionState, SmtpSession, TcpConnector,
};

const EHLO: &str = "250-mail.example.com Hello\r\n\
                    250-SIZE 35882577\r\n\
                    250-STARTTLS\r\n\
                    250 AUTH LOGIN PLAIN\r\n";
const EHLO_TLS: &str = "250-mail.example.com Hello again\r\n250 AUTH LOGIN PLAIN\r\n";
const USERNAME_B64: &str = "dXNlckBleGFtcGxlLmNvbQ==";
const PASSWORD_B64: &str = "c2VjcmV0";

// ---------------------------------------------------------------------------
// Scripted server
// ---------------------------------------------------------------------------

/// Replies the server sends, one per protocol step.
#[derive(Clone)]
struct Script {
    greeting: &'static str,
    ehlo: &'static str,
    ehlo_after_tls: &'static str,
    starttls: &'static str,
    auth: &'static str,
    username: &'static str,
    password: &'static str,
    mail: &'static str,
    rcpt: &'static str,
    /// Address (without brackets) that gets its own reply.
    rcpt_reject: Option<(&'static str, &'static str)>,
    data: &'static str,
    message: &'static str,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: "220 mail.example.com ESMTP ready\r\n",
            ehlo: EHLO,
            ehlo_after_tls: EHLO_TLS,
            starttls: "220 2.0.0 Ready to start TLS\r\n",
            auth: "334 VXNlcm5hbWU6\r\n",
            username: "334 UGFzc3dvcmQ6\r\n",
            password: "235 2.7.0 Authentication successful\r\n",
            mail: "250 2.1.0 Sender OK\r\n",
            rcpt: "250 2.1.5 Recipient OK\r\n",
            rcpt_reject: None,
            data: "354 End data with <CR><LF>.<CR><LF>\r\n",
            message: "250 2.0.0 Ok: queued as 4F2A1\r\n",
        }
    }
}

/// What the server observed.
#[derive(Debug, Default)]
struct Transcript {
    commands: Vec<String>,
    data: Vec<String>,
    quit: bool,
    closed: bool,
}

impl Transcript {
    fn count(&self, prefix: &str) -> usize {
        self.commands.iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn sent(&self, prefix: &str) -> bool {
        self.count(prefix) > 0
    }
}

async fn serve<S>(stream: S, script: Script) -> Transcript
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut transcript = Transcript::default();
    let mut auth_step = 0;
    let mut tls = false;

    let _ = write_half.write_all(script.greeting.as_bytes()).await;

    loop {
        let Some(line) = next_line(&mut reader).await else {
            transcript.closed = true;
            return transcript;
        };
        transcript.commands.push(line.clone());

        let reply = if auth_step == 1 {
            auth_step = if script.username.starts_with("334") { 2 } else { 0 };
            script.username
        } else if auth_step == 2 {
            auth_step = 0;
            script.password
        } else if line.starts_with("EHLO ") {
            if tls { script.ehlo_after_tls } else { script.ehlo }
        } else if line == "STARTTLS" {
            tls = script.starttls.starts_with("220");
            script.starttls
        } else if line == "AUTH LOGIN" {
            if script.auth.starts_with("334") {
                auth_step = 1;
            }
            script.auth
        } else if line.starts_with("MAIL FROM:") {
            script.mail
        } else if let Some(addr) = line.strip_prefix("RCPT TO:") {
            match script.rcpt_reject {
                Some((rejected, reply)) if addr == format!("<{rejected}>") => reply,
                _ => script.rcpt,
            }
        } else if line == "DATA" {
            let _ = write_half.write_all(script.data.as_bytes()).await;
            if !script.data.starts_with("354") {
                continue;
            }
            loop {
                let Some(data_line) = next_line(&mut reader).await else {
                    transcript.closed = true;
                    return transcript;
                };
                if data_line == "." {
                    break;
                }
                transcript.data.push(data_line);
            }
            script.message
        } else if line == "QUIT" {
            transcript.quit = true;
            "221 2.0.0 Bye\r\n"
        } else {
            "500 5.5.2 Command unrecognized\r\n"
        };

        let _ = write_half.write_all(reply.as_bytes()).await;
    }
}

async fn next_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<String> {
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

// ---------------------------------------------------------------------------
// Mock connector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tls {
    Works,
    Unsupported,
    HandshakeFails,
    RefuseConnect,
}

struct MockConnector {
    stream: Mutex<Option<DuplexStream>>,
    tls: Tls,
    upgrades: AtomicUsize,
}

impl MockConnector {
    fn new(stream: DuplexStream, tls: Tls) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
            tls,
            upgrades: AtomicUsize::new(0),
        }
    }
}

impl Connector for MockConnector {
    type Stream = DuplexStream;

    async fn connect(
        &self,
        _host: &str,
        _port: u16,
        _security: Security,
    ) -> postwire_smtp::Result<DuplexStream> {
        if self.tls == Tls::RefuseConnect {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        let stream = self.stream.lock().unwrap().take();
        stream.ok_or_else(|| Error::InvalidState("mock already connected".into()))
    }

    async fn upgrade(
        &self,
        stream: DuplexStream,
        _host: &str,
    ) -> postwire_smtp::Result<DuplexStream> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        if self.tls == Tls::HandshakeFails {
            drop(stream);
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid peer certificate",
            )));
        }
        Ok(stream)
    }

    fn supports_tls(&self) -> bool {
        self.tls != Tls::Unsupported
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Run {
    outcome: Outcome,
    transcript: Transcript,
    upgrades: usize,
}

fn config() -> ConfigBuilder {
    Config::builder("mail.example.com")
        .credentials("user@example.com", "secret")
        .timeout(Duration::from_secs(5))
}

fn envelope_to(to: &[&str]) -> Envelope {
    Envelope::new(
        Address::new("app@example.com").unwrap(),
        to.iter().map(|addr| Address::new(*addr).unwrap()).collect(),
    )
    .unwrap()
}

fn envelope() -> Envelope {
    envelope_to(&["customer@example.org"])
}

fn message_with_text(text: &str) -> Message {
    MessageBuilder::new()
        .from(Mailbox::with_name("Review Desk", "app@example.com").unwrap())
        .to(Mailbox::new("customer@example.org").unwrap())
        .subject("Your verification code")
        .text_body(text)
        .html_body("<p>Your code is <b>428913</b></p>")
        .build()
        .unwrap()
}

fn message() -> Message {
    message_with_text("Your code is 428913")
}

async fn run_with(
    script: Script,
    tls: Tls,
    config: Config,
    envelope: &Envelope,
    message: &Message,
) -> Run {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(serve(server, script));

    let session = SmtpSession::with_connector(config, MockConnector::new(client, tls)).unwrap();
    let outcome = session.send(envelope, message).await;
    let upgrades = session.connector().upgrades.load(Ordering::SeqCst);
    drop(session);

    let transcript = server.await.unwrap();
    Run {
        outcome,
        transcript,
        upgrades,
    }
}

async fn run(script: Script) -> Run {
    run_with(script, Tls::Works, config().build(), &envelope(), &message()).await
}

fn assert_failed(run: &Run, kind: FailureKind, stage: SessionState) {
    assert!(!run.outcome.is_success(), "unexpected success: {:?}", run.outcome);
    assert_eq!(run.outcome.cause(), Some(kind), "{:?}", run.outcome);
    assert_eq!(run.outcome.stage, stage);
    assert_eq!(run.outcome.failure.as_ref().unwrap().stage, stage);

    let transitions = &run.outcome.transitions;
    assert_eq!(
        &transitions[transitions.len() - 2..],
        &[SessionState::Failed, SessionState::Closed]
    );
    // The reported stage is the last state entered before failing.
    let reached = transitions
        .len()
        .checked_sub(3)
        .map_or(SessionState::Failed, |i| transitions[i]);
    assert_eq!(reached, stage);
    assert!(!run.transcript.quit, "QUIT must not be sent after a failure");
    assert!(run.transcript.closed, "socket must be closed");
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_dialogue_with_starttls_and_auth_succeeds() {
    let run = run(Script::default()).await;

    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert_eq!(run.outcome.stage, SessionState::Sent);
    assert!(run.outcome.encrypted);
    assert_eq!(run.upgrades, 1);
    assert_eq!(
        run.outcome.transitions,
        vec![
            SessionState::Connected,
            SessionState::Greeted,
            SessionState::EhloDone,
            SessionState::TlsUpgraded,
            SessionState::Authenticated,
            SessionState::SenderAccepted,
            SessionState::RecipientAccepted,
            SessionState::DataAccepted,
            SessionState::Sent,
            SessionState::Closed,
        ]
    );
    assert_eq!(
        run.transcript.commands,
        vec![
            "EHLO localhost",
            "STARTTLS",
            "EHLO localhost",
            "AUTH LOGIN",
            USERNAME_B64,
            PASSWORD_B64,
            "MAIL FROM:<app@example.com>",
            "RCPT TO:<customer@example.org>",
            "DATA",
            "QUIT",
        ]
    );
    assert!(run.transcript.quit);
    assert!(run.transcript.closed);
    assert_eq!(
        run.outcome.last_reply.as_ref().unwrap().code,
        ReplyCode::OK
    );
    assert!(run.transcript.data.iter().any(|l| l == "Subject: Your verification code"));
}

#[tokio::test]
async fn bad_password_is_auth_rejected_without_quit() {
    let run = run(Script {
        password: "535 5.7.8 Authentication credentials invalid\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::AuthRejected, SessionState::TlsUpgraded);
    assert!(!run.transcript.sent("MAIL FROM"));
    assert_eq!(
        run.outcome.last_reply.as_ref().unwrap().code,
        ReplyCode::AUTH_FAILED
    );
    assert!(!run.outcome.is_transient());
}

#[tokio::test]
async fn rejected_recipient_stops_before_data() {
    let run = run_with(
        Script {
            rcpt_reject: Some(("bad@x", "550 5.1.1 No such user\r\n")),
            ..Script::default()
        },
        Tls::Works,
        config().build(),
        &envelope_to(&["bad@x"]),
        &message(),
    )
    .await;

    assert_failed(&run, FailureKind::RecipientRejected, SessionState::SenderAccepted);
    assert_eq!(run.transcript.count("MAIL FROM"), 1);
    assert_eq!(run.transcript.count("RCPT TO"), 1);
    assert!(!run.transcript.sent("DATA"));
    assert!(
        run.outcome
            .failure
            .as_ref()
            .unwrap()
            .detail
            .contains("No such user")
    );
}

#[tokio::test]
async fn starttls_454_aborts_by_default() {
    let run = run(Script {
        starttls: "454 4.7.0 TLS not available due to temporary reason\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::TlsUnavailable, SessionState::EhloDone);
    assert_eq!(run.upgrades, 0);
    assert_eq!(run.transcript.commands, vec!["EHLO localhost", "STARTTLS"]);
    assert!(!run.outcome.encrypted);
}

#[tokio::test]
async fn starttls_454_continues_in_plaintext_when_allowed() {
    let run = run_with(
        Script {
            starttls: "454 4.7.0 TLS not available due to temporary reason\r\n",
            ..Script::default()
        },
        Tls::Works,
        config().allow_insecure_fallback(true).build(),
        &envelope(),
        &message(),
    )
    .await;

    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert!(!run.outcome.encrypted);
    assert!(!run.outcome.transitions.contains(&SessionState::TlsUpgraded));
    assert_eq!(run.transcript.count("EHLO"), 1);
    assert_eq!(run.transcript.count("MAIL FROM"), 1);
    assert!(run.transcript.quit);
}

// ---------------------------------------------------------------------------
// TLS edge cases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn starttls_not_advertised_aborts_without_sending_it() {
    let run = run(Script {
        ehlo: "250-mail.example.com\r\n250 AUTH LOGIN\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::TlsUnavailable, SessionState::EhloDone);
    assert_eq!(run.transcript.commands, vec!["EHLO localhost"]);
}

#[tokio::test]
async fn connector_without_tls_aborts_without_starttls() {
    let run = run_with(
        Script::default(),
        Tls::Unsupported,
        config().build(),
        &envelope(),
        &message(),
    )
    .await;

    assert_failed(&run, FailureKind::TlsUnavailable, SessionState::EhloDone);
    assert!(!run.transcript.sent("STARTTLS"));
}

#[tokio::test]
async fn handshake_failure_never_falls_back() {
    let run = run_with(
        Script::default(),
        Tls::HandshakeFails,
        config().allow_insecure_fallback(true).build(),
        &envelope(),
        &message(),
    )
    .await;

    assert_failed(&run, FailureKind::TlsUpgradeFailed, SessionState::EhloDone);
    assert_eq!(run.upgrades, 1);
    assert_eq!(run.transcript.commands, vec!["EHLO localhost", "STARTTLS"]);
}

#[tokio::test]
async fn data_buffered_before_handshake_is_rejected() {
    let run = run(Script {
        starttls: "220 Ready\r\n250 injected\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::TransportError, SessionState::EhloDone);
    assert_eq!(run.upgrades, 0);
}

#[tokio::test]
async fn ehlo_failure_after_tls() {
    let run = run(Script {
        ehlo_after_tls: "421 4.3.0 Try again later\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::EhloFailed, SessionState::EhloDone);
    assert!(run.outcome.is_transient());
    assert!(!run.transcript.sent("AUTH"));
}

#[tokio::test]
async fn implicit_tls_skips_starttls() {
    let run = run_with(
        Script {
            ehlo: EHLO_TLS,
            ..Script::default()
        },
        Tls::Works,
        config().security(Security::Implicit).build(),
        &envelope(),
        &message(),
    )
    .await;

    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert!(run.outcome.encrypted);
    assert_eq!(run.upgrades, 0);
    assert!(!run.transcript.sent("STARTTLS"));
    assert!(!run.outcome.transitions.contains(&SessionState::TlsUpgraded));
}

#[tokio::test]
async fn implicit_tls_without_tls_mechanism() {
    let run = run_with(
        Script::default(),
        Tls::Unsupported,
        config().security(Security::Implicit).allow_insecure_fallback(true).build(),
        &envelope(),
        &message(),
    )
    .await;

    assert_failed(&run, FailureKind::TlsUnavailable, SessionState::Failed);
    assert!(run.transcript.commands.is_empty());
}

// ---------------------------------------------------------------------------
// Failure injection at each step
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connection_refused() {
    let run = run_with(
        Script::default(),
        Tls::RefuseConnect,
        config().build(),
        &envelope(),
        &message(),
    )
    .await;

    assert_failed(&run, FailureKind::ConnectionFailed, SessionState::Failed);
    assert_eq!(
        run.outcome.transitions,
        vec![SessionState::Failed, SessionState::Closed]
    );
    assert!(run.outcome.last_reply.is_none());
    assert!(run.outcome.is_transient());
}

#[tokio::test]
async fn greeting_rejected() {
    let run = run(Script {
        greeting: "554 5.3.2 No SMTP service here\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::GreetingRejected, SessionState::Connected);
    assert!(run.transcript.commands.is_empty());
}

#[tokio::test]
async fn malformed_greeting_is_transport_error() {
    let run = run(Script {
        greeting: "hello there\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::TransportError, SessionState::Connected);
    assert!(run.transcript.commands.is_empty());
}

#[tokio::test]
async fn silent_server_times_out() {
    let run = run_with(
        Script {
            greeting: "",
            ..Script::default()
        },
        Tls::Works,
        config().read_timeout(Duration::from_millis(100)).build(),
        &envelope(),
        &message(),
    )
    .await;

    assert_failed(&run, FailureKind::TransportError, SessionState::Connected);
    assert!(run.outcome.failure.as_ref().unwrap().detail.contains("Timed out"));
}

#[tokio::test]
async fn ehlo_rejected() {
    let run = run(Script {
        ehlo: "502 5.5.1 EHLO not implemented\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::EhloFailed, SessionState::Greeted);
    assert_eq!(run.transcript.commands, vec!["EHLO localhost"]);
}

#[tokio::test]
async fn auth_without_login_mechanism_sends_no_credentials() {
    let run = run(Script {
        ehlo_after_tls: "250-mail.example.com\r\n250 AUTH PLAIN XOAUTH2\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::AuthUnsupported, SessionState::TlsUpgraded);
    assert!(!run.transcript.sent("AUTH"));
    assert!(!run.transcript.sent(USERNAME_B64));
}

#[tokio::test]
async fn auth_login_not_implemented() {
    let run = run(Script {
        auth: "504 5.5.4 Unrecognized authentication type\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::AuthUnsupported, SessionState::TlsUpgraded);
    assert!(!run.transcript.sent(USERNAME_B64));
}

#[tokio::test]
async fn auth_username_rejected() {
    let run = run(Script {
        username: "535 5.7.8 Username unknown\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::AuthRejected, SessionState::TlsUpgraded);
    assert!(!run.transcript.sent(PASSWORD_B64));
}

#[tokio::test]
async fn no_credentials_skips_auth() {
    let config = Config::builder("mail.example.com")
        .timeout(Duration::from_secs(5))
        .build();
    let run = run_with(Script::default(), Tls::Works, config, &envelope(), &message()).await;

    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert!(!run.transcript.sent("AUTH"));
    assert!(!run.outcome.transitions.contains(&SessionState::Authenticated));
}

#[tokio::test]
async fn sender_rejected() {
    let run = run(Script {
        mail: "553 5.7.1 Sender address rejected\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::SenderRejected, SessionState::Authenticated);
    assert!(!run.transcript.sent("RCPT TO"));
}

#[tokio::test]
async fn transient_recipient_rejection() {
    let run = run(Script {
        rcpt: "451 4.7.1 Greylisted, try again later\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::RecipientRejected, SessionState::SenderAccepted);
    assert!(run.outcome.is_transient());
}

#[tokio::test]
async fn data_rejected() {
    let run = run(Script {
        data: "554 5.5.1 No valid recipients\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::DataPhaseRejected, SessionState::RecipientAccepted);
    assert!(run.transcript.data.is_empty());
}

#[tokio::test]
async fn message_rejected_after_payload() {
    let run = run(Script {
        message: "552 5.3.4 Message size exceeds fixed limit\r\n",
        ..Script::default()
    })
    .await;

    assert_failed(&run, FailureKind::MessageRejected, SessionState::DataAccepted);
    assert_ne!(run.outcome.stage, SessionState::Sent);
    assert!(!run.transcript.data.is_empty());
    assert!(!run.outcome.transitions.contains(&SessionState::Sent));
}

// ---------------------------------------------------------------------------
// Recipients and payload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_recipient_gets_rcpt_and_251_is_accepted() {
    let run = run_with(
        Script {
            rcpt: "251 2.1.5 User not local; will forward\r\n",
            ..Script::default()
        },
        Tls::Works,
        config().build(),
        &envelope_to(&["one@example.org", "two@example.org"]),
        &message(),
    )
    .await;

    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    assert_eq!(run.transcript.count("RCPT TO"), 2);
    assert!(run.transcript.sent("RCPT TO:<one@example.org>"));
    assert!(run.transcript.sent("RCPT TO:<two@example.org>"));
}

#[tokio::test]
async fn second_recipient_rejected_aborts() {
    let run = run_with(
        Script {
            rcpt_reject: Some(("two@example.org", "550 5.1.1 No such user\r\n")),
            ..Script::default()
        },
        Tls::Works,
        config().build(),
        &envelope_to(&["one@example.org", "two@example.org", "three@example.org"]),
        &message(),
    )
    .await;

    assert_failed(&run, FailureKind::RecipientRejected, SessionState::SenderAccepted);
    assert_eq!(run.transcript.count("RCPT TO"), 2);
    assert!(!run.transcript.sent("DATA"));
}

#[tokio::test]
async fn dot_lines_never_end_data_early() {
    let message = message_with_text("first line\n.\n..two dots\n.leading\nlast");
    let run = run_with(
        Script::default(),
        Tls::Works,
        config().build(),
        &envelope(),
        &message,
    )
    .await;

    assert!(run.outcome.is_success(), "{:?}", run.outcome);
    let data = &run.transcript.data;
    assert!(data.iter().any(|l| l == ".."));
    assert!(data.iter().any(|l| l == "...two dots"));
    assert!(data.iter().any(|l| l == "..leading"));
    assert!(data.iter().any(|l| l == "last"));
    // The closing delimiter is only reached if no body line ended DATA.
    let close = message.boundary().unwrap().close_delimiter();
    assert!(data.contains(&close));
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SharedLog(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn credentials_never_reach_the_log() {
    let log = SharedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter("postwire_smtp=debug")
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let run = run(Script::default()).await;
    assert!(run.outcome.is_success());

    let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("C: AUTH LOGIN"));
    assert!(output.contains("<credentials redacted>"));
    assert!(output.contains("smtp_send"));
    assert!(!output.contains(USERNAME_B64));
    assert!(!output.contains(PASSWORD_B64));
    assert!(!output.contains("secret"));
}

// ---------------------------------------------------------------------------
// Real sockets
// ---------------------------------------------------------------------------

async fn listen(
    script: Script,
    connections: usize,
) -> (u16, tokio::task::JoinHandle<Vec<Transcript>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut servers = Vec::new();
        for _ in 0..connections {
            let (socket, _) = listener.accept().await.unwrap();
            servers.push(tokio::spawn(serve(socket, script.clone())));
        }
        let mut transcripts = Vec::new();
        for server in servers {
            transcripts.push(server.await.unwrap());
        }
        transcripts
    });
    (port, handle)
}

fn plaintext_config(port: u16) -> Config {
    Config::builder("127.0.0.1")
        .port(port)
        .security(Security::None)
        .credentials("user@example.com", "secret")
        .client_hostname("app.example.com")
        .timeout(Duration::from_secs(5))
        .build()
}

#[tokio::test]
async fn tcp_connector_plaintext_dialogue() {
    let (port, server) = listen(Script::default(), 1).await;
    let session = SmtpSession::new(plaintext_config(port)).unwrap();

    let outcome = session.send(&envelope(), &message()).await;
    let transcripts = server.await.unwrap();

    assert!(outcome.is_success(), "{outcome:?}");
    assert!(!outcome.encrypted);
    let transcript = &transcripts[0];
    assert_eq!(transcript.commands[0], "EHLO app.example.com");
    assert!(!transcript.sent("STARTTLS"));
    assert!(transcript.sent("AUTH LOGIN"));
    assert!(transcript.quit);
    assert!(transcript.closed);
}

#[tokio::test]
async fn concurrent_sends_use_separate_connections() {
    let (port, server) = listen(Script::default(), 2).await;
    let session = SmtpSession::new(plaintext_config(port)).unwrap();

    let first = envelope_to(&["one@example.org"]);
    let second = envelope_to(&["two@example.org"]);
    let message = message();
    let (a, b) = tokio::join!(session.send(&first, &message), session.send(&second, &message));
    let transcripts = server.await.unwrap();

    assert!(a.is_success(), "{a:?}");
    assert!(b.is_success(), "{b:?}");
    for transcript in &transcripts {
        assert_eq!(transcript.count("MAIL FROM"), 1);
        assert_eq!(transcript.count("RCPT TO"), 1);
        assert!(transcript.closed);
    }
}

#[tokio::test]
async fn plaintext_only_connector_reports_tls_unavailable() {
    let (port, server) = listen(Script::default(), 1).await;
    let config = Config::builder("127.0.0.1")
        .port(port)
        .timeout(Duration::from_secs(5))
        .build();
    let session = SmtpSession::with_connector(config, TcpConnector::plaintext_only()).unwrap();

    let outcome = session.send(&envelope(), &message()).await;
    let transcripts = server.await.unwrap();

    assert_eq!(outcome.cause(), Some(FailureKind::TlsUnavailable));
    assert_eq!(transcripts[0].commands, vec!["EHLO localhost"]);
    assert!(transcripts[0].closed);
}

#[test]
fn invalid_config_is_a_hard_error() {
    let config = Config::builder("").build();
    assert!(matches!(
        SmtpSession::with_connector(config, TcpConnector::plaintext_only()),
        Err(Error::InvalidConfig(_))
    ));
}
