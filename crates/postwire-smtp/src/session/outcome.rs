//! Result of one send.

use super::SessionState;
use crate::types::Reply;
use std::fmt;

/// Why a send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The connection could not be opened.
    ConnectionFailed,
    /// The greeting was not `220`.
    GreetingRejected,
    /// EHLO (initial or after STARTTLS) was not accepted.
    EhloFailed,
    /// No TLS upgrade was possible and insecure fallback is not allowed.
    TlsUnavailable,
    /// The TLS handshake failed.
    TlsUpgradeFailed,
    /// The server does not offer AUTH LOGIN.
    AuthUnsupported,
    /// The server rejected the credentials.
    AuthRejected,
    /// `MAIL FROM` was rejected.
    SenderRejected,
    /// A `RCPT TO` was rejected.
    RecipientRejected,
    /// `DATA` was not answered with `354`.
    DataPhaseRejected,
    /// The message was not accepted after the final `.`.
    MessageRejected,
    /// Timeout, closed socket or malformed reply.
    TransportError,
}

impl FailureKind {
    /// Returns the kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionFailed => "ConnectionFailed",
            Self::GreetingRejected => "GreetingRejected",
            Self::EhloFailed => "EhloFailed",
            Self::TlsUnavailable => "TlsUnavailable",
            Self::TlsUpgradeFailed => "TlsUpgradeFailed",
            Self::AuthUnsupported => "AuthUnsupported",
            Self::AuthRejected => "AuthRejected",
            Self::SenderRejected => "SenderRejected",
            Self::RecipientRejected => "RecipientRejected",
            Self::DataPhaseRejected => "DataPhaseRejected",
            Self::MessageRejected => "MessageRejected",
            Self::TransportError => "TransportError",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed send: what went wrong, during which step, and the details.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {stage}: {detail}")]
pub struct Failure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Last state reached before the failing step; `Failed` if the
    /// connection never came up.
    pub stage: SessionState,
    /// Server reply text or local error message.
    pub detail: String,
}

impl Failure {
    pub(crate) fn new(kind: FailureKind, stage: SessionState, detail: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            detail: detail.into(),
        }
    }
}

/// Outcome of [`SmtpSession::send`](crate::SmtpSession::send).
///
/// Server rejections are reported here, never as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// `Sent` on success, otherwise the last state reached before the failure.
    pub stage: SessionState,
    /// Last reply received before the outcome was decided.
    pub last_reply: Option<Reply>,
    /// Failure details; `None` on success.
    pub failure: Option<Failure>,
    /// Every state the session passed through, ending with `Closed`.
    pub transitions: Vec<SessionState>,
    /// True if the dialogue ended over TLS.
    pub encrypted: bool,
}

impl Outcome {
    /// Returns true if the message was accepted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Returns the failure kind, if any.
    #[must_use]
    pub fn cause(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|failure| failure.kind)
    }

    /// Returns true if retrying later may succeed: network trouble or a 4xx
    /// reply.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self.cause() {
            None => false,
            Some(FailureKind::ConnectionFailed | FailureKind::TransportError) => true,
            Some(_) => self
                .last_reply
                .as_ref()
                .is_some_and(Reply::is_transient_error),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(f, "sent"),
            Some(failure) => write!(f, "failed: {failure}"),
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
    use crate::types::ReplyCode;

    fn failed(kind: FailureKind, code: Option<u16>) -> Outcome {
        Outcome {
            stage: SessionState::SenderAccepted,
            last_reply: code.map(|c| Reply::new(ReplyCode::new(c), vec!["x".into()])),
            failure: Some(Failure::new(kind, SessionState::SenderAccepted, "x")),
            transitions: vec![
                SessionState::Connected,
                SessionState::Greeted,
                SessionState::EhloDone,
                SessionState::SenderAccepted,
                SessionState::Failed,
                SessionState::Closed,
            ],
            encrypted: false,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(failed(FailureKind::RecipientRejected, Some(450)).is_transient());
        assert!(!failed(FailureKind::RecipientRejected, Some(550)).is_transient());
        assert!(failed(FailureKind::TransportError, None).is_transient());
        assert!(failed(FailureKind::ConnectionFailed, None).is_transient());
        assert!(!failed(FailureKind::AuthUnsupported, None).is_transient());
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure::new(
            FailureKind::AuthRejected,
            SessionState::TlsUpgraded,
            "535 bad credentials",
        );
        assert_eq!(
            failure.to_string(),
            "AuthRejected at TlsUpgraded: 535 bad credentials"
        );
    }

    #[test]
    fn test_cause() {
        let outcome = failed(FailureKind::RecipientRejected, Some(550));
        assert!(!outcome.is_success());
        assert_eq!(outcome.cause(), Some(FailureKind::RecipientRejected));
        assert!(outcome.to_string().starts_with("failed: RecipientRejected"));
    }
}
