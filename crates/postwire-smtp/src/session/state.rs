//! Session states.

use std::fmt;

/// Progress of one send, in protocol order.
///
/// States only move forward. `Failed` is entered from any state on the
/// first unexpected reply or transport error; `Closed` is always last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// TCP (or implicit TLS) connection established.
    Connected,
    /// `220` greeting received.
    Greeted,
    /// EHLO accepted, capabilities known.
    EhloDone,
    /// STARTTLS handshake done and EHLO repeated.
    TlsUpgraded,
    /// AUTH LOGIN accepted.
    Authenticated,
    /// `MAIL FROM` accepted.
    SenderAccepted,
    /// Every `RCPT TO` accepted.
    RecipientAccepted,
    /// `354` received, message may be sent.
    DataAccepted,
    /// Message accepted for delivery.
    Sent,
    /// Aborted.
    Failed,
    /// Stream closed.
    Closed,
}

impl SessionState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Greeted => "Greeted",
            Self::EhloDone => "EhloDone",
            Self::TlsUpgraded => "TlsUpgraded",
            Self::Authenticated => "Authenticated",
            Self::SenderAccepted => "SenderAccepted",
            Self::RecipientAccepted => "RecipientAccepted",
            Self::DataAccepted => "DataAccepted",
            Self::Sent => "Sent",
            Self::Failed => "Failed",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
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
    fn test_protocol_order() {
        assert!(SessionState::Connected < SessionState::Greeted);
        assert!(SessionState::TlsUpgraded < SessionState::Authenticated);
        assert!(SessionState::DataAccepted < SessionState::Sent);
        assert!(SessionState::Sent < SessionState::Failed);
        assert!(SessionState::Failed < SessionState::Closed);
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::RecipientAccepted.to_string(), "RecipientAccepted");
    }
}
