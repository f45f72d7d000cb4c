//! SMTP extension types.

/// SMTP extensions discovered from EHLO response.
///
/// Only the extensions the session acts on are decoded; everything else
/// is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS - TLS upgrade
    StartTls,
    /// AUTH - Authentication, with the mechanisms this crate recognizes
    Auth(Vec<AuthMechanism>),
    /// Any other extension line
    Other(String),
}

impl Extension {
    /// Parses an extension line from EHLO response.
    ///
    /// Accepts the obsolete `AUTH=LOGIN PLAIN` form some servers still send.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Self::Other(line.to_string());
        };

        let keyword = keyword.to_uppercase();
        match keyword.as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(parts.filter_map(AuthMechanism::parse).collect()),
            _ => match keyword.strip_prefix("AUTH=") {
                Some(first) => Self::Auth(
                    std::iter::once(first)
                        .chain(parts)
                        .filter_map(AuthMechanism::parse)
                        .collect(),
                ),
                None => Self::Other(line.to_string()),
            },
        }
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext, the mechanism this crate speaks
    Login,
    /// CRAM-MD5 - challenge-response
    CramMd5,
    /// `XOAUTH2` - `OAuth2` (Google/Microsoft)
    XOAuth2,
    /// `OAUTHBEARER` - RFC 7628 `OAuth2`
    OAuthBearer,
}

impl AuthMechanism {
    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "CRAM-MD5" => Some(Self::CramMd5),
            "XOAUTH2" => Some(Self::XOAuth2),
            "OAUTHBEARER" => Some(Self::OAuthBearer),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
            Self::XOAuth2 => "XOAUTH2",
            Self::OAuthBearer => "OAUTHBEARER",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn parse_starttls() {
        assert_eq!(Extension::parse("STARTTLS"), Extension::StartTls);
        assert_eq!(Extension::parse("starttls"), Extension::StartTls);
    }

    #[test]
    fn parse_auth_mechanisms() {
        assert_eq!(
            Extension::parse("AUTH PLAIN LOGIN XOAUTH2"),
            Extension::Auth(vec![
                AuthMechanism::Plain,
                AuthMechanism::Login,
                AuthMechanism::XOAuth2
            ])
        );
    }

    #[test]
    fn parse_auth_skips_unknown_mechanisms() {
        assert_eq!(
            Extension::parse("AUTH GSSAPI NTLM"),
            Extension::Auth(vec![])
        );
    }

    #[test]
    fn parse_obsolete_auth_form() {
        assert_eq!(
            Extension::parse("AUTH=LOGIN PLAIN"),
            Extension::Auth(vec![AuthMechanism::Login, AuthMechanism::Plain])
        );
    }

    #[test]
    fn parse_other() {
        assert_eq!(
            Extension::parse("SIZE 35882577"),
            Extension::Other("SIZE 35882577".to_string())
        );
        assert!(matches!(Extension::parse(""), Extension::Other(_)));
    }

    #[test]
    fn auth_mechanism_names() {
        assert_eq!(AuthMechanism::parse("login"), Some(AuthMechanism::Login));
        assert_eq!(AuthMechanism::parse("CRAM-MD5"), Some(AuthMechanism::CramMd5));
        assert_eq!(AuthMechanism::parse("UNKNOWN"), None);
        assert_eq!(AuthMechanism::Login.as_str(), "LOGIN");
        assert_eq!(AuthMechanism::OAuthBearer.as_str(), "OAUTHBEARER");
    }
}
