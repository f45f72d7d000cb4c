//! # postwire-smtp
//!
//! SMTP submission engine implementing the RFC 5321 subset transactional
//! mail needs: EHLO, STARTTLS, AUTH LOGIN, MAIL/RCPT/DATA and QUIT.
//!
//! ## Features
//!
//! - **Explicit state machine**: every send walks the same ordered states and
//!   reports where it stopped
//! - **TLS**: implicit TLS (port 465) and STARTTLS via rustls, with an
//!   opt-in insecure fallback
//! - **Structured outcome**: rejections are data, not errors
//! - **Strict replies**: malformed server lines are rejected, never guessed at
//!
//! ## Quick Start
//!
//! ```ignore
//! use postwire_mime::{Mailbox, MessageBuilder};
//! use postwire_smtp::{Address, Config, Envelope, Security, SmtpSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::builder("smtp.example.com")
//!         .security(Security::StartTls)
//!         .credentials("user@example.com", "app-password")
//!         .build();
//!     let session = SmtpSession::new(config)?;
//!
//!     let from = Mailbox::new("user@example.com")?;
//!     let to = Mailbox::new("customer@example.org")?;
//!     let message = MessageBuilder::new()
//!         .from(from.clone())
//!         .to(to.clone())
//!         .subject("Hello")
//!         .html_body("<p>Hello!</p>")
//!         .build()?;
//!
//!     let envelope = Envelope::single(Address::from(&from), Address::from(&to));
//!     let outcome = session.send(&envelope, &message).await;
//!     if let Some(failure) = &outcome.failure {
//!         eprintln!("not sent: {failure}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! Connected → Greeted → EhloDone → [TlsUpgraded] → [Authenticated]
//!   → SenderAccepted → RecipientAccepted → DataAccepted → Sent → Closed
//!                    (any step) → Failed → Closed
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Configuration, connectors, transport and reply reading
//! - [`parser`]: Reply line tokenizer
//! - [`session`]: The state machine and its outcome
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod session;
pub mod types;

pub use connection::{
    Config, ConfigBuilder, Connector, Credentials, Security, ServerInfo, TcpConnector,
};
pub use error::{Error, Result};
pub use session::{Failure, FailureKind, Outcome, SessionState, SmtpSession};
pub use types::{Address, AuthMechanism, Envelope, Extension, Reply, ReplyCode, Severity};
