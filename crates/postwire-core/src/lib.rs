//! # postwire-core
//!
//! Application-facing mail service for postwire.
//!
//! This crate provides:
//! - Settings loaded from the environment or JSON ([`MailerSettings`])
//! - A [`Mailer`] bound to one SMTP server and sender
//! - Verification-code and notification templates
//!
//! ```ignore
//! use postwire_core::{Mailer, MailerSettings};
//!
//! let mailer = Mailer::from_settings(&MailerSettings::from_env()?)?;
//! let outcome = mailer.send_otp("customer@example.org", "428913").await?;
//! if !outcome.is_success() {
//!     // retry later if outcome.is_transient()
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod service;

pub use config::{MailerSettings, SecureMode};
pub use error::{Error, Result};
pub use postwire_smtp::{FailureKind, Outcome, SessionState};
pub use service::{Mailer, OutgoingEmail};
