//! Services that turn application requests into delivered mail.

pub mod mailer;
pub mod templates;

pub use mailer::{Mailer, OutgoingEmail};
