//! # postwire-mime
//!
//! MIME message generation for transactional email.
//!
//! ## Features
//!
//! - **Message building**: `multipart/alternative` with plain-text and HTML parts
//! - **Encoding**: Quoted-Printable bodies, RFC 2047 header words
//! - **Boundaries**: CSPRNG tokens checked against the encoded bodies
//! - **SMTP payload**: CRLF line endings and dot-stuffing for the `DATA` phase
//!
//! ## Quick Start
//!
//! ```
//! use postwire_mime::{Mailbox, MessageBuilder};
//!
//! let message = MessageBuilder::new()
//!     .from("noreply@example.com".parse()?)
//!     .to(Mailbox::new("user@example.com")?)
//!     .subject("Your sign-in code")
//!     .text_body("Your code is 428913")
//!     .html_body("<p>Your code is <b>428913</b></p>")
//!     .build()?;
//!
//! let payload = message.data_payload();
//! assert!(payload.ends_with(b"\r\n"));
//! # Ok::<(), postwire_mime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod boundary;
mod builder;
mod content_type;
mod error;
mod header;
mod mailbox;
mod message;

pub mod encoding;

pub use boundary::Boundary;
pub use builder::{MessageBuilder, html_to_text};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use mailbox::{Mailbox, validate_addr_spec};
pub use message::{Message, Part, TransferEncoding};
