//! Message builder for transactional email.

use crate::boundary::{Boundary, random_token};
use crate::content_type::ContentType;
use crate::encoding::{encode_rfc2047, fold_header};
use crate::error::{Error, Result};
use crate::header::Headers;
use crate::mailbox::Mailbox;
use crate::message::{Message, Part};
use chrono::{DateTime, FixedOffset, Local};

/// Builds a [`Message`].
///
/// With both bodies set the result is `multipart/alternative` (plain text
/// first, HTML second). With only HTML, the plain-text alternative is
/// derived from it. With only text, the message is single-part
/// `text/plain`.
///
/// ```
/// use postwire_mime::{Mailbox, MessageBuilder};
///
/// let message = MessageBuilder::new()
///     .from(Mailbox::with_name("Review Desk", "desk@example.com")?)
///     .to(Mailbox::new("owner@example.com")?)
///     .subject("New review received")
///     .text_body("You have a new 5-star review.")
///     .html_body("<p>You have a new <b>5-star</b> review.</p>")
///     .build()?;
///
/// assert!(message.boundary().is_some());
/// # Ok::<(), postwire_mime::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<Mailbox>,
    to: Vec<Mailbox>,
    reply_to: Option<Mailbox>,
    subject: String,
    text_body: Option<String>,
    html_body: Option<String>,
    date: Option<DateTime<FixedOffset>>,
    extra_headers: Vec<(String, String)>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender.
    #[must_use]
    pub fn from(mut self, from: Mailbox) -> Self {
        self.from = Some(from);
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, to: Mailbox) -> Self {
        self.to.push(to);
        self
    }

    /// Sets the `Reply-To` mailbox.
    #[must_use]
    pub fn reply_to(mut self, reply_to: Mailbox) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the plain-text body.
    #[must_use]
    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text_body = Some(text.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    /// Overrides the `Date` header (defaults to now, local time).
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Adds an extra header, e.g. `X-Mailer`.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Builds the message.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender, recipients or body are missing, or if
    /// a header value would break the header block.
    pub fn build(self) -> Result<Message> {
        let from = self.from.ok_or(Error::MissingField("from"))?;
        if self.to.is_empty() {
            return Err(Error::MissingField("to"));
        }
        // Encoding would hide a line break instead of rejecting it.
        if self.subject.contains(['\r', '\n']) {
            return Err(Error::InvalidHeader("Subject contains a line break".into()));
        }

        let text_body = match (self.text_body, &self.html_body) {
            (Some(text), _) => text,
            (None, Some(html)) => html_to_text(html),
            (None, None) => return Err(Error::MissingBody),
        };

        let mut headers = Headers::new();
        let date = self.date.unwrap_or_else(|| Local::now().fixed_offset());
        headers.add("Date", date.to_rfc2822())?;
        add_folded(&mut headers, "From", &from.to_header_value())?;
        add_folded(
            &mut headers,
            "To",
            &self
                .to
                .iter()
                .map(Mailbox::to_header_value)
                .collect::<Vec<_>>()
                .join(", "),
        )?;
        if let Some(reply_to) = &self.reply_to {
            add_folded(&mut headers, "Reply-To", &reply_to.to_header_value())?;
        }
        add_folded(&mut headers, "Subject", &encode_rfc2047(&self.subject))?;
        headers.add(
            "Message-ID",
            format!("<{}@{}>", random_token(24), from.domain()),
        )?;
        for (name, value) in self.extra_headers {
            headers.add(name, value)?;
        }
        headers.add("MIME-Version", "1.0")?;

        let (boundary, parts) = match &self.html_body {
            None => {
                let part = Part::text(&text_body, ContentType::text_plain());
                headers.add("Content-Type", part.content_type.to_string())?;
                headers.add("Content-Transfer-Encoding", part.transfer_encoding.to_string())?;
                (None, vec![part])
            }
            Some(html) => {
                let parts = vec![
                    Part::text(&text_body, ContentType::text_plain()),
                    Part::text(html, ContentType::text_html()),
                ];
                let boundary = Boundary::generate_avoiding(&[
                    &text_body,
                    html,
                    &parts[0].body,
                    &parts[1].body,
                ]);
                headers.add(
                    "Content-Type",
                    ContentType::multipart_alternative(boundary.as_str()).to_string(),
                )?;
                (Some(boundary), parts)
            }
        };

        Ok(Message {
            headers,
            subject: self.subject,
            text_body,
            html_body: self.html_body,
            boundary,
            parts,
        })
    }
}

fn add_folded(headers: &mut Headers, name: &str, value: &str) -> Result<()> {
    headers.add(name, fold_header(name.len() + 2, value))
}

/// Derives a plain-text alternative from HTML (rendered as Markdown).
#[must_use]
pub fn html_to_text(html: &str) -> String {
    htmd::convert(html).map_or_else(|_| html.to_string(), |text| text.trim().to_string())
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
    use proptest::prelude::*;

    fn base() -> MessageBuilder {
        MessageBuilder::new()
            .from(Mailbox::with_name("Review Desk", "desk@example.com").unwrap())
            .to(Mailbox::new("owner@example.com").unwrap())
            .subject("Weekly summary")
    }

    fn wire(message: &Message) -> String {
        String::from_utf8(message.to_bytes()).unwrap()
    }

    #[test]
    fn test_multipart_alternative_layout() {
        let message = base()
            .text_body("Plain version")
            .html_body("<p>HTML version</p>")
            .build()
            .unwrap();
        let boundary = message.boundary().unwrap().clone();
        let text = wire(&message);

        let (head, body) = text.split_once("\r\n\r\n").unwrap();
        assert!(head.contains("From: Review Desk <desk@example.com>"));
        assert!(head.contains("To: owner@example.com"));
        assert!(head.contains("Subject: Weekly summary"));
        assert!(head.contains("MIME-Version: 1.0"));
        assert!(head.contains("Date: "));
        assert!(head.contains("Message-ID: <"));
        assert!(head.contains(&format!(
            "Content-Type: multipart/alternative; boundary=\"{boundary}\""
        )));

        let expected_body = format!(
            "--{boundary}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Content-Transfer-Encoding: 7bit\r\n\r\n\
             Plain version\r\n\
             --{boundary}\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             Content-Transfer-Encoding: 7bit\r\n\r\n\
             <p>HTML version</p>\r\n\
             --{boundary}--\r\n"
        );
        assert_eq!(body, expected_body);
    }

    #[test]
    fn test_text_only_is_single_part() {
        let message = base().text_body("Just text").build().unwrap();
        assert!(message.boundary().is_none());
        let text = wire(&message);
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.contains("Content-Transfer-Encoding: 7bit\r\n"));
        assert!(text.ends_with("\r\n\r\nJust text"));
    }

    #[test]
    fn test_html_only_derives_text() {
        let message = base()
            .html_body("<h1>Welcome</h1><p>Thanks for joining.</p>")
            .build()
            .unwrap();
        assert!(message.boundary().is_some());
        assert!(message.text_body().contains("Welcome"));
        assert!(message.text_body().contains("Thanks for joining."));
        assert!(!message.text_body().contains("<p>"));
    }

    #[test]
    fn test_missing_fields() {
        let err = MessageBuilder::new()
            .to(Mailbox::new("a@example.com").unwrap())
            .text_body("x")
            .build()
            .unwrap_err();
        assert_eq!(err, Error::MissingField("from"));

        let err = MessageBuilder::new()
            .from(Mailbox::new("a@example.com").unwrap())
            .text_body("x")
            .build()
            .unwrap_err();
        assert_eq!(err, Error::MissingField("to"));

        assert_eq!(base().build().unwrap_err(), Error::MissingBody);
    }

    #[test]
    fn test_reply_to_and_extra_headers() {
        let message = base()
            .reply_to(Mailbox::new("support@example.com").unwrap())
            .header("X-Mailer", "postwire")
            .text_body("x")
            .build()
            .unwrap();
        assert_eq!(message.headers().get("Reply-To"), Some("support@example.com"));
        assert_eq!(message.headers().get("X-Mailer"), Some("postwire"));
    }

    #[test]
    fn test_subject_injection_rejected() {
        let result = base()
            .subject("Hello\r\nBcc: everyone@example.com")
            .text_body("x")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_header_lines_stay_within_limit() {
        let mut builder = base()
            .subject("x".repeat(1200))
            .text_body("x");
        for i in 0..40 {
            let mailbox =
                Mailbox::with_name(format!("Recipient {i}"), format!("user{i}@example.org"));
            builder = builder.to(mailbox.unwrap());
        }
        let message = builder.build().unwrap();
        let text = wire(&message);

        for line in text.split("\r\n") {
            assert!(line.len() <= 998, "line of {} bytes", line.len());
        }
        let to = message.headers().get("To").unwrap();
        assert!(to.contains("\r\n "));
        assert!(to.replace("\r\n", "").contains("Recipient 39 <user39@example.org>"));
    }

    #[test]
    fn test_long_ascii_subject_is_folded() {
        let subject = "Your weekly summary of reviews ".repeat(10).trim_end().to_string();
        let message = base().subject(subject.clone()).text_body("x").build().unwrap();

        let folded = message.headers().get("Subject").unwrap();
        assert!(folded.contains("\r\n "));
        assert_eq!(folded.replace("\r\n", ""), subject);
        let head = wire(&message);
        let head = head.split_once("\r\n\r\n").unwrap().0;
        for line in head.split("\r\n") {
            assert!(line.len() <= 78, "{line:?}");
        }
    }

    #[test]
    fn test_non_ascii_subject_encoded() {
        let message = base().subject("Résumé").text_body("x").build().unwrap();
        assert_eq!(message.headers().get("Subject"), Some("=?utf-8?B?UsOpc3Vtw6k=?="));
        assert_eq!(message.subject(), "Résumé");
    }

    #[test]
    fn test_fixed_date() {
        let date = DateTime::parse_from_rfc2822("Tue, 1 Jul 2025 10:52:37 +0200").unwrap();
        let message = base().date(date).text_body("x").build().unwrap();
        assert_eq!(
            message.headers().get("Date"),
            Some("Tue, 1 Jul 2025 10:52:37 +0200")
        );
    }

    #[test]
    fn test_message_id_uses_sender_domain() {
        let message = base().text_body("x").build().unwrap();
        let id = message.headers().get("Message-ID").unwrap();
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.com>"));
    }

    #[test]
    fn test_data_payload_dot_stuffed() {
        let message = base()
            .text_body("line one\n.\n.leading dot\nlast")
            .html_body("<p>.</p>")
            .build()
            .unwrap();
        let payload = String::from_utf8(message.data_payload()).unwrap();

        assert!(payload.contains("\r\n..\r\n"));
        assert!(payload.contains("\r\n..leading dot\r\n"));
        assert!(!payload.split("\r\n").any(|line| line == "."));
        assert!(payload.ends_with("\r\n"));
    }

    #[test]
    fn test_data_payload_single_part_ends_with_crlf() {
        let message = base().text_body("no trailing newline").build().unwrap();
        assert!(message.data_payload().ends_with(b"no trailing newline\r\n"));
    }

    proptest! {
        #[test]
        fn boundary_only_at_separators(text in "[ -~\n]{0,200}", html in "[ -~\n]{0,200}") {
            let message = base().text_body(text.clone()).html_body(html.clone()).build().unwrap();
            let boundary = message.boundary().unwrap().as_str().to_string();
            let wire = String::from_utf8(message.to_bytes()).unwrap();

            prop_assert!(!text.contains(&boundary));
            prop_assert!(!html.contains(&boundary));
            // Content-Type parameter, two part delimiters and the close delimiter.
            prop_assert_eq!(wire.matches(&boundary).count(), 4);

            let again = base().text_body(text).html_body(html).build().unwrap();
            prop_assert_ne!(again.boundary().unwrap().as_str(), boundary.as_str());
        }

        #[test]
        fn payload_never_ends_data_early(lines in proptest::collection::vec("[.a-z]{0,4}", 1..12)) {
            let body = lines.join("\n");
            let message = base().text_body(body).build().unwrap();
            let payload = String::from_utf8(message.data_payload()).unwrap();
            prop_assert!(!payload.split("\r\n").any(|line| line == "."));
        }
    }
}
