use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use mail_builder::MessageBuilder;
use mail_builder::headers::address::Address;
use mail_builder::headers::message_id::MessageId;
use thiserror::Error;

use crate::gmail::address::Mailbox;

/// MIME subtype of an outgoing single-part body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyFormat {
    #[default]
    Plain,
    Html,
}

impl BodyFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyFormat::Plain => "plain",
            BodyFormat::Html => "html",
        }
    }
}

impl fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BodyFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(BodyFormat::Plain),
            "html" => Ok(BodyFormat::Html),
            other => Err(format!(
                "unsupported body format `{other}` (expected plain or html)"
            )),
        }
    }
}

/// An outgoing message before it is rendered to RFC 5322.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Left unset, Gmail fills in the authenticated account.
    pub from: Option<Mailbox>,
    pub to: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,
    pub bcc: Vec<Mailbox>,
    pub subject: String,
    pub body: String,
    pub format: BodyFormat,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
}

#[derive(Debug, Error)]
pub enum MimeBuildError {
    #[error("at least one recipient is required")]
    MissingRecipients,
    #[error("failed to build message: {0}")]
    Io(#[from] std::io::Error),
}

impl OutgoingMessage {
    pub fn to_rfc5322(&self) -> Result<String, MimeBuildError> {
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(MimeBuildError::MissingRecipients);
        }

        let mut builder = MessageBuilder::new().subject(self.subject.as_str());
        if let Some(from) = &self.from {
            builder = builder.from(header_address(from));
        }
        if !self.to.is_empty() {
            builder = builder.to(address_list(&self.to));
        }
        if !self.cc.is_empty() {
            builder = builder.cc(address_list(&self.cc));
        }
        if !self.bcc.is_empty() {
            builder = builder.bcc(address_list(&self.bcc));
        }

        let in_reply_to = self.in_reply_to.as_deref().and_then(normalize_message_id);
        if let Some(id) = &in_reply_to {
            builder = builder.in_reply_to(MessageId::new(id.clone()));
        }
        let references = reference_chain(&self.references, in_reply_to.as_deref());
        if !references.is_empty() {
            builder = builder.references(MessageId::from(references));
        }

        builder = match self.format {
            BodyFormat::Plain => builder.text_body(self.body.as_str()),
            BodyFormat::Html => builder.html_body(self.body.as_str()),
        };

        builder.write_to_string().map_err(MimeBuildError::Io)
    }

    /// Renders the message and encodes it for the `raw` field of
    /// `users.messages.send`.
    pub fn to_base64_url(&self) -> Result<String, MimeBuildError> {
        let rendered = self.to_rfc5322()?;
        Ok(URL_SAFE_NO_PAD.encode(rendered.as_bytes()))
    }
}

fn header_address(mailbox: &Mailbox) -> Address<'static> {
    Address::new_address(mailbox.name.clone(), mailbox.email.clone())
}

fn address_list(mailboxes: &[Mailbox]) -> Address<'static> {
    Address::new_list(mailboxes.iter().map(header_address).collect())
}

/// Strips whitespace and angle brackets; `None` when nothing is left.
pub fn normalize_message_id(id: &str) -> Option<String> {
    let trimmed = id.trim().trim_start_matches('<').trim_end_matches('>').trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Prior chain followed by the message being answered, normalized and
/// deduplicated with first occurrence kept.
pub fn reference_chain(prior: &[String], in_reply_to: Option<&str>) -> Vec<String> {
    let mut chain: Vec<String> = Vec::with_capacity(prior.len() + 1);
    for id in prior.iter().map(String::as_str).chain(in_reply_to) {
        if let Some(normalized) = normalize_message_id(id) {
            if !chain.contains(&normalized) {
                chain.push(normalized);
            }
        }
    }
    chain
}

/// Splits a `References` header value into individual ids.
pub fn split_references(header: &str) -> Vec<String> {
    header
        .split_whitespace()
        .filter_map(normalize_message_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(encoded: &str) -> String {
        let bytes = URL_SAFE_NO_PAD.decode(encoded).expect("decode base64");
        String::from_utf8(bytes).expect("utf8")
    }

    #[test]
    fn renders_addressing_headers_and_plain_body() {
        let message = OutgoingMessage {
            to: vec![
                Mailbox::new(Some("Doe, Jane"), "jane@example.com"),
                Mailbox::new(None::<String>, "bob@example.com"),
            ],
            cc: vec![Mailbox::new(None::<String>, "cc@example.com")],
            bcc: vec![Mailbox::new(None::<String>, "hidden@example.com")],
            subject: "Status".into(),
            body: "All good".into(),
            ..Default::default()
        };

        let raw = decode(&message.to_base64_url().expect("build"));
        assert!(raw.contains("jane@example.com"));
        assert!(raw.contains("bob@example.com"));
        assert!(raw.contains("cc@example.com"));
        assert!(raw.contains("hidden@example.com"));
        assert!(raw.contains("Subject: Status"));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("All good"));
        assert!(!raw.contains("In-Reply-To"));
    }

    #[test]
    fn html_format_sets_html_content_type() {
        let message = OutgoingMessage {
            to: vec![Mailbox::new(None::<String>, "to@example.com")],
            subject: "Hi".into(),
            body: "<p>Hello</p>".into(),
            format: BodyFormat::Html,
            ..Default::default()
        };

        let raw = message.to_rfc5322().expect("build");
        assert!(raw.contains("Content-Type: text/html"));
        assert!(!raw.contains("Content-Type: text/plain"));
    }

    #[test]
    fn threading_headers_include_original_id() {
        let message = OutgoingMessage {
            to: vec![Mailbox::new(None::<String>, "to@example.com")],
            subject: "Re: Hi".into(),
            body: "Thanks".into(),
            in_reply_to: Some("<orig@id>".into()),
            references: vec!["<root@id>".into(), "orig@id".into()],
            ..Default::default()
        };

        let raw = message.to_rfc5322().expect("build");
        assert!(raw.contains("In-Reply-To: <orig@id>"));
        assert!(raw.contains("<root@id>"));
        assert_eq!(raw.matches("<orig@id>").count(), 2);
    }

    #[test]
    fn errors_without_recipients() {
        let message = OutgoingMessage {
            body: "Body".into(),
            ..Default::default()
        };
        let err = message.to_rfc5322().expect_err("should fail");
        assert!(matches!(err, MimeBuildError::MissingRecipients));
    }

    #[test]
    fn reference_chain_appends_and_dedups() {
        assert_eq!(
            reference_chain(&["<a@x>".into(), "b@x".into(), " <a@x> ".into()], Some("<c@x>")),
            vec!["a@x", "b@x", "c@x"]
        );
        assert_eq!(reference_chain(&[], Some("<c@x>")), vec!["c@x"]);
        assert_eq!(reference_chain(&["<c@x>".into()], Some("c@x")), vec!["c@x"]);
        assert!(reference_chain(&["<>".into()], None).is_empty());
    }

    #[test]
    fn splits_references_header() {
        assert_eq!(
            split_references("<a@x>  <b@x>\r\n <c@x>"),
            vec!["a@x", "b@x", "c@x"]
        );
    }

    #[test]
    fn body_format_parses_case_insensitively() {
        assert_eq!("HTML".parse::<BodyFormat>(), Ok(BodyFormat::Html));
        assert_eq!("plain".parse::<BodyFormat>(), Ok(BodyFormat::Plain));
        assert!("markdown".parse::<BodyFormat>().is_err());
    }
}
