use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use serde::Serialize;

use crate::gmail::types::MessagePart;

/// One mailbox from an address header, e.g. `"Doe, Jane" <jane@example.com>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mailbox {
    pub email: String,
    pub name: Option<String>,
}

impl Mailbox {
    pub fn new(name: Option<impl Into<String>>, email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.map(Into::into),
        }
    }

    pub fn parse(input: &str) -> Option<Mailbox> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if let (Some(start), Some(end)) = (input.find('<'), input.rfind('>')) {
            if start < end {
                let email = input[start + 1..end].trim();
                if email.is_empty() {
                    return None;
                }
                let display = input[..start].trim();
                let name = (!display.is_empty()).then(|| unquote(display));
                return Some(Mailbox {
                    email: email.to_string(),
                    name,
                });
            }
        }

        let bare = input.trim_matches(|c| c == '<' || c == '>').trim();
        if bare.is_empty() || !bare.contains('@') {
            return None;
        }
        Some(Mailbox {
            email: bare.to_string(),
            name: None,
        })
    }
}

/// Parses a comma-separated address list. Commas inside quoted display names
/// do not split entries; unparseable entries are dropped.
pub fn parse_mailbox_list(input: &str) -> Vec<Mailbox> {
    split_address_list(input)
        .iter()
        .filter_map(|entry| Mailbox::parse(entry))
        .collect()
}

fn split_address_list(input: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in input.chars() {
        match ch {
            '"' if !escaped => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                if !current.trim().is_empty() {
                    entries.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
        escaped = ch == '\\' && !escaped;
    }

    if !current.trim().is_empty() {
        entries.push(current.trim().to_string());
    }
    entries
}

fn unquote(input: &str) -> String {
    input
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(input)
        .replace("\\\"", "\"")
}

const MAX_PART_DEPTH: usize = 32;

/// Decoded text bodies found in a message part tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextBodies {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl TextBodies {
    pub fn is_empty(&self) -> bool {
        self.plain.is_none() && self.html.is_none()
    }
}

/// Walks the part tree and decodes the first `text/plain` and `text/html`
/// bodies.
pub fn extract_text_bodies(root: &MessagePart) -> TextBodies {
    let mut bodies = TextBodies::default();
    collect_bodies(root, &mut bodies, 0);
    bodies
}

fn collect_bodies(part: &MessagePart, bodies: &mut TextBodies, depth: usize) {
    if depth > MAX_PART_DEPTH {
        return;
    }

    let data = part.body.as_ref().and_then(|b| b.data.as_deref());
    if let (Some(mime), Some(data)) = (part.mime_type.as_deref(), data) {
        let slot = if mime.eq_ignore_ascii_case("text/plain") {
            Some(&mut bodies.plain)
        } else if mime.eq_ignore_ascii_case("text/html") {
            Some(&mut bodies.html)
        } else {
            None
        };
        if let Some(slot) = slot {
            if slot.is_none() {
                *slot = decode_body_data(data);
            }
        }
    }

    for child in &part.parts {
        collect_bodies(child, bodies, depth + 1);
    }
}

/// Gmail body data is base64url; some producers pad it or use the standard
/// alphabet.
pub fn decode_body_data(data: &str) -> Option<String> {
    [&URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD]
        .iter()
        .find_map(|engine| engine.decode(data).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
