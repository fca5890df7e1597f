//! The inbound message as handed over by the MTA.

use log::{debug, warn};
use std::collections::HashMap;

/// Case-insensitive header lookup. The first occurrence of a header wins;
/// repeated headers are only interesting for presence checks.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    headers: HashMap<String, String>,
}

impl HeaderMap {
    /// Parses the header block of a raw RFC 5322 message. A header block
    /// that cannot be parsed yields an empty map.
    pub fn parse(raw: &[u8]) -> Self {
        let mut map = Self::default();
        match mailparse::parse_headers(raw) {
            Ok((headers, _)) => {
                for header in headers {
                    map.insert(&header.get_key(), header.get_value());
                }
            }
            Err(e) => {
                warn!("[message] failed to parse headers, treating as empty: {}", e);
            }
        }
        debug!("[message] parsed {} distinct header(s)", map.headers.len());
        map
    }

    pub fn insert(&mut self, name: &str, value: String) {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_insert(value);
    }

    /// `None` when the header is absent; `Some("")` when present but empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut map = Self::default();
        for (name, value) in iter {
            map.insert(name, value.to_string());
        }
        map
    }
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender: String,
    pub recipients: Vec<String>,
    /// Exactly the bytes read from stdin.
    pub raw: Vec<u8>,
    pub headers: HeaderMap,
    pub message_id: Option<String>,
}

impl InboundMessage {
    pub fn new(sender: String, recipients: Vec<String>, raw: Vec<u8>) -> Self {
        let headers = HeaderMap::parse(&raw);
        let message_id = headers.get("Message-ID").and_then(sanitize_message_id);
        Self {
            sender,
            recipients,
            raw,
            headers,
            message_id,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        self.headers.get("Subject")
    }
}

/// Strips all whitespace (folded header lines included). Empty means absent.
fn sanitize_message_id(value: &str) -> Option<String> {
    let id: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
