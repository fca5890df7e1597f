//! Reply generation: turns a matched rule into a complete outbound message.

use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{Attachment as AttachmentPart, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use log::debug;
use std::fs;
use std::path::Path;

use crate::config::ReplyRule;
use crate::error::ReplyError;
use crate::logging::LogContext;
use crate::message::InboundMessage;
use crate::render::{self, Bindings, ORIGINAL_DESTINATION, ORIGINAL_SUBJECT};

/// Headers marking a reply as automatic, so other responders stay quiet.
pub const ANTI_LOOP_HEADERS: [(&str, &str); 4] = [
    ("Auto-Submitted", "auto-replied"),
    ("X-Autoreply", "yes"),
    ("X-Auto-Response-Suppress", "All"),
    ("Precedence", "auto_reply"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Replies to real mail carry the anti-loop headers.
    Live,
    /// Sample messages written by `-t` are bare.
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub maintype: String,
    pub subtype: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutboundReply {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub reply_to: Option<String>,
    pub body: String,
    pub html: bool,
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub headers: Vec<(&'static str, String)>,
    pub attachment: Option<Attachment>,
}

impl OutboundReply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Builds the wire message.
    pub fn to_message(&self) -> Result<Message, ReplyError> {
        let mut builder = Message::builder()
            .message_id(Some(self.message_id.clone()))
            .from(mailbox("From", &self.from)?)
            .to(mailbox("To", &self.to)?)
            .subject(self.subject.clone());

        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(mailbox("Reply-To", reply_to)?);
        }
        if let Some(id) = &self.in_reply_to {
            builder = builder
                .in_reply_to(id.clone())
                .references(id.clone());
        }
        for (name, value) in &self.headers {
            builder = builder.raw_header(HeaderValue::new(
                HeaderName::new_from_ascii_str(*name),
                value.clone(),
            ));
        }

        let content_type = if self.html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };
        let body = SinglePart::builder()
            .header(content_type)
            .body(self.body.clone());

        let message = match &self.attachment {
            Some(att) => {
                let mime = format!("{}/{}", att.maintype, att.subtype);
                let content_type =
                    ContentType::parse(&mime).map_err(|_| ReplyError::ContentType(mime))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(body)
                        .singlepart(
                            AttachmentPart::new(att.filename.clone())
                                .body(att.data.clone(), content_type),
                        ),
                )?
            }
            None => builder.singlepart(body)?,
        };
        Ok(message)
    }
}

fn mailbox(field: &'static str, value: &str) -> Result<Mailbox, ReplyError> {
    value.parse().map_err(|source| ReplyError::Address {
        field,
        value: value.to_string(),
        source,
    })
}

/// `<uuid@domain>`, with the domain taken from the From address.
fn new_message_id(from: &str) -> String {
    let domain = from
        .parse::<Mailbox>()
        .map(|mb| mb.email.domain().to_string())
        .unwrap_or_else(|_| "localhost".to_string());
    format!("<{}@{}>", uuid::Uuid::new_v4(), domain)
}

/// MIME type for an attachment, by file extension.
pub fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "txt" | "text" => "text/plain",
        "htm" | "html" => "text/html",
        "csv" => "text/csv",
        "ics" => "text/calendar",
        "vcf" => "text/vcard",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "odt" => "application/vnd.oasis.opendocument.text",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    Some(mime)
}

fn load_attachment(path: &Path) -> Result<Attachment, ReplyError> {
    let mime = guess_mime(path).ok_or_else(|| ReplyError::UnknownMimeType(path.to_path_buf()))?;
    let (maintype, subtype) = mime
        .split_once('/')
        .ok_or_else(|| ReplyError::UnknownMimeType(path.to_path_buf()))?;
    let data = fs::read(path).map_err(|source| ReplyError::Attachment {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    debug!(
        "[reply] attaching {} ({}/{}, {} bytes)",
        filename,
        maintype,
        subtype,
        data.len()
    );
    Ok(Attachment {
        filename,
        maintype: maintype.to_string(),
        subtype: subtype.to_string(),
        data,
    })
}

pub struct Generator<'a> {
    log: &'a LogContext,
    mode: Mode,
}

impl<'a> Generator<'a> {
    pub fn new(log: &'a LogContext, mode: Mode) -> Self {
        Self { log, mode }
    }

    pub fn generate(
        &self,
        rule: &ReplyRule,
        address: &str,
        inbound: &InboundMessage,
    ) -> Result<OutboundReply, ReplyError> {
        let original_subject = inbound.subject().unwrap_or("");
        let bindings: Bindings = [
            (ORIGINAL_SUBJECT, original_subject),
            (ORIGINAL_DESTINATION, address),
        ]
        .into_iter()
        .collect();

        let subject = render::render(&rule.subject, &bindings);
        let body = if rule.html {
            match render::load_html(Path::new(&rule.body)) {
                Ok(template) => render::render(&template, &bindings),
                Err(e) => {
                    self.log
                        .failure(&format!("[reply] {}, sending empty body for {}", e, address));
                    String::new()
                }
            }
        } else {
            render::render(&rule.body, &bindings)
        };

        let attachment = rule
            .attachment
            .as_deref()
            .map(load_attachment)
            .transpose()?;

        // Rules without a From answer as the address that was written to.
        let from = rule.from.clone().unwrap_or_else(|| address.to_string());
        let reply_to = Some(rule.reply_to.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let (in_reply_to, headers): (Option<String>, Vec<(&'static str, String)>) = match self.mode {
            Mode::Live => (
                inbound.message_id.clone(),
                ANTI_LOOP_HEADERS
                    .iter()
                    .map(|(name, value)| (*name, value.to_string()))
                    .collect(),
            ),
            Mode::Test => (None, Vec::new()),
        };

        let reply = OutboundReply {
            message_id: new_message_id(&from),
            from,
            to: inbound.sender.clone(),
            subject,
            reply_to,
            body,
            html: rule.html,
            in_reply_to,
            headers,
            attachment,
        };
        self.log.detail(&format!(
            "[reply] generated {} from {} to {}",
            reply.message_id, reply.from, reply.to
        ));
        Ok(reply)
    }
}
