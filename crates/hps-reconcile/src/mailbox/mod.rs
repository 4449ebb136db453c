//! Mailbox access: fetching correspondence and flagging it once consumed.
//!
//! Callers depend on [`MailboxGateway`]; [`ImapMailboxClient`] is the production
//! implementation and opens a fresh session for every call.

mod imap;
pub mod mime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use imap::ImapMailboxClient;

/// Stable identifier used to find a message again in a later session.
///
/// Holds the `Message-ID` header when present, otherwise `uid:<n>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn from_uid(uid: u32) -> Self {
        Self(format!("uid:{uid}"))
    }

    pub(crate) fn as_uid(&self) -> Option<u32> {
        self.0.strip_prefix("uid:")?.parse().ok()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Flattened view of one fetched message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub received_at: Option<DateTime<Utc>>,
    pub unread: bool,
    #[serde(skip)]
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    /// Subject and body joined into the text the classifiers search.
    pub fn search_text(&self) -> String {
        format!("{}\n{}", self.subject, self.body)
    }
}

/// Binary part carried by a message; lives only as long as the message.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn is_pdf(&self) -> bool {
        let declared = self
            .content_type
            .parse::<::mime::Mime>()
            .map(|mime| mime.essence_str() == ::mime::APPLICATION_PDF.essence_str())
            .unwrap_or(false);
        declared || self.filename.to_ascii_lowercase().ends_with(".pdf")
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.size())
            .finish()
    }
}

/// Result of one fetch: every message that parsed, plus the ones that did not.
#[derive(Debug, Clone, Default)]
pub struct MailboxBatch {
    pub messages: Vec<InboundMessage>,
    pub skipped: Vec<String>,
}

impl MailboxBatch {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Read/flag access to the correspondence mailbox.
pub trait MailboxGateway: Send + Sync {
    /// Messages received within the last `since_days` days, optionally only unread ones.
    fn fetch(&self, since_days: u32, only_unread: bool) -> Result<MailboxBatch, MailboxError>;

    /// Flags the message as seen. `Ok(false)` when the id no longer resolves to exactly one message.
    fn mark_consumed(&self, id: &MessageId) -> Result<bool, MailboxError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("mailbox connection failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("mailbox TLS handshake failed: {0}")]
    Tls(String),
    #[error("mailbox authentication failed: {0}")]
    Authentication(String),
    #[error("mailbox protocol error: {0}")]
    Protocol(String),
    #[error("mailbox operation '{operation}' timed out")]
    Timeout { operation: &'static str },
    #[error("mailbox runtime unavailable: {0}")]
    Runtime(String),
}
