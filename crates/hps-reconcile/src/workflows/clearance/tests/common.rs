use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::config::AuthorityConfig;
use crate::mailbox::{
    Attachment, InboundMessage, MailboxBatch, MailboxError, MailboxGateway, MessageId,
};
use crate::pdf::{PdfError, PdfTextExtractor};
use crate::workflows::clearance::domain::{ClearanceRecord, ClearanceStatus, RecordId};
use crate::workflows::clearance::repository::{
    NotificationError, NotificationSender, RecordStore, RepositoryError,
};
use crate::workflows::clearance::service::ReconciliationEngine;
use crate::workflows::clearance::status::{StatusClassifier, StatusPatternTable};

pub(super) const AUTHORITY_SENDER: &str = "solicitudes@authority.example";

#[derive(Default)]
pub(super) struct MemoryMailbox {
    messages: Mutex<Vec<InboundMessage>>,
    skipped: Vec<String>,
    offline: bool,
    consumed: Mutex<Vec<MessageId>>,
    last_since_days: Mutex<Option<u32>>,
}

impl MemoryMailbox {
    pub(super) fn with_messages(messages: Vec<InboundMessage>) -> Self {
        Self {
            messages: Mutex::new(messages),
            ..Self::default()
        }
    }

    pub(super) fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub(super) fn with_skipped(mut self, skipped: &[&str]) -> Self {
        self.skipped = skipped.iter().map(|id| id.to_string()).collect();
        self
    }

    pub(super) fn consumed(&self) -> Vec<MessageId> {
        self.consumed.lock().expect("mailbox mutex poisoned").clone()
    }

    pub(super) fn last_since_days(&self) -> Option<u32> {
        *self.last_since_days.lock().expect("mailbox mutex poisoned")
    }
}

impl MailboxGateway for MemoryMailbox {
    fn fetch(&self, since_days: u32, only_unread: bool) -> Result<MailboxBatch, MailboxError> {
        if self.offline {
            return Err(MailboxError::Authentication("invalid credentials".to_string()));
        }
        *self.last_since_days.lock().expect("mailbox mutex poisoned") = Some(since_days);
        let messages = self
            .messages
            .lock()
            .expect("mailbox mutex poisoned")
            .iter()
            .filter(|message| !only_unread || message.unread)
            .cloned()
            .collect();
        Ok(MailboxBatch {
            messages,
            skipped: self.skipped.clone(),
        })
    }

    fn mark_consumed(&self, id: &MessageId) -> Result<bool, MailboxError> {
        let mut messages = self.messages.lock().expect("mailbox mutex poisoned");
        let Some(message) = messages.iter_mut().find(|message| &message.id == id) else {
            return Ok(false);
        };
        message.unread = false;
        self.consumed
            .lock()
            .expect("mailbox mutex poisoned")
            .push(id.clone());
        Ok(true)
    }
}

#[derive(Default)]
pub(super) struct MemoryRecordStore {
    records: Mutex<Vec<ClearanceRecord>>,
    failing_saves: HashSet<RecordId>,
    queries: AtomicUsize,
}

impl MemoryRecordStore {
    pub(super) fn with_records(records: Vec<ClearanceRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub(super) fn failing_saves_for(mut self, id: &str) -> Self {
        self.failing_saves.insert(RecordId(id.to_string()));
        self
    }

    pub(super) fn record(&self, id: &str) -> ClearanceRecord {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .iter()
            .find(|record| record.id.0 == id)
            .cloned()
            .expect("record exists")
    }

    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("store mutex poisoned").len()
    }

    pub(super) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl RecordStore for MemoryRecordStore {
    fn find_awaiting_by_name(
        &self,
        first: &str,
        last: &str,
    ) -> Result<Option<ClearanceRecord>, RepositoryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let first = first.to_lowercase();
        let last = last.to_lowercase();
        let records = self.records.lock().expect("store mutex poisoned");
        let matches: Vec<_> = records
            .iter()
            .filter(|record| record.status == ClearanceStatus::AwaitingDecision)
            .filter(|record| {
                record.first_name.to_lowercase().contains(&first)
                    && record.last_name.to_lowercase().contains(&last)
            })
            .collect();
        Ok(match matches.as_slice() {
            [only] => Some((*only).clone()),
            _ => None,
        })
    }

    fn find_awaiting_by_document(
        &self,
        document: &str,
    ) -> Result<Option<ClearanceRecord>, RepositoryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let records = self.records.lock().expect("store mutex poisoned");
        Ok(records
            .iter()
            .find(|record| {
                record.status == ClearanceStatus::AwaitingDecision
                    && record.document_number == document
            })
            .cloned())
    }

    fn save(&self, record: &ClearanceRecord) -> Result<(), RepositoryError> {
        if self.failing_saves.contains(&record.id) {
            return Err(RepositoryError::Unavailable("write rejected".to_string()));
        }
        let mut records = self.records.lock().expect("store mutex poisoned");
        let existing = records
            .iter_mut()
            .find(|existing| existing.id == record.id)
            .ok_or(RepositoryError::NotFound)?;
        *existing = record.clone();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SentNotice {
    pub(super) record_id: RecordId,
    pub(super) old_status: ClearanceStatus,
    pub(super) new_status: ClearanceStatus,
    pub(super) message_id: MessageId,
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    sent: Mutex<Vec<SentNotice>>,
    fail: bool,
}

impl MemoryNotifier {
    pub(super) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(super) fn sent(&self) -> Vec<SentNotice> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationSender for MemoryNotifier {
    fn send_status_change(
        &self,
        record: &ClearanceRecord,
        old_status: ClearanceStatus,
        new_status: ClearanceStatus,
        original: &InboundMessage,
    ) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::Transport("smtp relay down".to_string()));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(SentNotice {
                record_id: record.id.clone(),
                old_status,
                new_status,
                message_id: original.id.clone(),
            });
        Ok(())
    }
}

/// Treats attachment bytes as already-extracted UTF-8 text.
pub(super) struct PlainTextExtractor;

impl PdfTextExtractor for PlainTextExtractor {
    fn extract_text(&self, pdf: &[u8]) -> Result<String, PdfError> {
        std::str::from_utf8(pdf)
            .map(str::to_string)
            .map_err(|_| PdfError::NoText)
    }
}

pub(super) type TestEngine = ReconciliationEngine<MemoryMailbox, MemoryRecordStore, MemoryNotifier>;

pub(super) fn authority() -> AuthorityConfig {
    AuthorityConfig {
        senders: vec!["authority.example".to_string()],
        subject_keywords: AuthorityConfig::default_keywords(),
    }
}

pub(super) fn engine(
    mailbox: &Arc<MemoryMailbox>,
    store: &Arc<MemoryRecordStore>,
    notifier: &Arc<MemoryNotifier>,
) -> TestEngine {
    let statuses =
        StatusClassifier::new(&StatusPatternTable::standard()).expect("standard table compiles");
    ReconciliationEngine::new(
        Arc::clone(mailbox),
        Arc::clone(store),
        Arc::clone(notifier),
        &authority(),
        statuses,
    )
    .with_text_extractor(Arc::new(PlainTextExtractor))
}

pub(super) fn message(uid: u32, sender: &str, subject: &str, body: &str) -> InboundMessage {
    InboundMessage {
        id: MessageId::from_uid(uid),
        sender: sender.to_string(),
        recipient: "Luis Gómez <seguridad@company.example>".to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        received_at: Utc.with_ymd_and_hms(2025, 7, 2, 9, 30, 0).single(),
        unread: true,
        attachments: Vec::new(),
    }
}

pub(super) fn pdf_attachment(filename: &str, text: &str) -> Attachment {
    Attachment {
        filename: filename.to_string(),
        content_type: "application/pdf".to_string(),
        content: text.as_bytes().to_vec(),
    }
}

pub(super) fn record(
    id: &str,
    first_name: &str,
    last_name: &str,
    document_number: &str,
    status: ClearanceStatus,
) -> ClearanceRecord {
    ClearanceRecord {
        id: RecordId(id.to_string()),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        document_number: document_number.to_string(),
        status,
        expires_at: None,
        approved_at: None,
        grade: None,
        case_reference: None,
        notes: String::new(),
        updated_at: Utc
            .with_ymd_and_hms(2025, 6, 1, 8, 0, 0)
            .single()
            .expect("valid timestamp"),
    }
}

pub(super) fn scenario_a_message() -> InboundMessage {
    message(
        1,
        AUTHORITY_SENDER,
        "Nueva solicitud de HPS de Juan Pérez, con fecha 02/07/2025",
        "Se ha registrado la solicitud. Queda pendiente de cumplimentación por el interesado.",
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
