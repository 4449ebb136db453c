use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{ClearanceRecord, ClearanceStatus, ExtractedIdentity, StatusTransition};
use super::identity::IdentityExtractor;
use super::matcher::RecordMatcher;
use super::repository::{NotificationSender, RecordStore, RepositoryError};
use super::sender::SenderClassifier;
use super::status::{StatusClassifier, StatusPatternTable, StatusTableError};
use crate::config::{AuthorityConfig, ReconciliationConfig};
use crate::mailbox::{Attachment, InboundMessage, MailboxError, MailboxGateway};
use crate::pdf::bulk::{self, AuthorityListKind, AuthorityRow};
use crate::pdf::{LopdfTextExtractor, PdfTextExtractor};

/// Statistics for one pass over the mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub success: bool,
    pub error: Option<String>,
    pub messages_fetched: usize,
    pub messages_processed: usize,
    pub pdfs_processed: usize,
    pub status_updates: usize,
    pub errors: Vec<String>,
    pub transitions: Vec<StatusTransition>,
    pub partial_fetch: bool,
    pub cancelled: bool,
}

impl ReconciliationReport {
    fn started() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    fn failed(error: &MailboxError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Which entry point a trigger runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Messages,
    Attachments,
}

/// Where a message ended up in the per-message state machine.
#[derive(Debug)]
enum MessageOutcome {
    NotAuthoritative,
    NoIdentity,
    Unmatched,
    Undetermined,
    Unchanged,
    Applied,
}

impl MessageOutcome {
    fn consumes(&self) -> bool {
        matches!(self, MessageOutcome::Unchanged | MessageOutcome::Applied)
    }
}

/// Domain fields an authority list row writes alongside the status.
struct RowUpdate<'a> {
    kind: AuthorityListKind,
    row: &'a AuthorityRow,
}

impl RowUpdate<'_> {
    fn apply_to(&self, record: &mut ClearanceRecord) {
        record.grade = Some(self.row.grade.clone());
        record.case_reference = Some(self.row.case_reference.clone());
        match self.kind {
            AuthorityListKind::Grants => {
                record.approved_at = Some(self.row.starts_on);
                record.expires_at = Some(self.row.ends_on);
            }
            AuthorityListKind::Rejections => {
                record.append_note(&format!(
                    "Denegada por la autoridad (expediente {})",
                    self.row.case_reference
                ));
            }
        }
    }
}

/// Drives authority notifications through classification, matching and
/// status application, one message at a time.
pub struct ReconciliationEngine<M, S, N> {
    mailbox: Arc<M>,
    store: Arc<S>,
    notifier: Arc<N>,
    senders: SenderClassifier,
    statuses: StatusClassifier,
    identities: &'static IdentityExtractor,
    pdf_text: Arc<dyn PdfTextExtractor>,
    only_unread: bool,
    cancellation: Option<Arc<AtomicBool>>,
}

impl<M, S, N> ReconciliationEngine<M, S, N>
where
    M: MailboxGateway + 'static,
    S: RecordStore + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(
        mailbox: Arc<M>,
        store: Arc<S>,
        notifier: Arc<N>,
        authority: &AuthorityConfig,
        statuses: StatusClassifier,
    ) -> Self {
        Self {
            mailbox,
            store,
            notifier,
            senders: SenderClassifier::new(authority),
            statuses,
            identities: IdentityExtractor::standard(),
            pdf_text: Arc::new(LopdfTextExtractor),
            only_unread: true,
            cancellation: None,
        }
    }

    /// Builds the engine from configuration, loading a custom status table when one is set.
    pub fn from_config(
        mailbox: Arc<M>,
        store: Arc<S>,
        notifier: Arc<N>,
        authority: &AuthorityConfig,
        reconciliation: &ReconciliationConfig,
    ) -> Result<Self, EngineError> {
        let table = match &reconciliation.status_patterns {
            Some(path) => StatusPatternTable::from_path(path)?,
            None => StatusPatternTable::standard(),
        };
        let statuses = StatusClassifier::new(&table)?;
        Ok(Self::new(mailbox, store, notifier, authority, statuses)
            .only_unread(reconciliation.only_unread))
    }

    pub fn only_unread(mut self, only_unread: bool) -> Self {
        self.only_unread = only_unread;
        self
    }

    pub fn with_text_extractor(mut self, extractor: Arc<dyn PdfTextExtractor>) -> Self {
        self.pdf_text = extractor;
        self
    }

    /// Flag checked between messages; once set, the run stops before the next message.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(flag);
        self
    }

    pub fn run(&self, kind: RunKind, since_days: u32) -> ReconciliationReport {
        match kind {
            RunKind::Messages => self.run_reconciliation(since_days),
            RunKind::Attachments => self.run_attachment_reconciliation(since_days),
        }
    }

    /// Reconciles record statuses from the notification text of recent messages.
    pub fn run_reconciliation(&self, since_days: u32) -> ReconciliationReport {
        let batch = match self.mailbox.fetch(since_days, self.only_unread) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "mailbox fetch failed; aborting reconciliation run");
                return ReconciliationReport::failed(&err);
            }
        };

        let mut report = ReconciliationReport::started();
        report.messages_fetched = batch.messages.len();
        report.partial_fetch = batch.is_partial();
        for skipped in &batch.skipped {
            report.errors.push(format!("{skipped}: message could not be parsed"));
        }

        for message in &batch.messages {
            if self.is_cancelled() {
                info!("reconciliation run cancelled between messages");
                report.cancelled = true;
                break;
            }

            match self.process_message(message, &mut report) {
                Ok(outcome) => {
                    debug!(message_id = %message.id, outcome = ?outcome, "message handled");
                    if outcome.consumes() {
                        report.messages_processed += 1;
                        self.consume(message, &mut report);
                    }
                }
                Err(err) => {
                    warn!(message_id = %message.id, error = %err, "message processing failed");
                    report.errors.push(format!("{}: {err}", message.id));
                }
            }
        }

        info!(
            fetched = report.messages_fetched,
            processed = report.messages_processed,
            updates = report.status_updates,
            errors = report.errors.len(),
            "reconciliation run finished"
        );
        report
    }

    /// Reconciles record statuses from the authority's grant and rejection list PDFs.
    pub fn run_attachment_reconciliation(&self, since_days: u32) -> ReconciliationReport {
        let batch = match self.mailbox.fetch(since_days, self.only_unread) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "mailbox fetch failed; aborting attachment run");
                return ReconciliationReport::failed(&err);
            }
        };

        let mut report = ReconciliationReport::started();
        report.messages_fetched = batch.messages.len();
        report.partial_fetch = batch.is_partial();
        for skipped in &batch.skipped {
            report.errors.push(format!("{skipped}: message could not be parsed"));
        }

        for message in &batch.messages {
            if self.is_cancelled() {
                info!("attachment run cancelled between messages");
                report.cancelled = true;
                break;
            }
            if !self.senders.is_authoritative(message) {
                continue;
            }

            let mut processed_here = 0;
            for attachment in message
                .attachments
                .iter()
                .filter(|attachment| attachment.is_pdf() && bulk::is_authority_pdf(&attachment.filename))
            {
                match self.process_attachment(message, attachment, &mut report) {
                    Ok(true) => processed_here += 1,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(
                            message_id = %message.id,
                            filename = %attachment.filename,
                            error = %err,
                            "attachment processing failed"
                        );
                        report
                            .errors
                            .push(format!("{} ({}): {err}", message.id, attachment.filename));
                    }
                }
            }

            if processed_here > 0 {
                report.pdfs_processed += processed_here;
                report.messages_processed += 1;
                self.consume(message, &mut report);
            }
        }

        info!(
            fetched = report.messages_fetched,
            processed = report.messages_processed,
            pdfs = report.pdfs_processed,
            updates = report.status_updates,
            errors = report.errors.len(),
            "attachment reconciliation run finished"
        );
        report
    }

    fn process_message(
        &self,
        message: &InboundMessage,
        report: &mut ReconciliationReport,
    ) -> Result<MessageOutcome, EngineError> {
        if !self.senders.is_authoritative(message) {
            return Ok(MessageOutcome::NotAuthoritative);
        }

        let identity = self.identities.extract(message);
        if !identity.is_actionable() {
            warn!(message_id = %message.id, "no applicant name or document number found");
            return Ok(MessageOutcome::NoIdentity);
        }

        let Some(record) = RecordMatcher::new(self.store.as_ref()).find(&identity)? else {
            info!(
                message_id = %message.id,
                first_name = identity.first_name.as_deref().unwrap_or_default(),
                last_name = identity.last_name.as_deref().unwrap_or_default(),
                document = identity.document_number.as_deref().unwrap_or_default(),
                "no open clearance record matches the notification"
            );
            return Ok(MessageOutcome::Unmatched);
        };

        let Some(status) = self.statuses.classify(message) else {
            info!(
                message_id = %message.id,
                record_id = %record.id,
                "notification carries no recognisable status change"
            );
            return Ok(MessageOutcome::Undetermined);
        };

        if self.apply_transition(record, status, message, report, |_| {})? {
            Ok(MessageOutcome::Applied)
        } else {
            Ok(MessageOutcome::Unchanged)
        }
    }

    /// Returns whether the attachment was a readable, recognised authority list.
    fn process_attachment(
        &self,
        message: &InboundMessage,
        attachment: &Attachment,
        report: &mut ReconciliationReport,
    ) -> Result<bool, EngineError> {
        let text = match self.pdf_text.extract_text(&attachment.content) {
            Ok(text) => text,
            Err(err) => {
                warn!(filename = %attachment.filename, error = %err, "skipping unreadable PDF");
                return Ok(false);
            }
        };

        let Some(kind) = AuthorityListKind::classify(&text) else {
            debug!(filename = %attachment.filename, "PDF is neither a grants nor a rejections list");
            return Ok(false);
        };

        let rows = bulk::parse_rows(&text);
        info!(
            filename = %attachment.filename,
            kind = ?kind,
            rows = rows.len(),
            "processing authority list"
        );

        let matcher = RecordMatcher::new(self.store.as_ref());
        for row in &rows {
            let identity = ExtractedIdentity {
                document_number: Some(row.document_number.clone()),
                recipient: message.recipient.clone(),
                ..ExtractedIdentity::default()
            };
            let Some(record) = matcher.find(&identity)? else {
                info!(
                    filename = %attachment.filename,
                    document = %row.document_number,
                    "list row matches no open clearance record"
                );
                continue;
            };

            let update = RowUpdate { kind, row };
            self.apply_transition(record, kind.target_status(), message, report, |record| {
                update.apply_to(record)
            })?;
        }

        Ok(true)
    }

    /// Saves and announces a status change; `false` when the record already has `status`.
    fn apply_transition<F>(
        &self,
        mut record: ClearanceRecord,
        status: ClearanceStatus,
        message: &InboundMessage,
        report: &mut ReconciliationReport,
        update: F,
    ) -> Result<bool, EngineError>
    where
        F: FnOnce(&mut ClearanceRecord),
    {
        let old_status = record.status;
        if old_status == status {
            debug!(record_id = %record.id, status = %status, "record already in target status");
            return Ok(false);
        }

        record.status = status;
        record.updated_at = Utc::now();
        update(&mut record);
        self.store.save(&record)?;

        info!(
            message_id = %message.id,
            record_id = %record.id,
            old_status = %old_status,
            status = %status,
            "clearance status updated"
        );
        report.status_updates += 1;
        report.transitions.push(StatusTransition {
            record_id: record.id.clone(),
            old_status,
            new_status: status,
            message_id: message.id.clone(),
        });

        if let Err(err) = self
            .notifier
            .send_status_change(&record, old_status, status, message)
        {
            warn!(record_id = %record.id, error = %err, "status change notification failed");
            report
                .errors
                .push(format!("{}: notification for {} failed: {err}", message.id, record.id));
        }

        Ok(true)
    }

    fn consume(&self, message: &InboundMessage, report: &mut ReconciliationReport) {
        match self.mailbox.mark_consumed(&message.id) {
            Ok(true) => debug!(message_id = %message.id, "message marked as read"),
            Ok(false) => {
                warn!(message_id = %message.id, "message no longer resolves; not marked as read")
            }
            Err(err) => {
                warn!(message_id = %message.id, error = %err, "failed to mark message as read");
                report
                    .errors
                    .push(format!("{}: failed to mark as read: {err}", message.id));
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Error raised while setting up or running the reconciliation engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    StatusTable(#[from] StatusTableError),
}

/// Single-runner guard shared by every trigger of the engine.
#[derive(Debug, Clone, Default)]
pub struct RunLock(Arc<AtomicBool>);

impl RunLock {
    /// `None` while another run holds the lock.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunPermit(Arc::clone(&self.0)))
    }
}

/// Held for the duration of a run; releases the [`RunLock`] on drop.
#[derive(Debug)]
pub struct RunPermit(Arc<AtomicBool>);

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
