use super::domain::{ClearanceRecord, ClearanceStatus};
use crate::mailbox::InboundMessage;

/// Storage abstraction over the clearance records owned by the CRUD system.
///
/// Both finders only ever consider records in
/// [`ClearanceStatus::AwaitingDecision`].
pub trait RecordStore: Send + Sync {
    /// Record whose first name contains `first` and last name contains `last`
    /// (case-insensitive).
    fn find_awaiting_by_name(
        &self,
        first: &str,
        last: &str,
    ) -> Result<Option<ClearanceRecord>, RepositoryError>;

    /// Record whose document number equals `document` exactly.
    fn find_awaiting_by_document(
        &self,
        document: &str,
    ) -> Result<Option<ClearanceRecord>, RepositoryError>;

    fn save(&self, record: &ClearanceRecord) -> Result<(), RepositoryError>;
}

/// Error enumeration for record store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Outbound hook announcing a status change with the authority's message as evidence.
pub trait NotificationSender: Send + Sync {
    fn send_status_change(
        &self,
        record: &ClearanceRecord,
        old_status: ClearanceStatus,
        new_status: ClearanceStatus,
        original: &InboundMessage,
    ) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Verbatim evidence block (sender, subject, date, body) for outbound notifications.
pub fn render_evidence(message: &InboundMessage) -> String {
    let received = message
        .received_at
        .map(|at| at.format("%d/%m/%Y %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "From: {}\nSubject: {}\nDate: {}\n\n{}",
        message.sender, message.subject, received, message.body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MessageId;
    use chrono::TimeZone;

    #[test]
    fn render_evidence_keeps_original_body_verbatim() {
        let message = InboundMessage {
            id: MessageId("<n-1@authority.example>".to_string()),
            sender: "solicitudes@authority.example".to_string(),
            recipient: "seguridad@company.example".to_string(),
            subject: "Concesión HPS".to_string(),
            body: "La HPS de Juan Pérez ha sido concedida.\n  Atentamente.".to_string(),
            received_at: chrono::Utc.with_ymd_and_hms(2025, 7, 2, 8, 15, 0).single(),
            unread: true,
            attachments: Vec::new(),
        };

        let evidence = render_evidence(&message);
        assert!(evidence.starts_with("From: solicitudes@authority.example\n"));
        assert!(evidence.contains("Subject: Concesión HPS\n"));
        assert!(evidence.contains("Date: 02/07/2025 08:15 UTC"));
        assert!(evidence.ends_with("La HPS de Juan Pérez ha sido concedida.\n  Atentamente."));
    }
}
