use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::mailbox::MessageId;

/// Identifier wrapper for clearance records owned by the surrounding system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a personnel security clearance (HPS) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceStatus {
    AwaitingDecision,
    AwaitingApplicantForm,
    SubmittedToAuthority,
    Approved,
    Rejected,
    Expired,
}

impl ClearanceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ClearanceStatus::AwaitingDecision => "awaiting_decision",
            ClearanceStatus::AwaitingApplicantForm => "awaiting_applicant_form",
            ClearanceStatus::SubmittedToAuthority => "submitted_to_authority",
            ClearanceStatus::Approved => "approved",
            ClearanceStatus::Rejected => "rejected",
            ClearanceStatus::Expired => "expired",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        let status = match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "awaiting_decision" => ClearanceStatus::AwaitingDecision,
            "awaiting_applicant_form" => ClearanceStatus::AwaitingApplicantForm,
            "submitted_to_authority" => ClearanceStatus::SubmittedToAuthority,
            "approved" => ClearanceStatus::Approved,
            "rejected" => ClearanceStatus::Rejected,
            "expired" => ClearanceStatus::Expired,
            _ => return None,
        };
        Some(status)
    }
}

impl fmt::Display for ClearanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Clearance record as read from and written back to the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearanceRecord {
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub document_number: String,
    pub status: ClearanceStatus,
    #[serde(default)]
    pub expires_at: Option<NaiveDate>,
    #[serde(default)]
    pub approved_at: Option<NaiveDate>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub case_reference: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub updated_at: DateTime<Utc>,
}

impl ClearanceRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub(crate) fn append_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }
}

/// Best-effort identity recovered from a message body.
///
/// `recipient` is the addressee, retained for audit only and never matched on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedIdentity {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub document_number: Option<String>,
    pub date: Option<String>,
    pub recipient: String,
}

impl ExtractedIdentity {
    pub fn has_name(&self) -> bool {
        self.first_name.is_some() && self.last_name.is_some()
    }

    /// Neither a full name nor a document number: nothing to match on.
    pub fn is_actionable(&self) -> bool {
        self.has_name() || self.document_number.is_some()
    }
}

/// Unit of work handed to the notification collaborator; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub record_id: RecordId,
    pub old_status: ClearanceStatus,
    pub new_status: ClearanceStatus,
    pub message_id: MessageId,
}
