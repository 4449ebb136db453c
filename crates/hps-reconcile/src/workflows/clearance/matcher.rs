use tracing::debug;

use super::domain::{ClearanceRecord, ClearanceStatus, ExtractedIdentity};
use super::repository::{RecordStore, RepositoryError};

/// Finds the open record an identity refers to: by name first, then by document.
///
/// Anything not awaiting a decision is discarded even if the store returns it,
/// which keeps the engine from reopening or double-advancing records.
pub struct RecordMatcher<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> RecordMatcher<'a, S>
where
    S: RecordStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn find(
        &self,
        identity: &ExtractedIdentity,
    ) -> Result<Option<ClearanceRecord>, RepositoryError> {
        if let (Some(first), Some(last)) = (&identity.first_name, &identity.last_name) {
            let found = self.store.find_awaiting_by_name(first, last)?;
            if let Some(record) = open_only(found) {
                debug!(record_id = %record.id, "matched record by name");
                return Ok(Some(record));
            }
        }

        if let Some(document) = &identity.document_number {
            let found = self.store.find_awaiting_by_document(document)?;
            if let Some(record) = open_only(found) {
                debug!(record_id = %record.id, "matched record by document number");
                return Ok(Some(record));
            }
        }

        Ok(None)
    }
}

fn open_only(found: Option<ClearanceRecord>) -> Option<ClearanceRecord> {
    found.filter(|record| record.status == ClearanceStatus::AwaitingDecision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::clearance::domain::RecordId;
    use chrono::Utc;

    /// Store that ignores the status restriction, to prove the matcher enforces it.
    struct LeakyStore {
        record: ClearanceRecord,
    }

    impl RecordStore for LeakyStore {
        fn find_awaiting_by_name(
            &self,
            _first: &str,
            _last: &str,
        ) -> Result<Option<ClearanceRecord>, RepositoryError> {
            Ok(Some(self.record.clone()))
        }

        fn find_awaiting_by_document(
            &self,
            _document: &str,
        ) -> Result<Option<ClearanceRecord>, RepositoryError> {
            Ok(Some(self.record.clone()))
        }

        fn save(&self, _record: &ClearanceRecord) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    fn record(status: ClearanceStatus) -> ClearanceRecord {
        ClearanceRecord {
            id: RecordId("hps-1".to_string()),
            first_name: "Juan".to_string(),
            last_name: "Pérez".to_string(),
            document_number: "12345678A".to_string(),
            status,
            expires_at: None,
            approved_at: None,
            grade: None,
            case_reference: None,
            notes: String::new(),
            updated_at: Utc::now(),
        }
    }

    fn full_identity() -> ExtractedIdentity {
        ExtractedIdentity {
            first_name: Some("Juan".to_string()),
            last_name: Some("Pérez".to_string()),
            document_number: Some("12345678A".to_string()),
            ..ExtractedIdentity::default()
        }
    }

    #[test]
    fn never_returns_records_outside_awaiting_decision() {
        for status in [
            ClearanceStatus::AwaitingApplicantForm,
            ClearanceStatus::SubmittedToAuthority,
            ClearanceStatus::Approved,
            ClearanceStatus::Rejected,
            ClearanceStatus::Expired,
        ] {
            let store = LeakyStore {
                record: record(status),
            };
            let found = RecordMatcher::new(&store)
                .find(&full_identity())
                .expect("store responds");
            assert!(found.is_none(), "{status} must not be matched");
        }
    }

    #[test]
    fn returns_open_record() {
        let store = LeakyStore {
            record: record(ClearanceStatus::AwaitingDecision),
        };
        let found = RecordMatcher::new(&store)
            .find(&full_identity())
            .expect("store responds")
            .expect("record matched");
        assert_eq!(found.id, RecordId("hps-1".to_string()));
    }

    #[test]
    fn empty_identity_never_queries_a_match() {
        let store = LeakyStore {
            record: record(ClearanceStatus::AwaitingDecision),
        };
        let found = RecordMatcher::new(&store)
            .find(&ExtractedIdentity::default())
            .expect("store responds");
        assert!(found.is_none());
    }
}
