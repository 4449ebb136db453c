//! HPS clearance reconciliation: authority correspondence in, record status changes out.

pub mod domain;
pub(crate) mod identity;
pub mod import;
pub(crate) mod matcher;
pub mod repository;
pub mod router;
pub(crate) mod sender;
pub mod service;
pub mod status;
pub mod transfer;

#[cfg(test)]
mod tests;

pub use domain::{ClearanceRecord, ClearanceStatus, ExtractedIdentity, RecordId, StatusTransition};
pub use identity::IdentityExtractor;
pub use import::{
    export_records_to_path, import_records_from_path, parse_records, write_records,
    RecordImportError,
};
pub use matcher::RecordMatcher;
pub use repository::{
    render_evidence, NotificationError, NotificationSender, RecordStore, RepositoryError,
};
pub use router::{reconciliation_router, ReconciliationState, RunParams};
pub use sender::SenderClassifier;
pub use service::{
    EngineError, ReconciliationEngine, ReconciliationReport, RunKind, RunLock, RunPermit,
};
pub use status::{StatusClassifier, StatusPatternEntry, StatusPatternTable, StatusTableError};
pub use transfer::TransferFormValues;
