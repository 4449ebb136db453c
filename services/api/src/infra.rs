use hps_reconcile::config::AppConfig;
use hps_reconcile::error::AppError;
use hps_reconcile::mailbox::{ImapMailboxClient, InboundMessage};
use hps_reconcile::workflows::clearance::{
    export_records_to_path, import_records_from_path, render_evidence, ClearanceRecord, ClearanceStatus, EngineError,
    NotificationError, NotificationSender, ReconciliationEngine, RecordId, RecordStore,
    RepositoryError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type LiveEngine =
    ReconciliationEngine<ImapMailboxClient, InMemoryRecordStore, LoggingNotificationSender>;

pub(crate) fn build_engine(
    config: &AppConfig,
    store: Arc<InMemoryRecordStore>,
) -> Result<LiveEngine, AppError> {
    let mailbox = ImapMailboxClient::with_runtime(config.require_mailbox()?.clone())
        .map_err(EngineError::from)?;
    let engine = ReconciliationEngine::from_config(
        Arc::new(mailbox),
        store,
        Arc::new(LoggingNotificationSender::default()),
        &config.authority,
        &config.reconciliation,
    )?;
    Ok(engine)
}

/// Record store seeded from `HPS_RECORDS_CSV`. Every save rewrites that file,
/// so transitions survive the process and the next run sees them.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRecordStore {
    records: Arc<Mutex<BTreeMap<RecordId, ClearanceRecord>>>,
    path: Option<PathBuf>,
}

impl InMemoryRecordStore {
    pub(crate) fn from_records(records: Vec<ClearanceRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            records: Arc::new(Mutex::new(records)),
            path: None,
        }
    }

    pub(crate) fn from_path(path: &Path) -> Result<Self, AppError> {
        let records = import_records_from_path(path)?;
        info!(count = records.len(), path = %path.display(), "loaded clearance records");
        Ok(Self {
            path: Some(path.to_path_buf()),
            ..Self::from_records(records)
        })
    }

    pub(crate) fn load(config: &AppConfig) -> Result<Self, AppError> {
        match &config.records_csv {
            Some(path) => Self::from_path(path),
            None => {
                warn!("HPS_RECORDS_CSV not set; status changes will not outlive this process");
                Ok(Self::default())
            }
        }
    }
}

impl RecordStore for InMemoryRecordStore {
    fn find_awaiting_by_name(
        &self,
        first: &str,
        last: &str,
    ) -> Result<Option<ClearanceRecord>, RepositoryError> {
        let first = first.to_lowercase();
        let last = last.to_lowercase();
        let guard = self.records.lock().expect("record store mutex poisoned");
        let mut matches = guard.values().filter(|record| {
            record.status == ClearanceStatus::AwaitingDecision
                && record.first_name.to_lowercase().contains(&first)
                && record.last_name.to_lowercase().contains(&last)
        });

        let found = matches.next().cloned();
        if matches.next().is_some() {
            debug!(first = %first, last = %last, "name matches several open records");
            return Ok(None);
        }
        Ok(found)
    }

    fn find_awaiting_by_document(
        &self,
        document: &str,
    ) -> Result<Option<ClearanceRecord>, RepositoryError> {
        let guard = self.records.lock().expect("record store mutex poisoned");
        Ok(guard
            .values()
            .find(|record| {
                record.status == ClearanceStatus::AwaitingDecision
                    && record.document_number == document
            })
            .cloned())
    }

    fn save(&self, record: &ClearanceRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("record store mutex poisoned");
        let Some(existing) = guard.get_mut(&record.id) else {
            return Err(RepositoryError::NotFound);
        };
        let previous = std::mem::replace(existing, record.clone());

        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Err(err) = export_records_to_path(path, guard.values()) {
            // Keep memory in step with the file so a retry sees the old state.
            guard.insert(record.id.clone(), previous);
            return Err(RepositoryError::Unavailable(err.to_string()));
        }
        debug!(record_id = %record.id, path = %path.display(), "record store written");
        Ok(())
    }
}

/// Notification sender that writes the announcement, with its evidence, to the log.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationSender {
    delivered: Arc<Mutex<Vec<String>>>,
}

impl LoggingNotificationSender {
    #[cfg(test)]
    pub(crate) fn delivered(&self) -> Vec<String> {
        self.delivered
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

impl NotificationSender for LoggingNotificationSender {
    fn send_status_change(
        &self,
        record: &ClearanceRecord,
        old_status: ClearanceStatus,
        new_status: ClearanceStatus,
        original: &InboundMessage,
    ) -> Result<(), NotificationError> {
        let notice = format!(
            "HPS de {} ({}): {} -> {}\n\n{}",
            record.full_name(),
            record.id,
            old_status,
            new_status,
            render_evidence(original)
        );
        info!(
            record_id = %record.id,
            old_status = %old_status,
            status = %new_status,
            "clearance status change announced"
        );
        debug!(notice = %notice, "notification body");
        self.delivered
            .lock()
            .map_err(|_| NotificationError::Transport("notification log poisoned".to_string()))?
            .push(notice);
        Ok(())
    }
}
