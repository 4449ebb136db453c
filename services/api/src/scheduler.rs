//! Business-hours loop that triggers both reconciliation entry points.

use chrono::{Local, Timelike};
use hps_reconcile::config::ScheduleConfig;
use hps_reconcile::mailbox::MailboxGateway;
use hps_reconcile::workflows::clearance::{
    NotificationSender, ReconciliationEngine, ReconciliationReport, RecordStore, RunKind, RunLock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub(crate) struct Scheduler<M, S, N> {
    engine: Arc<ReconciliationEngine<M, S, N>>,
    lock: RunLock,
    schedule: ScheduleConfig,
    since_days: u32,
}

/// What a single tick did.
#[derive(Debug)]
pub(crate) enum TickOutcome {
    OutsideWindow,
    Busy,
    Ran(Vec<ReconciliationReport>),
}

impl<M, S, N> Scheduler<M, S, N>
where
    M: MailboxGateway + 'static,
    S: RecordStore + 'static,
    N: NotificationSender + 'static,
{
    pub(crate) fn new(
        engine: Arc<ReconciliationEngine<M, S, N>>,
        lock: RunLock,
        schedule: ScheduleConfig,
        since_days: u32,
    ) -> Self {
        Self {
            engine,
            lock,
            schedule,
            since_days,
        }
    }

    /// Ticks every configured interval until the process receives Ctrl-C.
    pub(crate) async fn run(self) {
        let minutes = self.schedule.interval_minutes.max(1);
        let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_minutes = minutes,
            start_hour = self.schedule.start_hour,
            end_hour = self.schedule.end_hour,
            "reconciliation scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("reconciliation scheduler stopping");
                    break;
                }
            }
            self.tick(Local::now().hour()).await;
        }
    }

    pub(crate) async fn tick(&self, hour: u32) -> TickOutcome {
        if !self.schedule.within_window(hour) {
            debug!(hour, "outside reconciliation window");
            return TickOutcome::OutsideWindow;
        }
        let Some(permit) = self.lock.try_acquire() else {
            warn!("previous reconciliation run still active; skipping tick");
            return TickOutcome::Busy;
        };

        let engine = Arc::clone(&self.engine);
        let since_days = self.since_days;
        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            [RunKind::Messages, RunKind::Attachments]
                .into_iter()
                .map(|kind| engine.run(kind, since_days))
                .collect::<Vec<_>>()
        })
        .await;

        match outcome {
            Ok(reports) => {
                for report in &reports {
                    if !report.success {
                        warn!(
                            error = report.error.as_deref().unwrap_or_default(),
                            "scheduled reconciliation run failed"
                        );
                    }
                }
                TickOutcome::Ran(reports)
            }
            Err(err) => {
                error!(error = %err, "scheduled reconciliation task did not complete");
                TickOutcome::Ran(Vec::new())
            }
        }
    }
}
