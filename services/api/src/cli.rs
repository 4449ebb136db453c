use crate::infra::{build_engine, InMemoryRecordStore};
use crate::pdf::{self, PdfCommand};
use crate::scheduler::Scheduler;
use crate::server;
use clap::{Args, Parser, Subcommand};
use hps_reconcile::config::AppConfig;
use hps_reconcile::error::AppError;
use hps_reconcile::telemetry;
use hps_reconcile::workflows::clearance::{RunKind, RunLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(
    name = "HPS Reconciliation",
    about = "Reconcile authority clearance correspondence against open HPS records",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run one pass over the notification mailbox and print the report
    Reconcile(RunArgs),
    /// Run one pass over authority list attachments and print the report
    ReconcileAttachments(RunArgs),
    /// Run both passes on the configured business-hours cadence
    Schedule(RunArgs),
    /// Read or fill PDF forms
    Pdf {
        #[command(subcommand)]
        command: PdfCommand,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Also run the business-hours scheduler inside the server process
    #[arg(long)]
    pub(crate) with_scheduler: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Look back this many days instead of HPS_SINCE_DAYS
    #[arg(long)]
    pub(crate) since_days: Option<u32>,
    /// Include messages already marked as read
    #[arg(long)]
    pub(crate) include_read: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Reconcile(args) => run_once(args, RunKind::Messages).await,
        Command::ReconcileAttachments(args) => run_once(args, RunKind::Attachments).await,
        Command::Schedule(args) => schedule(args).await,
        Command::Pdf { command } => pdf::run(command),
    }
}

async fn run_once(args: RunArgs, kind: RunKind) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let since_days = args.since_days.unwrap_or(config.reconciliation.since_days);
    let store = Arc::new(InMemoryRecordStore::load(&config)?);
    let engine = build_engine(&config, store)?;
    let only_unread = config.reconciliation.only_unread && !args.include_read;
    let cancelled = Arc::new(AtomicBool::new(false));
    let engine = engine
        .only_unread(only_unread)
        .with_cancellation(Arc::clone(&cancelled));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current message");
            cancelled.store(true, Ordering::Relaxed);
        }
    });

    // The mailbox client blocks on its own runtime.
    let report = tokio::task::spawn_blocking(move || engine.run(kind, since_days))
        .await
        .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))?;

    println!("{}", pdf::to_json(&report)?);
    if !report.success {
        eprintln!(
            "reconciliation failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn schedule(args: RunArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let since_days = args.since_days.unwrap_or(config.reconciliation.since_days);
    let store = Arc::new(InMemoryRecordStore::load(&config)?);
    let engine = build_engine(&config, store)?
        .only_unread(config.reconciliation.only_unread && !args.include_read);

    Scheduler::new(Arc::new(engine), RunLock::default(), config.schedule, since_days)
        .run()
        .await;
    Ok(())
}
