mod cli;
mod infra;
mod pdf;
mod routes;
mod scheduler;
mod server;

use hps_reconcile::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
