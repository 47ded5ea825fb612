//! One reconciliation pass over every ended session, meant to be run from cron.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use db::repositories::SeaOrmRepository;
use services::{PenaltyService, ServiceSettings};
use tracing::{error, info};
use util::config;
use util::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let _log_guard = init_logging(
        &config::log_file(),
        &config::log_level(),
        config::log_to_stdout(),
    );

    let db = match db::connect().await {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "failed to connect to {}", config::database_path());
            return ExitCode::FAILURE;
        }
    };

    let service = PenaltyService::new(
        Arc::new(SeaOrmRepository::new(db)),
        ServiceSettings::from_config(),
    );

    match service.sweep_ended_sessions(Utc::now()).await {
        Ok(sweep) if sweep.failures.is_empty() => {
            info!(
                "{}: reconciled {} session(s), {} penalty(ies)",
                config::project_name(),
                sweep.reports.len(),
                sweep.penalized_total()
            );
            ExitCode::SUCCESS
        }
        Ok(sweep) => {
            error!(failures = ?sweep.failures, "sweep finished with failures");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = %err, "sweep aborted");
            ExitCode::FAILURE
        }
    }
}
