pub mod models;
pub mod progression;
pub mod repositories;
pub mod test_utils;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::path::Path;
use tracing::{debug, warn};
use util::config;

/// Opens the configured database.
///
/// `DATABASE_PATH` may be a full DSN or a plain SQLite file path, in which
/// case the file (and its parent directory) is created when missing.
pub async fn connect() -> Result<DatabaseConnection, DbErr> {
    let path_or_url = config::database_path();
    let url = if path_or_url.starts_with("sqlite:")
        || path_or_url.starts_with("postgres://")
        || path_or_url.starts_with("mysql://")
    {
        path_or_url
    } else {
        // SQLite won't create intermediate dirs.
        if let Some(parent) = Path::new(&path_or_url).parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(error = %err, "could not create {}", parent.display());
            }
        }
        debug!(path = %path_or_url, "opening SQLite file");
        format!("sqlite://{path_or_url}?mode=rwc")
    };

    let mut options = ConnectOptions::new(url);
    options.sqlx_logging(false);
    Database::connect(options).await
}
