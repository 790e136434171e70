use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;
use crate::error::AppError;

/// Opens (creating when missing) the database file and runs the migrations.
///
/// The file runs in WAL mode so readers never block the single writer, and
/// a writer waits up to `busy_timeout` for the lock instead of failing.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, AppError> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Database(format!("failed to create db dir: {e}")))?;
        }
    }

    tracing::info!("using database at {}", config.path.display());

    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(config.busy_timeout());

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database. Every connection to `:memory:`
/// is a separate database, so the pool must never open a second one.
pub async fn connect_in_memory() -> Result<SqlitePool, AppError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Database(format!("failed to run migrations: {e}")))
}
