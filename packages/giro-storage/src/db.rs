use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::Result;

/// Connect to the cache database, creating the file and its parent
/// directories as needed. WAL mode keeps concurrent readers from
/// blocking the writer across simultaneously handled requests.
pub async fn connect(cfg: &giro_config::Cache) -> Result<SqlitePool> {
	if let Some(parent) = cfg.path.parent() {
		std::fs::create_dir_all(parent).map_err(|err| {
			crate::Error::InvalidArgument(format!(
				"Failed to create cache directory {parent:?}: {err}."
			))
		})?;
	}

	let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", cfg.path.display()))
		.map_err(sqlx::Error::from)?
		.create_if_missing(true)
		.journal_mode(SqliteJournalMode::Wal);
	let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;

	ensure_schema(&pool).await?;

	Ok(pool)
}

/// In-memory variant for tests. Capped at one connection, since each
/// SQLite in-memory connection sees its own database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(sqlx::Error::from)?;
	let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

	ensure_schema(&pool).await?;

	Ok(pool)
}

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
	for table in ["geocode_cache", "route_cache"] {
		sqlx::query(&format!(
			"\
CREATE TABLE IF NOT EXISTS {table} (
	key TEXT PRIMARY KEY,
	value TEXT NOT NULL,
	created_at INTEGER NOT NULL,
	expires_at INTEGER NOT NULL
)"
		))
		.execute(pool)
		.await?;
		sqlx::query(&format!(
			"CREATE INDEX IF NOT EXISTS idx_{table}_created_at ON {table} (created_at)"
		))
		.execute(pool)
		.await?;
	}

	Ok(())
}
