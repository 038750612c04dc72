use serde::{Serialize, de::DeserializeOwned};
use sqlx::{Row, sqlite::SqlitePool};
use time::OffsetDateTime;

use crate::Result;

/// The two lookup domains fronted by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
	Geocode,
	Route,
}
impl CacheKind {
	fn table(&self) -> &'static str {
		match self {
			Self::Geocode => "geocode_cache",
			Self::Route => "route_cache",
		}
	}
}

/// Digest of a normalized lookup input, used as the cache row key.
pub fn cache_key(parts: &[&str]) -> String {
	let mut hasher = blake3::Hasher::new();

	for (pos, part) in parts.iter().enumerate() {
		if pos > 0 {
			hasher.update(b"\x1f");
		}

		hasher.update(part.trim().to_lowercase().as_bytes());
	}

	hasher.finalize().to_hex().to_string()
}

/// Fetch a cached value. Expired rows are a MISS; they are physically
/// removed by the purge pass that precedes every write.
pub async fn lookup<T>(pool: &SqlitePool, kind: CacheKind, key: &str) -> Result<Option<T>>
where
	T: DeserializeOwned,
{
	let now = OffsetDateTime::now_utc().unix_timestamp();
	let row = sqlx::query(&format!(
		"SELECT value FROM {} WHERE key = ?1 AND expires_at > ?2",
		kind.table()
	))
	.bind(key)
	.bind(now)
	.fetch_optional(pool)
	.await?;
	let Some(row) = row else {
		return Ok(None);
	};
	let raw: String = row.try_get("value")?;

	Ok(Some(serde_json::from_str(&raw)?))
}

/// Store a value with the given TTL: purge expired rows, bulk-evict the
/// oldest-created survivors down to half the ceiling once occupancy
/// reaches it, then upsert (last-write-wins per key). Callers must never
/// store a negative result; an empty upstream answer has to be retried
/// on a later run.
pub async fn store<T>(
	pool: &SqlitePool,
	kind: CacheKind,
	key: &str,
	value: &T,
	ttl_seconds: i64,
	max_entries: u32,
) -> Result<()>
where
	T: Serialize,
{
	let table = kind.table();
	let now = OffsetDateTime::now_utc().unix_timestamp();

	sqlx::query(&format!("DELETE FROM {table} WHERE expires_at <= ?1"))
		.bind(now)
		.execute(pool)
		.await?;

	let occupancy: i64 =
		sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}")).fetch_one(pool).await?;

	if occupancy >= max_entries as i64 {
		let keep = (max_entries / 2).max(1) as i64;
		let evicted = sqlx::query(&format!(
			"\
DELETE FROM {table}
WHERE key NOT IN (SELECT key FROM {table} ORDER BY created_at DESC LIMIT ?1)"
		))
		.bind(keep)
		.execute(pool)
		.await?;

		tracing::info!(
			table,
			count = evicted.rows_affected(),
			"Evicted oldest cache rows past the high-water mark."
		);
	}

	let raw = serde_json::to_string(value)?;

	sqlx::query(&format!(
		"\
INSERT INTO {table} (key, value, created_at, expires_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (key) DO UPDATE
SET value = excluded.value, created_at = excluded.created_at, expires_at = excluded.expires_at"
	))
	.bind(key)
	.bind(raw)
	.bind(now)
	.bind(now + ttl_seconds)
	.execute(pool)
	.await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db;

	#[tokio::test]
	async fn entry_is_retrievable_before_ttl_and_miss_after() {
		let pool = db::connect_in_memory().await.expect("pool");

		store(&pool, CacheKind::Geocode, "k-live", &[11.9_f64, 45.4], 3_600, 100)
			.await
			.expect("store");
		store(&pool, CacheKind::Geocode, "k-dead", &[11.9_f64, 45.4], 0, 100)
			.await
			.expect("store");

		let live: Option<Vec<f64>> =
			lookup(&pool, CacheKind::Geocode, "k-live").await.expect("lookup");
		let dead: Option<Vec<f64>> =
			lookup(&pool, CacheKind::Geocode, "k-dead").await.expect("lookup");

		assert_eq!(live, Some(vec![11.9, 45.4]));
		assert_eq!(dead, None);
	}

	#[tokio::test]
	async fn kinds_are_isolated() {
		let pool = db::connect_in_memory().await.expect("pool");

		store(&pool, CacheKind::Geocode, "k", &1_u32, 3_600, 100).await.expect("store");

		let other: Option<u32> = lookup(&pool, CacheKind::Route, "k").await.expect("lookup");

		assert_eq!(other, None);
	}

	#[tokio::test]
	async fn last_write_wins_per_key() {
		let pool = db::connect_in_memory().await.expect("pool");

		store(&pool, CacheKind::Route, "k", &"first", 3_600, 100).await.expect("store");
		store(&pool, CacheKind::Route, "k", &"second", 3_600, 100).await.expect("store");

		let value: Option<String> = lookup(&pool, CacheKind::Route, "k").await.expect("lookup");

		assert_eq!(value.as_deref(), Some("second"));
	}

	#[tokio::test]
	async fn eviction_trims_to_half_the_ceiling() {
		let pool = db::connect_in_memory().await.expect("pool");
		let max = 10_u32;

		for idx in 0..max {
			store(&pool, CacheKind::Geocode, &format!("k{idx}"), &idx, 3_600, max)
				.await
				.expect("store");
			// Distinct created_at ordering is not guaranteed within one
			// second; the trim below only depends on the count.
		}

		store(&pool, CacheKind::Geocode, "overflow", &99_u32, 3_600, max).await.expect("store");

		let occupancy: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM geocode_cache")
			.fetch_one(&pool)
			.await
			.expect("count");

		assert!(occupancy <= (max / 2) as i64 + 1);

		let kept: Option<u32> = lookup(&pool, CacheKind::Geocode, "overflow").await.expect("lookup");

		assert_eq!(kept, Some(99));
	}

	#[test]
	fn cache_key_normalizes_case_and_whitespace() {
		assert_eq!(
			cache_key(&[" Piazza dei Signori ", "Padova"]),
			cache_key(&["piazza dei signori", "PADOVA"])
		);
		assert_ne!(cache_key(&["a", "b"]), cache_key(&["a|b"]));
	}
}
