use std::time::Duration;

use tokio::task::JoinSet;
use uuid::Uuid;

use giro_domain::{DeltaType, EventRecord, identity};
use giro_providers::{Coordinate, geocode::StructuredAddress, throttle::RateLimiter};
use giro_storage::cache::{self, CacheKind};

use crate::{Error, GiroService, IndexRecord, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
	pub inserted: usize,
	pub updated: usize,
	pub skipped_unchanged: usize,
	pub deleted: usize,
}

fn point_id(record: &EventRecord) -> Uuid {
	if record.id.trim().is_empty() {
		tracing::warn!(
			title = %record.title,
			"Record has no natural key; assigning a fallback id that can never be re-matched."
		);

		identity::fallback_point_id()
	} else {
		identity::derive_point_id(&record.id)
	}
}

/// Index payload: the record itself plus the content hash, with the
/// location flattened to a lat/lon object so the geo index applies.
fn event_payload(record: &EventRecord, hash: &str) -> Result<serde_json::Value> {
	let mut payload = serde_json::to_value(record)?;
	let Some(map) = payload.as_object_mut() else {
		return Err(Error::Storage { message: "Record did not serialize to an object.".to_string() });
	};

	map.insert("event_id".to_string(), serde_json::Value::from(record.id.as_str()));
	map.insert("hash".to_string(), serde_json::Value::from(hash));
	map.remove("delta_type");
	map.insert("venue".to_string(), serde_json::Value::from(record.location.venue.as_str()));
	map.insert("address".to_string(), serde_json::Value::from(record.location.address.as_str()));

	match (record.location.latitude, record.location.longitude) {
		(Some(lat), Some(lon)) => {
			map.insert("location".to_string(), serde_json::json!({ "lat": lat, "lon": lon }));
		},
		_ => {
			map.remove("location");
		},
	}

	Ok(payload)
}

impl GiroService {
	/// Apply one delta snapshot to the index. Removed records are deleted
	/// best-effort; the rest are geocoded where coordinates are missing,
	/// then upserted in fixed-size batches. Unchanged records (same
	/// content hash as the stored point) are skipped before any embedding
	/// work, which makes re-ingesting an identical snapshot a no-op. A
	/// failed batch is logged and skipped; later batches still run.
	pub async fn ingest(&self, records: Vec<EventRecord>) -> Result<IngestReport> {
		self.providers.index.ensure_ready().await?;

		let mut report = IngestReport::default();
		let (removed, mut live): (Vec<_>, Vec<_>) =
			records.into_iter().partition(|r| r.delta_type == Some(DeltaType::Removed));

		if !removed.is_empty() {
			let ids: Vec<Uuid> = removed.iter().map(point_id).collect();

			match self.providers.index.delete(&ids, self.cfg.ingest.wait_on_upsert).await {
				Ok(()) => report.deleted = ids.len(),
				Err(err) => tracing::error!(
					error = %err,
					count = ids.len(),
					"Failed to delete removed events; continuing with the run."
				),
			}
		}

		self.geocode_missing(&mut live).await;

		let batch_size = self.cfg.ingest.batch_size.clamp(16, 32) as usize;

		for (batch_index, batch) in live.chunks(batch_size).enumerate() {
			match self.ingest_batch(batch).await {
				Ok((inserted, updated, skipped)) => {
					report.inserted += inserted;
					report.updated += updated;
					report.skipped_unchanged += skipped;
				},
				Err(err) => tracing::error!(
					error = %err,
					batch_index,
					size = batch.len(),
					"Batch failed; skipping it and continuing."
				),
			}
		}

		tracing::info!(
			inserted = report.inserted,
			updated = report.updated,
			skipped_unchanged = report.skipped_unchanged,
			deleted = report.deleted,
			"Ingestion run finished."
		);

		Ok(report)
	}

	/// Resolve coordinates for records that lack them, concurrently under
	/// the shared rate limiter, through the lookup cache. A geocoding
	/// failure or miss leaves the record without coordinates; misses are
	/// never cached, so the next run retries them.
	async fn geocode_missing(&self, records: &mut [EventRecord]) {
		let limiter = RateLimiter::new(
			self.cfg.ingest.geocode_concurrency,
			Duration::from_millis(self.cfg.ingest.geocode_delay_ms),
		);
		let ttl_seconds = self.cfg.storage.cache.ttl_days * 86_400;
		let max_entries = self.cfg.storage.cache.max_entries;
		let mut tasks = JoinSet::new();

		for (position, record) in records.iter().enumerate() {
			if record.has_valid_coordinates() {
				continue;
			}

			let address = StructuredAddress {
				street: record.location.venue.clone(),
				city: record.city.clone(),
			};

			if address.street.trim().is_empty() && address.city.trim().is_empty() {
				continue;
			}

			let cfg = self.cfg.providers.geocoding.clone();
			let geocoder = self.providers.geocoder.clone();
			let pool = self.cache.clone();
			let limiter = limiter.clone();

			tasks.spawn(async move {
				let key = cache::cache_key(&[&address.street, &address.city]);

				match cache::lookup::<Coordinate>(&pool, CacheKind::Geocode, &key).await {
					Ok(Some(coordinate)) => return (position, Some(coordinate)),
					Ok(None) => {},
					Err(err) => {
						tracing::warn!(
							error = %err,
							"Geocode cache lookup failed; calling the provider."
						);
					},
				}

				let coordinate = match limiter.run(geocoder.geocode(&cfg, &address)).await {
					Ok(coordinate) => coordinate,
					Err(err) => {
						tracing::warn!(
							error = %err,
							venue = %address.street,
							city = %address.city,
							"Geocoding failed; leaving the record without coordinates."
						);

						None
					},
				};

				if let Some(coordinate) = coordinate
					&& let Err(err) = cache::store(
						&pool,
						CacheKind::Geocode,
						&key,
						&coordinate,
						ttl_seconds,
						max_entries,
					)
					.await
				{
					tracing::warn!(error = %err, "Failed to cache a geocoding result.");
				}

				(position, coordinate)
			});
		}

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok((position, Some(coordinate))) => {
					let location = &mut records[position].location;

					location.latitude = Some(coordinate.lat);
					location.longitude = Some(coordinate.lon);
				},
				Ok((_, None)) => {},
				Err(err) => tracing::warn!(error = %err, "Geocoding task failed to join."),
			}
		}
	}

	async fn ingest_batch(&self, batch: &[EventRecord]) -> Result<(usize, usize, usize)> {
		let entries: Vec<(Uuid, String)> =
			batch.iter().map(|record| (point_id(record), identity::content_hash(record))).collect();
		let ids: Vec<Uuid> = entries.iter().map(|(id, _)| *id).collect();
		let stored = self.providers.index.stored_hashes(&ids).await?;
		let mut survivors = Vec::new();
		let mut inserted = 0;
		let mut updated = 0;
		let mut skipped = 0;

		for (position, (id, hash)) in entries.iter().enumerate() {
			match stored.get(id) {
				Some(existing) if existing == hash => skipped += 1,
				Some(_) => {
					updated += 1;
					survivors.push(position);
				},
				None => {
					inserted += 1;
					survivors.push(position);
				},
			}
		}

		if survivors.is_empty() {
			return Ok((0, 0, skipped));
		}

		let texts: Vec<String> = survivors
			.iter()
			.map(|&position| identity::canonical_content(&batch[position]))
			.collect();
		let embedding_cfg = &self.cfg.providers.embedding;
		let dense = self.providers.embedding.embed_dense(embedding_cfg, &texts).await?;
		let sparse = self.providers.embedding.embed_sparse(embedding_cfg, &texts).await?;

		if dense.len() != survivors.len() || sparse.len() != survivors.len() {
			return Err(Error::Provider {
				message: "Embedding provider returned the wrong number of vectors.".to_string(),
			});
		}

		let mut records = Vec::with_capacity(survivors.len());

		for ((&position, dense), sparse) in survivors.iter().zip(dense).zip(sparse) {
			let (id, hash) = &entries[position];

			records.push(IndexRecord {
				id: *id,
				dense,
				sparse,
				payload: event_payload(&batch[position], hash)?,
			});
		}

		self.providers.index.upsert(records, self.cfg.ingest.wait_on_upsert).await?;

		Ok((inserted, updated, skipped))
	}
}
