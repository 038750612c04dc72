use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, DatetimeRange, Filter, Fusion, GeoLineString, GeoPoint, GeoPolygon, PointStruct,
	PrefetchQueryBuilder, Query, QueryPointsBuilder, Timestamp, Vector, VectorInput, value::Kind,
};
use time::OffsetDateTime;
use uuid::Uuid;

use giro_providers::{Coordinate, SparseVector};
use giro_storage::{
	payload,
	qdrant::{DENSE_VECTOR_NAME, QdrantStore, SPARSE_VECTOR_NAME},
};

use crate::{BoxFuture, Result, VectorIndex};

/// One event as handed to the index: stable point id, both vector
/// representations, and the payload the filters and responses read.
#[derive(Debug, Clone)]
pub struct IndexRecord {
	pub id: Uuid,
	pub dense: Vec<f32>,
	pub sparse: SparseVector,
	pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct HybridQuery {
	pub dense: Vec<f32>,
	pub sparse: SparseVector,
	/// Closed polygon ring, lon/lat.
	pub area: Vec<Coordinate>,
	pub window_start: OffsetDateTime,
	pub window_end: OffsetDateTime,
	pub candidate_k: u32,
	pub limit: u64,
	/// Similarity floor for the dense side only. The fused score is a
	/// rank score, not a similarity, so it is never thresholded.
	pub score_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct ScoredHit {
	pub id: Uuid,
	pub score: f32,
	pub payload: serde_json::Value,
}

/// Spatial and temporal constraints as one conjunctive filter. The date
/// test is interval overlap: an event already running at the window
/// start still matches.
pub(crate) fn build_filter(query: &HybridQuery) -> Filter {
	let exterior = GeoLineString {
		points: query.area.iter().map(|c| GeoPoint { lon: c.lon, lat: c.lat }).collect(),
	};

	Filter::must([
		Condition::geo_polygon(
			"location",
			GeoPolygon { exterior: Some(exterior), interiors: Vec::new() },
		),
		Condition::datetime_range(
			"start_date",
			DatetimeRange { lte: Some(timestamp(query.window_end)), ..Default::default() },
		),
		Condition::datetime_range(
			"end_date",
			DatetimeRange { gte: Some(timestamp(query.window_start)), ..Default::default() },
		),
	])
}

fn timestamp(ts: OffsetDateTime) -> Timestamp {
	Timestamp { seconds: ts.unix_timestamp(), nanos: ts.nanosecond() as i32 }
}

fn to_point(record: IndexRecord) -> Result<PointStruct> {
	let mut vectors = HashMap::new();

	vectors.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(record.dense));
	vectors.insert(
		SPARSE_VECTOR_NAME.to_string(),
		Vector::new_sparse(record.sparse.indices, record.sparse.values),
	);

	let payload = payload::json_to_payload(record.payload)?;

	Ok(PointStruct::new(record.id.to_string(), vectors, payload))
}

impl VectorIndex for QdrantStore {
	fn ensure_ready(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move { Ok(self.ensure_collection().await?) })
	}

	fn stored_hashes<'a>(
		&'a self,
		ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<HashMap<Uuid, String>>> {
		Box::pin(async move {
			let points = self.get_points(ids).await?;
			let mut hashes = HashMap::with_capacity(points.len());

			for point in points {
				let Some(id) = point.id.as_ref().and_then(payload::point_id_to_uuid) else {
					continue;
				};
				let Some(Kind::StringValue(hash)) =
					point.payload.get("hash").and_then(|value| value.kind.clone())
				else {
					continue;
				};

				hashes.insert(id, hash);
			}

			Ok(hashes)
		})
	}

	fn upsert(&self, records: Vec<IndexRecord>, wait: bool) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			let points = records.into_iter().map(to_point).collect::<Result<Vec<_>>>()?;

			Ok(self.upsert_points(points, wait).await?)
		})
	}

	fn delete<'a>(&'a self, ids: &'a [Uuid], wait: bool) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(self.delete_points(ids, wait).await?) })
	}

	fn query(&self, request: HybridQuery) -> BoxFuture<'_, Result<Vec<ScoredHit>>> {
		Box::pin(async move {
			let filter = build_filter(&request);
			let dense_prefetch = PrefetchQueryBuilder::default()
				.query(Query::new_nearest(request.dense.clone()))
				.using(DENSE_VECTOR_NAME)
				.filter(filter.clone())
				.limit(request.candidate_k as u64)
				.score_threshold(request.score_threshold);
			let sparse_prefetch = PrefetchQueryBuilder::default()
				.query(Query::new_nearest(VectorInput::new_sparse(
					request.sparse.indices.clone(),
					request.sparse.values.clone(),
				)))
				.using(SPARSE_VECTOR_NAME)
				.filter(filter)
				.limit(request.candidate_k as u64);
			let search = QueryPointsBuilder::new(self.collection.clone())
				.add_prefetch(dense_prefetch)
				.add_prefetch(sparse_prefetch)
				.query(Fusion::Rrf)
				.with_payload(true)
				.limit(request.limit);
			let response = self.client.query(search).await.map_err(giro_storage::Error::from)?;
			let hits = response
				.result
				.into_iter()
				.filter_map(|point| {
					let id = point.id.as_ref().and_then(payload::point_id_to_uuid)?;

					Some(ScoredHit {
						id,
						score: point.score,
						payload: payload::payload_to_json(&point.payload),
					})
				})
				.collect();

			Ok(hits)
		})
	}
}
