//! End-to-end orchestration tests over fake providers and an in-memory
//! index; no network service is involved.

use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use time::macros::datetime;
use uuid::Uuid;

use giro_config::Config;
use giro_domain::{EventRecord, Location, compute_keyed_delta};
use giro_providers::{Coordinate, SparseVector, geocode::StructuredAddress};
use giro_service::{
	BoxFuture, EmbeddingProvider, Error, GeocodeProvider, GiroService, HybridQuery, IndexRecord,
	Providers, QueryMode, QueryRequest, Result, RouteProvider, ScoredHit, VectorIndex,
};
use giro_storage::db;

const ORIGIN: Coordinate = Coordinate { lon: 11.8768, lat: 45.4064 };

fn config() -> Config {
	Config {
		storage: giro_config::Storage {
			cache: giro_config::Cache { path: "unused.db".into(), ttl_days: 90, max_entries: 100 },
			qdrant: giro_config::Qdrant {
				url: "http://localhost:6334".to_string(),
				collection: "events".to_string(),
				vector_dim: 4,
			},
		},
		providers: giro_config::Providers {
			embedding: giro_config::Embedding {
				api_base: "http://embedding.test".to_string(),
				api_key: "k".to_string(),
				dense_path: "/v1/embeddings".to_string(),
				sparse_path: "/v1/sparse".to_string(),
				dense_model: "dense-test".to_string(),
				sparse_model: "sparse-test".to_string(),
				dimensions: 4,
				timeout_ms: 1_000,
			},
			geocoding: giro_config::Geocoding {
				primary_base: "http://geo.test".to_string(),
				secondary_base: "http://geo2.test".to_string(),
				user_agent: "giro-tests".to_string(),
				region: "Veneto".to_string(),
				country: "Italy".to_string(),
				timeout_ms: 1_000,
			},
			routing: giro_config::Routing {
				api_base: "http://route.test".to_string(),
				api_key: "k".to_string(),
				profile: "driving-car".to_string(),
				timeout_ms: 1_000,
			},
		},
		ingest: giro_config::Ingest {
			batch_size: 16,
			geocode_concurrency: 2,
			geocode_delay_ms: 0,
			wait_on_upsert: true,
		},
		search: giro_config::Search { candidate_k: 50, default_limit: 100, score_threshold: 0.34 },
	}
}

fn record(id: &str, title: &str, coordinate: Option<Coordinate>) -> EventRecord {
	EventRecord {
		id: id.to_string(),
		title: title.to_string(),
		category: "festival".to_string(),
		description: format!("{title} in town"),
		city: "Padova".to_string(),
		location: Location {
			venue: "Piazza dei Signori".to_string(),
			address: String::new(),
			latitude: coordinate.map(|c| c.lat),
			longitude: coordinate.map(|c| c.lon),
		},
		start_date: Some(datetime!(2025-06-10 18:00 UTC)),
		end_date: Some(datetime!(2025-06-12 23:00 UTC)),
		url: None,
		credits: "city feed".to_string(),
		image_url: None,
		delta_type: None,
	}
}

#[derive(Default)]
struct FakeEmbedder {
	calls: AtomicUsize,
	fail_on: Option<String>,
}
impl FakeEmbedder {
	fn check(&self, texts: &[String]) -> giro_providers::Result<()> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		if let Some(marker) = &self.fail_on
			&& texts.iter().any(|text| text.contains(marker))
		{
			return Err(giro_providers::Error::InvalidResponse {
				message: "forced embedding failure".to_string(),
			});
		}

		Ok(())
	}
}
impl EmbeddingProvider for FakeEmbedder {
	fn embed_dense<'a>(
		&'a self,
		_cfg: &'a giro_config::Embedding,
		texts: &'a [String],
	) -> BoxFuture<'a, giro_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			self.check(texts)?;

			Ok(texts
				.iter()
				.map(|text| {
					let sum = text.bytes().map(u32::from).sum::<u32>() as f32;

					vec![sum, 1.0, 0.0, 0.0]
				})
				.collect())
		})
	}

	fn embed_sparse<'a>(
		&'a self,
		_cfg: &'a giro_config::Embedding,
		texts: &'a [String],
	) -> BoxFuture<'a, giro_providers::Result<Vec<SparseVector>>> {
		Box::pin(async move {
			self.check(texts)?;

			Ok(texts
				.iter()
				.map(|text| SparseVector {
					indices: vec![text.len() as u32],
					values: vec![1.0],
				})
				.collect())
		})
	}
}

/// Pops scripted answers front-first; once the script is exhausted every
/// lookup resolves to the origin square.
#[derive(Default)]
struct FakeGeocoder {
	calls: AtomicUsize,
	script: Mutex<Vec<Option<Coordinate>>>,
}
impl GeocodeProvider for FakeGeocoder {
	fn geocode<'a>(
		&'a self,
		_cfg: &'a giro_config::Geocoding,
		_address: &'a StructuredAddress,
	) -> BoxFuture<'a, giro_providers::Result<Option<Coordinate>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let mut script = self.script.lock().expect("script lock");

			if script.is_empty() { Ok(Some(ORIGIN)) } else { Ok(script.remove(0)) }
		})
	}
}

#[derive(Default)]
struct FakeRouter {
	calls: AtomicUsize,
}
impl RouteProvider for FakeRouter {
	fn directions<'a>(
		&'a self,
		_cfg: &'a giro_config::Routing,
		origin: Coordinate,
		destination: Coordinate,
		_profile: &'a str,
	) -> BoxFuture<'a, giro_providers::Result<Vec<Coordinate>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Ok(vec![origin, destination])
		})
	}
}

#[derive(Default)]
struct FakeIndex {
	points: Mutex<HashMap<Uuid, (String, serde_json::Value)>>,
}
impl FakeIndex {
	fn len(&self) -> usize {
		self.points.lock().expect("points lock").len()
	}

	fn contains(&self, id: Uuid) -> bool {
		self.points.lock().expect("points lock").contains_key(&id)
	}

	fn payload_of(&self, id: Uuid) -> Option<serde_json::Value> {
		self.points.lock().expect("points lock").get(&id).map(|(_, payload)| payload.clone())
	}
}
impl VectorIndex for FakeIndex {
	fn ensure_ready(&self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async { Ok(()) })
	}

	fn stored_hashes<'a>(
		&'a self,
		ids: &'a [Uuid],
	) -> BoxFuture<'a, Result<HashMap<Uuid, String>>> {
		Box::pin(async move {
			let points = self.points.lock().expect("points lock");

			Ok(ids
				.iter()
				.filter_map(|id| points.get(id).map(|(hash, _)| (*id, hash.clone())))
				.collect())
		})
	}

	fn upsert(&self, records: Vec<IndexRecord>, _wait: bool) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			let mut points = self.points.lock().expect("points lock");

			for record in records {
				let hash = record.payload["hash"].as_str().unwrap_or_default().to_string();

				points.insert(record.id, (hash, record.payload));
			}

			Ok(())
		})
	}

	fn delete<'a>(&'a self, ids: &'a [Uuid], _wait: bool) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut points = self.points.lock().expect("points lock");

			for id in ids {
				points.remove(id);
			}

			Ok(())
		})
	}

	fn query(&self, _request: HybridQuery) -> BoxFuture<'_, Result<Vec<ScoredHit>>> {
		Box::pin(async move {
			let points = self.points.lock().expect("points lock");

			Ok(points
				.iter()
				.map(|(id, (_, payload))| ScoredHit {
					id: *id,
					score: 1.0,
					payload: payload.clone(),
				})
				.collect())
		})
	}
}

struct Harness {
	service: GiroService,
	embedder: Arc<FakeEmbedder>,
	geocoder: Arc<FakeGeocoder>,
	router: Arc<FakeRouter>,
	index: Arc<FakeIndex>,
}

async fn harness_with(embedder: FakeEmbedder, geocoder: FakeGeocoder) -> Harness {
	let embedder = Arc::new(embedder);
	let geocoder = Arc::new(geocoder);
	let router = Arc::new(FakeRouter::default());
	let index = Arc::new(FakeIndex::default());
	let providers = Providers::new(
		embedder.clone(),
		geocoder.clone(),
		router.clone(),
		index.clone(),
	);
	let cache = db::connect_in_memory().await.expect("pool");

	Harness {
		service: GiroService::new(config(), cache, providers),
		embedder,
		geocoder,
		router,
		index,
	}
}

async fn harness() -> Harness {
	harness_with(FakeEmbedder::default(), FakeGeocoder::default()).await
}

fn derived_id(record: &EventRecord) -> Uuid {
	giro_domain::identity::derive_point_id(&record.id)
}

#[tokio::test]
async fn reingesting_an_identical_snapshot_is_a_no_op() {
	let harness = harness().await;
	let snapshot =
		vec![record("ev-1", "Sagra", Some(ORIGIN)), record("ev-2", "Concerto", Some(ORIGIN))];

	let first = harness.service.ingest(snapshot.clone()).await.expect("first run");

	assert_eq!(first.inserted, 2);
	assert_eq!(first.skipped_unchanged, 0);

	let embed_calls = harness.embedder.calls.load(Ordering::SeqCst);
	let second = harness.service.ingest(snapshot).await.expect("second run");

	assert_eq!(second.inserted, 0);
	assert_eq!(second.updated, 0);
	assert_eq!(second.skipped_unchanged, 2);
	// Unchanged records are skipped before any embedding work.
	assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), embed_calls);
	assert_eq!(harness.index.len(), 2);
}

#[tokio::test]
async fn delta_flow_applies_adds_changes_and_removals() {
	let harness = harness().await;
	let previous = vec![
		record("ev-1", "Sagra", Some(ORIGIN)),
		record("ev-2", "Concerto", Some(ORIGIN)),
		record("ev-3", "Mostra", Some(ORIGIN)),
	];
	let bootstrap = compute_keyed_delta(None, &previous);

	harness.service.ingest(bootstrap.records).await.expect("bootstrap run");
	assert_eq!(harness.index.len(), 3);

	let current = vec![
		record("ev-2", "Concerto in piazza", Some(ORIGIN)),
		record("ev-3", "Mostra", Some(ORIGIN)),
		record("ev-4", "Palio", Some(ORIGIN)),
	];
	let delta = compute_keyed_delta(Some(&previous), &current);
	let report = harness.service.ingest(delta.records).await.expect("delta run");

	assert_eq!(report.inserted, 1);
	assert_eq!(report.updated, 1);
	assert_eq!(report.deleted, 1);
	assert_eq!(harness.index.len(), 3);
	assert!(!harness.index.contains(derived_id(&previous[0])));
	assert!(harness.index.contains(derived_id(&current[2])));
}

#[tokio::test]
async fn rescheduling_an_event_replaces_its_point_in_place() {
	let harness = harness().await;
	let previous = vec![record("ev-1", "Sagra", Some(ORIGIN))];

	harness.service.ingest(previous.clone()).await.expect("first run");

	let mut rescheduled = record("ev-1", "Sagra", Some(ORIGIN));

	rescheduled.start_date = Some(datetime!(2025-07-10 18:00 UTC));
	rescheduled.end_date = Some(datetime!(2025-07-12 23:00 UTC));

	let current = vec![rescheduled];
	let delta = compute_keyed_delta(Some(&previous), &current);
	let report = harness.service.ingest(delta.records).await.expect("delta run");

	assert_eq!(report.updated, 1);
	assert_eq!(report.inserted, 0);
	// The moved date must not leave a stale point under a second id.
	assert_eq!(harness.index.len(), 1);

	let payload = harness.index.payload_of(derived_id(&current[0])).expect("payload");

	assert_eq!(payload["start_date"], "2025-07-10T18:00:00Z");
}

#[tokio::test]
async fn a_failing_batch_does_not_abort_the_run() {
	let embedder =
		FakeEmbedder { fail_on: Some("poison".to_string()), ..FakeEmbedder::default() };
	let harness = harness_with(embedder, FakeGeocoder::default()).await;
	let mut snapshot = Vec::new();

	for idx in 0..32 {
		let title = if idx == 3 { "poison pill".to_string() } else { format!("Evento {idx}") };

		snapshot.push(record(&format!("ev-{idx}"), &title, Some(ORIGIN)));
	}

	let report = harness.service.ingest(snapshot).await.expect("run");

	// Batch size is 16: the first batch fails on the marker, the second
	// one lands in full.
	assert_eq!(report.inserted, 16);
	assert_eq!(harness.index.len(), 16);
}

#[tokio::test]
async fn geocode_misses_are_retried_and_hits_are_cached() {
	let geocoder = FakeGeocoder {
		script: Mutex::new(vec![None, Some(ORIGIN)]),
		..FakeGeocoder::default()
	};
	let harness = harness_with(FakeEmbedder::default(), geocoder).await;
	let id = derived_id(&record("ev-1", "Sagra", None));

	harness.service.ingest(vec![record("ev-1", "Sagra", None)]).await.expect("first run");
	assert_eq!(harness.geocoder.calls.load(Ordering::SeqCst), 1);
	// The miss was not cached and the record was indexed without a location.
	assert!(harness.index.payload_of(id).expect("payload").get("location").is_none());

	let mut changed = record("ev-1", "Sagra", None);

	changed.description = "new description".to_string();
	harness.service.ingest(vec![changed.clone()]).await.expect("second run");
	assert_eq!(harness.geocoder.calls.load(Ordering::SeqCst), 2);
	assert!(harness.index.payload_of(id).expect("payload").get("location").is_some());

	changed.description = "another description".to_string();
	harness.service.ingest(vec![changed]).await.expect("third run");
	// The hit from the second run came out of the cache this time.
	assert_eq!(harness.geocoder.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn keyless_records_never_match_previous_runs() {
	let harness = harness().await;
	let keyless = record("", "Evento senza chiave", Some(ORIGIN));

	let first = harness.service.ingest(vec![keyless.clone()]).await.expect("first run");
	let second = harness.service.ingest(vec![keyless]).await.expect("second run");

	assert_eq!(first.inserted, 1);
	assert_eq!(second.inserted, 1);
	assert_eq!(second.skipped_unchanged, 0);
	assert_eq!(harness.index.len(), 2);
}

#[tokio::test]
async fn invalid_requests_fail_before_any_provider_call() {
	let harness = harness().await;
	let request = QueryRequest {
		origin: "Prato della Valle, Padova".to_string(),
		destination: None,
		buffer_km: 0.0,
		window_start: datetime!(2025-06-01 00:00 UTC),
		window_end: datetime!(2025-06-30 00:00 UTC),
		text: String::new(),
		limit: None,
	};

	let err = harness.service.search(request).await.expect_err("must fail");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(harness.geocoder.calls.load(Ordering::SeqCst), 0);
	assert_eq!(harness.router.calls.load(Ordering::SeqCst), 0);
	assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn point_search_returns_events_nearest_first() {
	let harness = harness().await;
	let km = 1.0 / 78.6; // degrees of longitude per km at this latitude
	let snapshot = vec![
		record("ev-far", "Sagra", Some(Coordinate { lon: ORIGIN.lon + 3.0 * km, ..ORIGIN })),
		record("ev-near", "Sagra", Some(Coordinate { lon: ORIGIN.lon + 1.0 * km, ..ORIGIN })),
		record("ev-mid", "Sagra", Some(Coordinate { lon: ORIGIN.lon + 2.0 * km, ..ORIGIN })),
	];

	harness.service.ingest(snapshot).await.expect("ingest");

	let request = QueryRequest {
		origin: "Prato della Valle, Padova".to_string(),
		destination: None,
		buffer_km: 5.0,
		window_start: datetime!(2025-06-01 00:00 UTC),
		window_end: datetime!(2025-06-30 00:00 UTC),
		text: "sagra".to_string(),
		limit: None,
	};
	let response = harness.service.search(request).await.expect("search");

	assert_eq!(response.mode, QueryMode::Point);
	assert_eq!(response.origin, ORIGIN);
	assert!(response.route.is_empty());
	assert_eq!(response.corridor.first(), response.corridor.last());
	assert!(response.corridor.len() > 8);

	let order: Vec<String> = response
		.events
		.iter()
		.map(|event| event.event["event_id"].as_str().unwrap_or_default().to_string())
		.collect();

	assert_eq!(order, vec!["ev-near", "ev-mid", "ev-far"]);
}

#[tokio::test]
async fn route_search_carries_the_route_and_reuses_the_cached_one() {
	let venezia = Coordinate { lon: 12.3155, lat: 45.4408 };
	// Origin resolves first, then the destination.
	let geocoder = FakeGeocoder {
		script: Mutex::new(vec![Some(ORIGIN), Some(venezia)]),
		..FakeGeocoder::default()
	};
	let harness = harness_with(FakeEmbedder::default(), geocoder).await;

	harness
		.service
		.ingest(vec![record("ev-1", "Sagra", Some(ORIGIN))])
		.await
		.expect("ingest");

	let request = QueryRequest {
		origin: "Padova".to_string(),
		destination: Some("Venezia".to_string()),
		buffer_km: 2.0,
		window_start: datetime!(2025-06-01 00:00 UTC),
		window_end: datetime!(2025-06-30 00:00 UTC),
		text: String::new(),
		limit: Some(10),
	};
	let response = harness.service.search(request.clone()).await.expect("search");

	assert_eq!(response.mode, QueryMode::Route);
	assert_eq!(response.route.len(), 2);
	assert!(response.destination.is_some());
	assert_eq!(harness.router.calls.load(Ordering::SeqCst), 1);

	harness.service.search(request).await.expect("second search");
	// Same endpoints and profile resolve from the route cache.
	assert_eq!(harness.router.calls.load(Ordering::SeqCst), 1);
}
