use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use giro_providers::{Coordinate, geocode::StructuredAddress};
use giro_storage::cache::{self, CacheKind};

use crate::{Error, GiroService, HybridQuery, Result, ScoredHit, geometry};

#[derive(Debug, Clone)]
pub struct QueryRequest {
	/// Origin address text; always required.
	pub origin: String,
	/// Destination address; present (and non-blank) means route mode.
	pub destination: Option<String>,
	pub buffer_km: f64,
	pub window_start: OffsetDateTime,
	pub window_end: OffsetDateTime,
	/// Free text. Blank is valid and means pure geo-temporal browsing.
	pub text: String,
	pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
	Point,
	Route,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedEvent {
	pub id: Uuid,
	pub score: f32,
	pub event: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
	pub mode: QueryMode,
	pub origin: Coordinate,
	pub destination: Option<Coordinate>,
	/// Route polyline, empty in point mode.
	pub route: Vec<Coordinate>,
	/// Closed ring of the searched area, lon/lat.
	pub corridor: Vec<Coordinate>,
	pub events: Vec<RankedEvent>,
}

fn validate(request: &QueryRequest) -> Result<()> {
	if request.origin.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "Origin address must be non-empty.".to_string() });
	}
	if !request.buffer_km.is_finite() || request.buffer_km <= 0.0 {
		return Err(Error::InvalidRequest { message: "Buffer must be a positive distance.".to_string() });
	}
	if request.window_start >= request.window_end {
		return Err(Error::InvalidRequest {
			message: "Date window start must precede its end.".to_string(),
		});
	}

	Ok(())
}

/// Free-form address split for the structured geocoder: everything after
/// the last comma is treated as the city.
fn split_address(address: &str) -> StructuredAddress {
	match address.rsplit_once(',') {
		Some((street, city)) => StructuredAddress {
			street: street.trim().to_string(),
			city: city.trim().to_string(),
		},
		None => StructuredAddress { street: address.trim().to_string(), city: String::new() },
	}
}

fn hit_coordinate(payload: &serde_json::Value) -> Option<Coordinate> {
	let location = payload.get("location")?;

	Some(Coordinate { lon: location.get("lon")?.as_f64()?, lat: location.get("lat")?.as_f64()? })
}

/// Re-sort the fused hits spatially, overriding similarity order: by
/// progress along the route in route mode, by distance from the origin
/// in point mode. Hits without coordinates sort last.
fn rank_hits(
	mode: QueryMode,
	origin: Coordinate,
	route: &[Coordinate],
	hits: Vec<ScoredHit>,
) -> Vec<RankedEvent> {
	let line = (mode == QueryMode::Route).then(|| geometry::route_line(route));
	let mut ranked: Vec<(f64, RankedEvent)> = hits
		.into_iter()
		.map(|hit| {
			let position = hit_coordinate(&hit.payload);
			let key = match (&line, position) {
				(Some(line), Some(c)) => geometry::route_progress(line, c),
				(None, Some(c)) => geometry::haversine_m(origin, c),
				(_, None) => f64::INFINITY,
			};

			(key, RankedEvent { id: hit.id, score: hit.score, event: hit.payload })
		})
		.collect();

	ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

	ranked.into_iter().map(|(_, event)| event).collect()
}

impl GiroService {
	/// Geo-temporal hybrid search. Validation happens before any network
	/// call; address resolution and routing go through the lookup cache.
	pub async fn search(&self, request: QueryRequest) -> Result<QueryResponse> {
		validate(&request)?;

		let origin = self.resolve_address(&request.origin).await?;
		let buffer_m = request.buffer_km * 1_000.0;
		let (mode, destination, route, corridor) = match request.destination.as_deref() {
			Some(destination_address) if !destination_address.trim().is_empty() => {
				let destination = self.resolve_address(destination_address).await?;
				let route = self.resolve_route(origin, destination).await?;
				let corridor = geometry::corridor(&route, buffer_m);

				(QueryMode::Route, Some(destination), route, corridor)
			},
			_ => (QueryMode::Point, None, Vec::new(), geometry::point_buffer(origin, buffer_m)),
		};
		let text = request.text.trim().to_string();
		let score_threshold = if text.is_empty() { 0.0 } else { self.cfg.search.score_threshold };
		let texts = vec![text];
		let embedding_cfg = &self.cfg.providers.embedding;
		let dense = self.providers.embedding.embed_dense(embedding_cfg, &texts).await?;
		let sparse = self.providers.embedding.embed_sparse(embedding_cfg, &texts).await?;
		let (Some(dense), Some(sparse)) = (dense.into_iter().next(), sparse.into_iter().next())
		else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};
		let hits = self
			.providers
			.index
			.query(HybridQuery {
				dense,
				sparse,
				area: corridor.clone(),
				window_start: request.window_start,
				window_end: request.window_end,
				candidate_k: self.cfg.search.candidate_k,
				limit: request.limit.unwrap_or(self.cfg.search.default_limit) as u64,
				score_threshold,
			})
			.await?;
		let events = rank_hits(mode, origin, &route, hits);

		Ok(QueryResponse { mode, origin, destination, route, corridor, events })
	}

	/// Address to coordinate through the cache, then the geocoding
	/// fallback chain. Exhaustion is an explicit error, never a null
	/// coordinate; misses are not cached.
	async fn resolve_address(&self, address: &str) -> Result<Coordinate> {
		let key = cache::cache_key(&[address]);

		match cache::lookup::<Coordinate>(&self.cache, CacheKind::Geocode, &key).await {
			Ok(Some(coordinate)) => return Ok(coordinate),
			Ok(None) => {},
			Err(err) => {
				tracing::warn!(error = %err, "Geocode cache lookup failed; calling the provider.");
			},
		}

		let query = split_address(address);
		let resolved =
			self.providers.geocoder.geocode(&self.cfg.providers.geocoding, &query).await?;
		let Some(coordinate) = resolved else {
			return Err(Error::UnresolvableAddress { address: address.to_string() });
		};

		if let Err(err) = cache::store(
			&self.cache,
			CacheKind::Geocode,
			&key,
			&coordinate,
			self.cfg.storage.cache.ttl_days * 86_400,
			self.cfg.storage.cache.max_entries,
		)
		.await
		{
			tracing::warn!(error = %err, "Failed to cache a geocoding result.");
		}

		Ok(coordinate)
	}

	async fn resolve_route(
		&self,
		origin: Coordinate,
		destination: Coordinate,
	) -> Result<Vec<Coordinate>> {
		let profile = self.cfg.providers.routing.profile.clone();
		let key = cache::cache_key(&[
			&format!("{:.6},{:.6}", origin.lon, origin.lat),
			&format!("{:.6},{:.6}", destination.lon, destination.lat),
			&profile,
		]);
		let cached: Option<Vec<Coordinate>> =
			match cache::lookup(&self.cache, CacheKind::Route, &key).await {
				Ok(route) => route,
				Err(err) => {
					tracing::warn!(
						error = %err,
						"Route cache lookup failed; calling the provider."
					);

					None
				},
			};
		let (route, fresh) = match cached {
			Some(route) => (route, false),
			None => {
				let route = self
					.providers
					.router
					.directions(&self.cfg.providers.routing, origin, destination, &profile)
					.await?;

				(route, true)
			},
		};

		if route.len() < 2 || route.iter().all(|c| (c.lon, c.lat) == (route[0].lon, route[0].lat))
		{
			return Err(Error::InvalidRequest {
				message: "Route between the points is degenerate.".to_string(),
			});
		}
		if fresh && let Err(err) = cache::store(
			&self.cache,
			CacheKind::Route,
			&key,
			&route,
			self.cfg.storage.cache.ttl_days * 86_400,
			self.cfg.storage.cache.max_entries,
		)
		.await
		{
			tracing::warn!(error = %err, "Failed to cache a route.");
		}

		Ok(route)
	}
}
