//! Ingestion and geo-temporal retrieval orchestration.

pub mod geometry;
pub mod index;
pub mod ingest;
pub mod query;

mod error;

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

pub use error::Error;
pub use index::{HybridQuery, IndexRecord, ScoredHit};
pub use ingest::IngestReport;
pub use query::{QueryMode, QueryRequest, QueryResponse, RankedEvent};

use giro_config::Config;
use giro_providers::{
	Coordinate, SparseVector, embedding,
	geocode::{self, StructuredAddress},
	route,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed_dense<'a>(
		&'a self,
		cfg: &'a giro_config::Embedding,
		texts: &'a [String],
	) -> BoxFuture<'a, giro_providers::Result<Vec<Vec<f32>>>>;

	fn embed_sparse<'a>(
		&'a self,
		cfg: &'a giro_config::Embedding,
		texts: &'a [String],
	) -> BoxFuture<'a, giro_providers::Result<Vec<SparseVector>>>;
}

pub trait GeocodeProvider
where
	Self: Send + Sync,
{
	fn geocode<'a>(
		&'a self,
		cfg: &'a giro_config::Geocoding,
		address: &'a StructuredAddress,
	) -> BoxFuture<'a, giro_providers::Result<Option<Coordinate>>>;
}

pub trait RouteProvider
where
	Self: Send + Sync,
{
	fn directions<'a>(
		&'a self,
		cfg: &'a giro_config::Routing,
		origin: Coordinate,
		destination: Coordinate,
		profile: &'a str,
	) -> BoxFuture<'a, giro_providers::Result<Vec<Coordinate>>>;
}

pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn ensure_ready(&self) -> BoxFuture<'_, Result<()>>;

	fn stored_hashes<'a>(&'a self, ids: &'a [Uuid])
	-> BoxFuture<'a, Result<HashMap<Uuid, String>>>;

	fn upsert(&self, records: Vec<IndexRecord>, wait: bool) -> BoxFuture<'_, Result<()>>;

	fn delete<'a>(&'a self, ids: &'a [Uuid], wait: bool) -> BoxFuture<'a, Result<()>>;

	fn query(&self, request: HybridQuery) -> BoxFuture<'_, Result<Vec<ScoredHit>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub geocoder: Arc<dyn GeocodeProvider>,
	pub router: Arc<dyn RouteProvider>,
	pub index: Arc<dyn VectorIndex>,
}

pub struct GiroService {
	pub cfg: Config,
	pub cache: SqlitePool,
	pub providers: Providers,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed_dense<'a>(
		&'a self,
		cfg: &'a giro_config::Embedding,
		texts: &'a [String],
	) -> BoxFuture<'a, giro_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed_dense(cfg, texts))
	}

	fn embed_sparse<'a>(
		&'a self,
		cfg: &'a giro_config::Embedding,
		texts: &'a [String],
	) -> BoxFuture<'a, giro_providers::Result<Vec<SparseVector>>> {
		Box::pin(embedding::embed_sparse(cfg, texts))
	}
}

impl GeocodeProvider for DefaultProviders {
	fn geocode<'a>(
		&'a self,
		cfg: &'a giro_config::Geocoding,
		address: &'a StructuredAddress,
	) -> BoxFuture<'a, giro_providers::Result<Option<Coordinate>>> {
		Box::pin(async move {
			let client = geocode::client(cfg)?;

			geocode::geocode(cfg, &client, address).await
		})
	}
}

impl RouteProvider for DefaultProviders {
	fn directions<'a>(
		&'a self,
		cfg: &'a giro_config::Routing,
		origin: Coordinate,
		destination: Coordinate,
		profile: &'a str,
	) -> BoxFuture<'a, giro_providers::Result<Vec<Coordinate>>> {
		Box::pin(async move {
			let client = route::client(cfg)?;

			route::directions(cfg, &client, origin, destination, profile).await
		})
	}
}

impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		geocoder: Arc<dyn GeocodeProvider>,
		router: Arc<dyn RouteProvider>,
		index: Arc<dyn VectorIndex>,
	) -> Self {
		Self { embedding, geocoder, router, index }
	}

	/// Live HTTP providers over the given index.
	pub fn live(index: Arc<dyn VectorIndex>) -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), geocoder: provider.clone(), router: provider, index }
	}
}

impl GiroService {
	pub fn new(cfg: Config, cache: SqlitePool, providers: Providers) -> Self {
		Self { cfg, cache, providers }
	}
}
