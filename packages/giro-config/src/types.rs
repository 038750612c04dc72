use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub storage: Storage,
	pub providers: Providers,
	pub ingest: Ingest,
	pub search: Search,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub cache: Cache,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cache {
	pub path: std::path::PathBuf,
	/// Resolved coordinates and routes are assumed geographically stable.
	#[serde(default = "default_cache_ttl_days")]
	pub ttl_days: i64,
	#[serde(default = "default_cache_max_entries")]
	pub max_entries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: Embedding,
	pub geocoding: Geocoding,
	pub routing: Routing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Embedding {
	pub api_base: String,
	pub api_key: String,
	pub dense_path: String,
	pub sparse_path: String,
	pub dense_model: String,
	pub sparse_model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Geocoding {
	pub primary_base: String,
	pub secondary_base: String,
	pub user_agent: String,
	pub region: String,
	pub country: String,
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Routing {
	pub api_base: String,
	pub api_key: String,
	#[serde(default = "default_routing_profile")]
	pub profile: String,
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ingest {
	#[serde(default = "default_batch_size")]
	pub batch_size: u32,
	#[serde(default = "default_geocode_concurrency")]
	pub geocode_concurrency: u32,
	#[serde(default = "default_geocode_delay_ms")]
	pub geocode_delay_ms: u64,
	/// Wait for the index to confirm durability on upsert/delete, or
	/// fire-and-forget. Deployment-level knob; vectors are always full.
	#[serde(default = "default_wait_on_upsert")]
	pub wait_on_upsert: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	#[serde(default = "default_candidate_k")]
	pub candidate_k: u32,
	#[serde(default = "default_limit")]
	pub default_limit: u32,
	#[serde(default = "default_score_threshold")]
	pub score_threshold: f32,
}

fn default_cache_ttl_days() -> i64 {
	90
}

fn default_cache_max_entries() -> u32 {
	10_000
}

fn default_routing_profile() -> String {
	"driving-car".to_string()
}

fn default_batch_size() -> u32 {
	32
}

fn default_geocode_concurrency() -> u32 {
	5
}

fn default_geocode_delay_ms() -> u64 {
	1_000
}

fn default_wait_on_upsert() -> bool {
	true
}

fn default_candidate_k() -> u32 {
	50
}

fn default_limit() -> u32 {
	100
}

fn default_score_threshold() -> f32 {
	0.34
}
