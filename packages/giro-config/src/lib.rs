mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, Embedding, Geocoding, Ingest, Providers, Qdrant, Routing, Search, Storage,
};

use std::path::Path;

pub fn load(path: &Path) -> Result<Config> {
	let raw = std::fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.qdrant.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.qdrant.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.cache.ttl_days <= 0 {
		return Err(Error::Validation {
			message: "storage.cache.ttl_days must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.cache.max_entries == 0 {
		return Err(Error::Validation {
			message: "storage.cache.max_entries must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if !(16..=32).contains(&cfg.ingest.batch_size) {
		return Err(Error::Validation {
			message: "ingest.batch_size must be in the range 16-32.".to_string(),
		});
	}
	if cfg.ingest.geocode_concurrency == 0 {
		return Err(Error::Validation {
			message: "ingest.geocode_concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.search.candidate_k == 0 {
		return Err(Error::Validation {
			message: "search.candidate_k must be greater than zero.".to_string(),
		});
	}
	if cfg.search.default_limit == 0 {
		return Err(Error::Validation {
			message: "search.default_limit must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.score_threshold.is_finite() || cfg.search.score_threshold < 0.0 {
		return Err(Error::Validation {
			message: "search.score_threshold must be zero or greater.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for base in [
		&mut cfg.storage.qdrant.url,
		&mut cfg.providers.embedding.api_base,
		&mut cfg.providers.geocoding.primary_base,
		&mut cfg.providers.geocoding.secondary_base,
		&mut cfg.providers.routing.api_base,
	] {
		while base.ends_with('/') {
			base.pop();
		}
	}
}
