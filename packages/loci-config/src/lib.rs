mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, DefaultLocation, EmbeddingProviderConfig, Postgres, Providers, Qdrant, Ranking,
	Search, Semantic, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.qdrant.url", &cfg.storage.qdrant.url),
		("storage.qdrant.collection", &cfg.storage.qdrant.collection),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
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
	if cfg.semantic.enabled && cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty when semantic.enabled is true."
				.to_string(),
		});
	}
	if cfg.semantic.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "semantic.timeout_ms must be greater than zero.".to_string(),
		});
	}

	if let Some(threshold) = cfg.semantic.score_threshold
		&& !(0.0..=1.0).contains(&threshold)
	{
		return Err(Error::Validation {
			message: "semantic.score_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}

	if cfg.search.default_page_size == 0 {
		return Err(Error::Validation {
			message: "search.default_page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_page_size == 0 {
		return Err(Error::Validation {
			message: "search.max_page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.search.default_page_size > cfg.search.max_page_size {
		return Err(Error::Validation {
			message: "search.default_page_size must be less than or equal to search.max_page_size."
				.to_string(),
		});
	}
	if cfg.search.candidate_limit == 0 {
		return Err(Error::Validation {
			message: "search.candidate_limit must be greater than zero.".to_string(),
		});
	}

	let location = cfg.search.default_location;

	if !(-90.0..=90.0).contains(&location.lat) || !(-180.0..=180.0).contains(&location.lng) {
		return Err(Error::Validation {
			message: "search.default_location must be a valid latitude and longitude.".to_string(),
		});
	}

	for (label, weight) in [
		("ranking.semantic_weight", cfg.ranking.semantic_weight),
		("ranking.rating_weight", cfg.ranking.rating_weight),
		("ranking.popularity_weight", cfg.ranking.popularity_weight),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	if !cfg.ranking.rating_scale.is_finite() || cfg.ranking.rating_scale <= 0.0 {
		return Err(Error::Validation {
			message: "ranking.rating_scale must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let images_url = cfg.search.images_url.trim();

	if images_url.len() != cfg.search.images_url.len() {
		cfg.search.images_url = images_url.to_string();
	}
	if !cfg.search.images_url.is_empty() && !cfg.search.images_url.ends_with('/') {
		cfg.search.images_url.push('/');
	}

	cfg.service.log_level = cfg.service.log_level.trim().to_string();
}
