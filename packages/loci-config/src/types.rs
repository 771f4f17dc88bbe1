use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub search: Search,
	pub semantic: Semantic,
	#[serde(default)]
	pub ranking: Ranking,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Search {
	#[serde(default = "default_page_size")]
	pub default_page_size: u32,
	#[serde(default = "default_max_page_size")]
	pub max_page_size: u32,
	/// Upper bound on relational candidates handed to the semantic ranker.
	#[serde(default = "default_candidate_limit")]
	pub candidate_limit: u32,
	/// Base URL for synthesized photo links. Empty disables photo enrichment.
	#[serde(default)]
	pub images_url: String,
	#[serde(default)]
	pub default_location: DefaultLocation,
}

/// Reference point used when a request needs distance but supplies no coordinate.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct DefaultLocation {
	pub lat: f64,
	pub lng: f64,
}
impl Default for DefaultLocation {
	fn default() -> Self {
		// Taipei Main Station.
		Self { lat: 25.0478, lng: 121.5170 }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Semantic {
	pub enabled: bool,
	pub timeout_ms: u64,
	pub score_threshold: Option<f32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Ranking {
	#[serde(default = "default_semantic_weight")]
	pub semantic_weight: f32,
	#[serde(default = "default_rating_weight")]
	pub rating_weight: f32,
	#[serde(default = "default_popularity_weight")]
	pub popularity_weight: f32,
	#[serde(default = "default_rating_scale")]
	pub rating_scale: f32,
}
impl Default for Ranking {
	fn default() -> Self {
		Self {
			semantic_weight: default_semantic_weight(),
			rating_weight: default_rating_weight(),
			popularity_weight: default_popularity_weight(),
			rating_scale: default_rating_scale(),
		}
	}
}

fn default_page_size() -> u32 {
	10
}

fn default_max_page_size() -> u32 {
	50
}

fn default_candidate_limit() -> u32 {
	200
}

fn default_semantic_weight() -> f32 {
	0.6
}

fn default_rating_weight() -> f32 {
	0.3
}

fn default_popularity_weight() -> f32 {
	0.1
}

fn default_rating_scale() -> f32 {
	5.0
}
