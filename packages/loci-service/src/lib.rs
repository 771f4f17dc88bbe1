pub mod explain;
pub mod photos;
pub mod ranker;
pub mod search;
pub mod semantic;

mod error;

pub use error::{Error, Result};
pub use explain::{ExplainResponse, PlanSummary};
pub use search::{
	Diagnostics, LocationReport, ScoreDetail, SearchData, SearchResponse, SearchStatus,
	SemanticSearchReport, SemanticStatus,
};
pub use semantic::{HttpEmbedding, QdrantSemanticIndex};

use std::{future::Future, pin::Pin, sync::Arc};

use loci_config::{Config, EmbeddingProviderConfig};
use loci_domain::{
	assemble::AssembledQuery,
	plan::{Planner, PlannerSettings},
	score::{ScoreWeights, SemanticHit},
};
use loci_storage::db::{Db, FetchedRows};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes assembled relational queries.
pub trait RelationalStore
where
	Self: Send + Sync,
{
	fn fetch<'a>(&'a self, query: &'a AssembledQuery) -> BoxFuture<'a, Result<FetchedRows>>;

	fn count<'a>(&'a self, query: &'a AssembledQuery) -> BoxFuture<'a, Result<u64>>;
}

/// Similarity search restricted to a set of place IDs.
pub trait SemanticIndex
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, text: &'a str, ids: &'a [i64])
	-> BoxFuture<'a, Result<SemanticOutcome>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

#[derive(Clone, Debug, PartialEq)]
pub enum SemanticOutcome {
	/// The index cannot answer yet. Callers fall back to relational ordering.
	NotReady,
	Ready(Vec<SemanticHit>),
}

pub struct LociService {
	pub cfg: Config,
	pub planner: Planner,
	pub weights: ScoreWeights,
	pub relational: Arc<dyn RelationalStore>,
	pub semantic: Arc<dyn SemanticIndex>,
}
impl LociService {
	pub fn new(
		cfg: Config,
		relational: Arc<dyn RelationalStore>,
		semantic: Arc<dyn SemanticIndex>,
	) -> Self {
		let planner = Planner::new(PlannerSettings::from(&cfg.search));
		let weights = ScoreWeights::from(&cfg.ranking);

		Self { cfg, planner, weights, relational, semantic }
	}
}

impl RelationalStore for Db {
	fn fetch<'a>(&'a self, query: &'a AssembledQuery) -> BoxFuture<'a, Result<FetchedRows>> {
		Box::pin(async move { Ok(Db::fetch(self, query).await?) })
	}

	fn count<'a>(&'a self, query: &'a AssembledQuery) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(Db::count(self, query).await?) })
	}
}
