use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time;

use loci_domain::score::{self, HybridCandidate, ScoreWeights};

use crate::{SemanticIndex, SemanticOutcome};

/// Re-ranks relational candidates with restricted similarity search.
pub struct Ranker<'a> {
	pub index: &'a dyn SemanticIndex,
	pub weights: ScoreWeights,
	pub timeout: Duration,
}
impl Ranker<'_> {
	/// Returns `None` when the semantic stage could not run, which callers must not confuse with
	/// `Some(vec![])` (ran, nothing matched).
	pub async fn rank(
		&self,
		query_text: &str,
		rows: &[Map<String, Value>],
		top_k: usize,
	) -> Option<Vec<HybridCandidate>> {
		if rows.is_empty() {
			return Some(Vec::new());
		}

		let ids = rows.iter().filter_map(score::row_id).collect::<Vec<_>>();

		match time::timeout(self.timeout, self.index.search(query_text, &ids)).await {
			Ok(Ok(SemanticOutcome::Ready(hits))) => {
				tracing::debug!(
					candidates = ids.len(),
					hits = hits.len(),
					"Semantic search finished."
				);

				Some(score::fuse(rows, &hits, &self.weights, top_k))
			},
			Ok(Ok(SemanticOutcome::NotReady)) => {
				tracing::warn!("Semantic index is not ready.");

				None
			},
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Semantic search failed.");

				None
			},
			Err(_) => {
				tracing::warn!(
					timeout_ms = self.timeout.as_millis() as u64,
					"Semantic search timed out."
				);

				None
			},
		}
	}
}
