use std::sync::Arc;

use loci_config::EmbeddingProviderConfig;
use loci_providers::embedding;
use loci_storage::qdrant::QdrantStore;

use crate::{BoxFuture, EmbeddingProvider, Error, Result, SemanticIndex, SemanticOutcome};

/// Embeds through the configured OpenAI-compatible endpoint.
pub struct HttpEmbedding;
impl EmbeddingProvider for HttpEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}

pub struct QdrantSemanticIndex {
	pub store: QdrantStore,
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub embedding_cfg: EmbeddingProviderConfig,
	pub enabled: bool,
	pub score_threshold: Option<f32>,
}
impl QdrantSemanticIndex {
	pub fn from_config(cfg: &loci_config::Config, store: QdrantStore) -> Self {
		Self {
			store,
			embedding: Arc::new(HttpEmbedding),
			embedding_cfg: cfg.providers.embedding.clone(),
			enabled: cfg.semantic.enabled,
			score_threshold: cfg.semantic.score_threshold,
		}
	}

	async fn search_inner(&self, text: &str, ids: &[i64]) -> Result<SemanticOutcome> {
		if !self.enabled {
			return Ok(SemanticOutcome::NotReady);
		}

		let texts = vec![text.to_string()];
		let vector = self
			.embedding
			.embed(&self.embedding_cfg, &texts)
			.await?
			.into_iter()
			.next()
			.ok_or_else(|| Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			})?;

		if vector.len() != self.store.vector_dim as usize {
			return Err(Error::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		let hits = self.store.search_restricted(vector, ids, self.score_threshold).await?;

		Ok(SemanticOutcome::Ready(hits))
	}
}
impl SemanticIndex for QdrantSemanticIndex {
	fn search<'a>(
		&'a self,
		text: &'a str,
		ids: &'a [i64],
	) -> BoxFuture<'a, Result<SemanticOutcome>> {
		Box::pin(self.search_inner(text, ids))
	}
}
