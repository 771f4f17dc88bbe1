use std::sync::Arc;

use loci_service::{LociService, QdrantSemanticIndex};
use loci_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<LociService>,
}
impl AppState {
	pub async fn new(config: loci_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		if config.semantic.enabled
			&& let Err(err) = qdrant.ensure_collection().await
		{
			tracing::warn!(
				error = %err,
				"Qdrant collection unavailable. Semantic search is skipped until it recovers."
			);
		}

		let semantic = QdrantSemanticIndex::from_config(&config, qdrant);
		let service = LociService::new(config, Arc::new(db), Arc::new(semantic));

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: LociService) -> Self {
		Self { service: Arc::new(service) }
	}
}
