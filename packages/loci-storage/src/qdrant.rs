use std::collections::HashMap;

use qdrant_client::{
	Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, Distance, Filter, PointId, PointStruct, Query,
		QueryPointsBuilder, ScoredPoint, UpsertPointsBuilder, Value, Vector, VectorParamsBuilder,
		VectorsConfigBuilder, point_id::PointIdOptions, value::Kind,
	},
};
use serde_json::{Map, Value as JsonValue};

use loci_domain::score::SemanticHit;

use crate::{Error, Result};

pub const DENSE_VECTOR_NAME: &str = "dense";

/// A place vector ready for upsert.
#[derive(Clone, Debug)]
pub struct PlacePoint {
	pub id: i64,
	pub vector: Vec<f32>,
	pub payload: Map<String, JsonValue>,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &loci_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		let create =
			CreateCollectionBuilder::new(self.collection.clone()).vectors_config(vectors_config);

		self.client.create_collection(create).await?;

		tracing::info!(collection = %self.collection, "Created Qdrant collection.");

		Ok(())
	}

	pub async fn upsert_places(&self, points: Vec<PlacePoint>) -> Result<()> {
		let mut out = Vec::with_capacity(points.len());

		for point in points {
			let id = place_point_id(point.id)?;

			if point.vector.len() != self.vector_dim as usize {
				return Err(Error::InvalidArgument(format!(
					"Vector for place {} has dimension {}, expected {}.",
					point.id,
					point.vector.len(),
					self.vector_dim
				)));
			}

			let payload_map = point
				.payload
				.into_iter()
				.map(|(key, value)| (key, Value::from(value)))
				.collect::<HashMap<_, _>>();
			let mut vectors = HashMap::new();

			vectors.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(point.vector));

			out.push(PointStruct::new(id, vectors, Payload::from(payload_map)));
		}

		self.client
			.upsert_points(UpsertPointsBuilder::new(self.collection.clone(), out).wait(true))
			.await?;

		Ok(())
	}

	/// Nearest-neighbour search pre-filtered to `ids`.
	pub async fn search_restricted(
		&self,
		vector: Vec<f32>,
		ids: &[i64],
		score_threshold: Option<f32>,
	) -> Result<Vec<SemanticHit>> {
		let point_ids = ids.iter().filter_map(|id| u64::try_from(*id).ok()).collect::<Vec<_>>();

		if point_ids.is_empty() {
			return Ok(Vec::new());
		}

		let limit = point_ids.len() as u64;
		let mut search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.filter(Filter::must([Condition::has_id(point_ids)]))
			.with_payload(true)
			.limit(limit);

		if let Some(threshold) = score_threshold {
			search = search.score_threshold(threshold);
		}

		let response = self.client.query(search).await?;

		Ok(response.result.into_iter().filter_map(scored_point_to_hit).collect())
	}
}

fn place_point_id(id: i64) -> Result<u64> {
	u64::try_from(id)
		.map_err(|_| Error::InvalidArgument(format!("Place id {id} cannot be a point id.")))
}

fn scored_point_to_hit(point: ScoredPoint) -> Option<SemanticHit> {
	let Some(id) = point.id.as_ref().and_then(point_id_to_place) else {
		tracing::warn!("Semantic hit missing numeric point id.");

		return None;
	};
	let payload =
		point.payload.into_iter().map(|(key, value)| (key, payload_to_json(value))).collect();

	Some(SemanticHit { id, similarity: point.score, payload })
}

pub fn point_id_to_place(point_id: &PointId) -> Option<i64> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Num(id)) => i64::try_from(*id).ok(),
		Some(PointIdOptions::Uuid(_)) | None => None,
	}
}

pub fn payload_to_json(value: Value) -> JsonValue {
	match value.kind {
		Some(Kind::BoolValue(flag)) => JsonValue::Bool(flag),
		Some(Kind::IntegerValue(number)) => JsonValue::from(number),
		Some(Kind::DoubleValue(number)) => JsonValue::from(number),
		Some(Kind::StringValue(text)) => JsonValue::String(text),
		Some(Kind::ListValue(list)) =>
			JsonValue::Array(list.values.into_iter().map(payload_to_json).collect()),
		Some(Kind::StructValue(object)) => JsonValue::Object(
			object.fields.into_iter().map(|(key, value)| (key, payload_to_json(value))).collect(),
		),
		Some(Kind::NullValue(_)) | None => JsonValue::Null,
	}
}
