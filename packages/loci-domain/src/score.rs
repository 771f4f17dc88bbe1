//! Weighted fusion of semantic similarity with rating and popularity.

use std::{
	cmp::Ordering,
	collections::{HashMap, HashSet},
};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::catalog::Field;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreWeights {
	pub semantic: f32,
	pub rating: f32,
	pub popularity: f32,
	pub rating_scale: f32,
}
impl Default for ScoreWeights {
	fn default() -> Self {
		Self::from(&loci_config::Ranking::default())
	}
}
impl From<&loci_config::Ranking> for ScoreWeights {
	fn from(cfg: &loci_config::Ranking) -> Self {
		Self {
			semantic: cfg.semantic_weight,
			rating: cfg.rating_weight,
			popularity: cfg.popularity_weight,
			rating_scale: cfg.rating_scale,
		}
	}
}

/// A similarity index hit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SemanticHit {
	pub id: i64,
	pub similarity: f32,
	#[serde(skip_serializing_if = "Map::is_empty")]
	pub payload: Map<String, Value>,
}

/// A relational row enriched with its semantic and hybrid scores.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HybridCandidate {
	#[serde(flatten)]
	pub row: Map<String, Value>,
	pub semantic_similarity: f32,
	pub hybrid_score: f32,
}
impl HybridCandidate {
	pub fn id(&self) -> Option<i64> {
		row_id(&self.row)
	}

	/// Flattens the scores into the row.
	pub fn into_row(self) -> Map<String, Value> {
		let mut row = self.row;

		row.insert("semantic_similarity".to_string(), Value::from(self.semantic_similarity));
		row.insert("hybrid_score".to_string(), Value::from(self.hybrid_score));

		row
	}
}

pub fn row_id(row: &Map<String, Value>) -> Option<i64> {
	row.get(Field::Id.as_str()).and_then(number_like).map(|id| id as i64)
}

pub fn hybrid_score(
	weights: &ScoreWeights,
	similarity: f32,
	rating: f64,
	reviews: f64,
	max_reviews: f64,
) -> f32 {
	let similarity = f64::from(similarity.clamp(0.0, 1.0));
	let rating_term =
		if weights.rating_scale > 0.0 { rating / f64::from(weights.rating_scale) } else { 0.0 };
	let popularity_term =
		if max_reviews > 0.0 { reviews.max(0.0).ln_1p() / max_reviews.ln_1p() } else { 0.0 };
	let score = f64::from(weights.semantic) * similarity
		+ f64::from(weights.rating) * rating_term
		+ f64::from(weights.popularity) * popularity_term;

	score as f32
}

/// Scores every hit that matches a relational row and keeps the best `top_k`.
///
/// The popularity term is normalized by the largest review count among `rows`, so scores are
/// only comparable within one call. Hits outside `rows` are ignored.
pub fn fuse(
	rows: &[Map<String, Value>],
	hits: &[SemanticHit],
	weights: &ScoreWeights,
	top_k: usize,
) -> Vec<HybridCandidate> {
	let max_reviews = rows.iter().map(review_count).fold(0.0, f64::max);
	let mut by_id = HashMap::with_capacity(rows.len());

	for row in rows {
		if let Some(id) = row_id(row) {
			by_id.entry(id).or_insert(row);
		}
	}

	let mut seen = HashSet::new();
	let mut scored = Vec::with_capacity(hits.len().min(rows.len()));

	for hit in hits {
		if !seen.insert(hit.id) {
			continue;
		}

		let Some(row) = by_id.get(&hit.id) else {
			tracing::debug!(id = hit.id, "Ignoring semantic hit outside the candidate set.");

			continue;
		};
		let rating = row.get(Field::Rating.as_str()).and_then(number_like).unwrap_or(0.0);
		let score = hybrid_score(weights, hit.similarity, rating, review_count(row), max_reviews);

		scored.push(HybridCandidate {
			row: (*row).clone(),
			semantic_similarity: hit.similarity,
			hybrid_score: score,
		});
	}

	scored.sort_by(|a, b| cmp_f32_desc(a.hybrid_score, b.hybrid_score));
	scored.truncate(top_k);

	scored
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

fn review_count(row: &Map<String, Value>) -> f64 {
	row.get(Field::ReviewCount.as_str()).and_then(number_like).unwrap_or(0.0)
}

fn number_like(value: &Value) -> Option<f64> {
	match value {
		Value::Number(number) => number.as_f64(),
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	}
	.filter(|value: &f64| value.is_finite())
}
