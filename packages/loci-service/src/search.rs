use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};

use loci_domain::{
	assemble::{self, SemanticFilter},
	compile::BoundParams,
	plan::{LocationSource, QueryPlan, SearchRequest},
	score::HybridCandidate,
};

use crate::{LociService, Result, photos, ranker::Ranker};

const SUCCESS: &str = "success";

#[derive(Clone, Debug, Serialize)]
pub struct SearchResponse {
	pub session_id: String,
	pub status: String,
	pub data: SearchData,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchData {
	pub search_status: SearchStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub diagnostics: Option<Diagnostics>,
	pub semantic_search: SemanticSearchReport,
	pub final_results: Vec<Map<String, Value>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchStatus {
	pub total_count: u64,
	pub current_page: u32,
	pub page_size: u32,
	pub has_next: bool,
	pub location: LocationReport,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LocationReport {
	pub source: LocationSource,
	pub lat: Option<f64>,
	pub lng: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure: Option<String>,
}
impl LocationReport {
	pub fn from_plan(plan: &QueryPlan) -> Self {
		Self {
			source: plan.distance.source,
			lat: plan.distance.origin.map(|origin| origin.lat),
			lng: plan.distance.origin.map(|origin| origin.lng),
			failure: plan.distance.failure().map(str::to_string),
		}
	}
}

/// Present only when a search returns nothing.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostics {
	pub active_filters: BoundParams,
	pub generated_filter: Option<String>,
	pub logic_tree: Value,
	pub dropped_fields: Vec<String>,
	pub suggestion: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticStatus {
	NotNeeded,
	Skipped,
	NoMatch,
	Success,
}

#[derive(Clone, Debug, Serialize)]
pub struct SemanticSearchReport {
	pub status: SemanticStatus,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub query: Option<String>,
	pub details: Vec<ScoreDetail>,
}
impl SemanticSearchReport {
	fn new(status: SemanticStatus, message: impl Into<String>, query: Option<String>) -> Self {
		Self { status, message: message.into(), query, details: Vec::new() }
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreDetail {
	pub id: i64,
	pub semantic_similarity: f32,
	pub hybrid_score: f32,
}

struct Page {
	rows: Vec<Map<String, Value>>,
	total_count: u64,
	has_next: bool,
}

impl LociService {
	pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
		let started = Instant::now();
		let mut plan = self.planner.plan(&request)?;
		let main = assemble::assemble(&mut plan, &SemanticFilter::Unrestricted);
		let count = assemble::assemble_count(&mut plan, &SemanticFilter::Unrestricted);
		let (fetched, total) =
			tokio::try_join!(self.relational.fetch(&main), self.relational.count(&count))?;

		tracing::info!(
			session_id = %plan.session_id,
			rows = fetched.rows.len(),
			total,
			elapsed_ms = fetched.elapsed.as_millis() as u64,
			"Relational search finished."
		);

		let (page, report) = if plan.semantic.needed {
			self.semantic_page(&mut plan, fetched.rows, total).await?
		} else {
			let report = SemanticSearchReport::new(
				SemanticStatus::NotNeeded,
				"No semantic conditions in the request.",
				None,
			);
			let has_next = plan.pagination.offset() + (fetched.rows.len() as u64) < total;

			(Page { rows: fetched.rows, total_count: total, has_next }, report)
		};
		let Page { mut rows, total_count, has_next } = page;

		if plan.photos_needed {
			if self.cfg.search.images_url.is_empty() {
				tracing::debug!(session_id = %plan.session_id, "Photo enrichment disabled.");
			} else {
				photos::attach_photos(&mut rows, &self.cfg.search.images_url);
			}
		}

		let diagnostics = rows.is_empty().then(|| diagnostics(&plan, &report));

		tracing::info!(
			session_id = %plan.session_id,
			results = rows.len(),
			total_count,
			semantic = ?report.status,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Search finished."
		);

		Ok(SearchResponse {
			session_id: plan.session_id.clone(),
			status: SUCCESS.to_string(),
			data: SearchData {
				search_status: SearchStatus {
					total_count,
					current_page: plan.pagination.page,
					page_size: plan.pagination.page_size,
					has_next,
					location: LocationReport::from_plan(&plan),
				},
				diagnostics,
				semantic_search: report,
				final_results: rows,
			},
		})
	}

	async fn semantic_page(
		&self,
		plan: &mut QueryPlan,
		candidates: Vec<Map<String, Value>>,
		relational_total: u64,
	) -> Result<(Page, SemanticSearchReport)> {
		let offset = usize::try_from(plan.pagination.offset()).unwrap_or(usize::MAX);
		let page_size = plan.pagination.page_size as usize;

		if plan.semantic.terms.is_empty() {
			let report = SemanticSearchReport::new(
				SemanticStatus::Skipped,
				"Semantic fields carried no search terms. Returning relational matches only.",
				None,
			);
			let page = self.relational_page(plan, candidates, relational_total).await?;

			return Ok((page, report));
		}

		let query = plan.semantic.query_text();
		let ranker = Ranker {
			index: self.semantic.as_ref(),
			weights: self.weights,
			timeout: Duration::from_millis(self.cfg.semantic.timeout_ms),
		};

		match ranker.rank(&query, &candidates, candidates.len()).await {
			None => {
				tracing::warn!(session_id = %plan.session_id, "Semantic stage skipped.");

				let report = SemanticSearchReport::new(
					SemanticStatus::Skipped,
					"Semantic index unavailable. Returning relational matches only.",
					Some(query),
				);

				let page = self.relational_page(plan, candidates, relational_total).await?;

				Ok((page, report))
			},
			Some(ranked) if ranked.is_empty() => {
				// Record the always-false filter so diagnostics show why nothing came back.
				assemble::assemble_count(plan, &SemanticFilter::NoMatches);

				let report = SemanticSearchReport::new(
					SemanticStatus::NoMatch,
					"No candidate matched the semantic terms.",
					Some(query),
				);

				Ok((Page { rows: Vec::new(), total_count: 0, has_next: false }, report))
			},
			Some(ranked) => {
				let ids = ranked.iter().filter_map(HybridCandidate::id).collect::<Vec<_>>();

				assemble::assemble_count(plan, &SemanticFilter::Restrict(ids));

				let total_count = ranked.len() as u64;
				let has_next = offset.saturating_add(page_size) < ranked.len();
				let page = ranked.into_iter().skip(offset).take(page_size).collect::<Vec<_>>();
				let mut message = format!(
					"Ranked {total_count} of {} candidates by hybrid score.",
					candidates.len()
				);

				if relational_total > candidates.len() as u64 {
					tracing::warn!(
						session_id = %plan.session_id,
						candidates = candidates.len(),
						relational_total,
						"Candidate window truncated the relational matches."
					);

					message.push_str(&format!(
						" Only the first {} of {relational_total} relational matches were ranked.",
						candidates.len()
					));
				}

				let mut report =
					SemanticSearchReport::new(SemanticStatus::Success, message, Some(query));

				report.details = page
					.iter()
					.filter_map(|candidate| {
						candidate.id().map(|id| ScoreDetail {
							id,
							semantic_similarity: candidate.semantic_similarity,
							hybrid_score: candidate.hybrid_score,
						})
					})
					.collect();

				let rows = page.into_iter().map(HybridCandidate::into_row).collect();

				Ok((Page { rows, total_count, has_next }, report))
			},
		}
	}

	/// Serves the requested page from relational matches alone.
	///
	/// The candidate window is reused when it holds every match. Otherwise the page is read again
	/// with the plan's own limit and offset.
	async fn relational_page(
		&self,
		plan: &mut QueryPlan,
		candidates: Vec<Map<String, Value>>,
		relational_total: u64,
	) -> Result<Page> {
		let offset = plan.pagination.offset();
		let rows = if relational_total <= candidates.len() as u64 {
			let skip = usize::try_from(offset).unwrap_or(usize::MAX);

			candidates.into_iter().skip(skip).take(plan.pagination.page_size as usize).collect()
		} else {
			let query = assemble::assemble_page(plan, &SemanticFilter::Unrestricted);
			let fetched = self.relational.fetch(&query).await?;

			// Diagnostics report the filter-only numbering.
			assemble::assemble_count(plan, &SemanticFilter::Unrestricted);

			fetched.rows
		};
		let has_next = offset + (rows.len() as u64) < relational_total;

		Ok(Page { rows, total_count: relational_total, has_next })
	}
}

fn diagnostics(plan: &QueryPlan, report: &SemanticSearchReport) -> Diagnostics {
	let mut dropped_fields = plan.artifacts.dropped_leaves.clone();

	for field in &plan.ignored_fields {
		if !dropped_fields.contains(field) {
			dropped_fields.push(field.clone());
		}
	}

	let suggestion = if report.status == SemanticStatus::NoMatch {
		"No place matched the semantic terms. Try broader wording or fewer semantic conditions."
	} else if !dropped_fields.is_empty() {
		"Some conditions were ignored. Check the field names and value types."
	} else {
		"The filter combination is too strict. Try removing or relaxing a condition."
	};

	Diagnostics {
		active_filters: plan.artifacts.bound_parameters.clone(),
		generated_filter: plan.artifacts.compiled_filter.clone(),
		logic_tree: plan.raw_tree.clone(),
		dropped_fields,
		suggestion: suggestion.to_string(),
	}
}
