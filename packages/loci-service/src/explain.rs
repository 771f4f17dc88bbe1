use serde::Serialize;

use loci_domain::{
	assemble::{self, AssembledQuery, SemanticFilter},
	plan::{Intent, Pagination, PlanArtifacts, SearchRequest, SelectedField, SortClause},
	scan::SemanticScan,
};

use crate::{LociService, Result, search::LocationReport};

#[derive(Clone, Debug, Serialize)]
pub struct ExplainResponse {
	pub session_id: String,
	pub plan: PlanSummary,
	pub main_query: AssembledQuery,
	pub count_query: AssembledQuery,
	pub artifacts: PlanArtifacts,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlanSummary {
	pub intent: Intent,
	pub selected_fields: Vec<SelectedField>,
	pub sort_clauses: Vec<SortClause>,
	pub pagination: Pagination,
	pub relational_limit: u64,
	pub relational_offset: u64,
	pub location: LocationReport,
	pub semantic: SemanticScan,
	pub photos_needed: bool,
	pub ignored_fields: Vec<String>,
}

impl LociService {
	/// Plans and assembles `request` without touching either store.
	pub fn explain(&self, request: &SearchRequest) -> Result<ExplainResponse> {
		let mut plan = self.planner.plan(request)?;
		let main_query = assemble::assemble(&mut plan, &SemanticFilter::Unrestricted);
		let count_query = assemble::assemble_count(&mut plan, &SemanticFilter::Unrestricted);
		let (relational_limit, relational_offset) = plan.relational_window();

		tracing::debug!(session_id = %plan.session_id, sql = %main_query.sql, "Explained search.");

		Ok(ExplainResponse {
			session_id: plan.session_id.clone(),
			plan: PlanSummary {
				intent: plan.intent,
				selected_fields: plan.selected_fields.clone(),
				sort_clauses: plan.sort_clauses.clone(),
				pagination: plan.pagination,
				relational_limit,
				relational_offset,
				location: LocationReport::from_plan(&plan),
				semantic: plan.semantic.clone(),
				photos_needed: plan.photos_needed,
				ignored_fields: plan.ignored_fields.clone(),
			},
			main_query,
			count_query,
			artifacts: plan.artifacts,
		})
	}
}
