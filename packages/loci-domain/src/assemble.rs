use std::collections::BTreeSet;

use serde::Serialize;

use crate::{
	catalog::{Field, Join, PLACE_ALIAS, PLACE_ID_COLUMN, PLACE_TABLE},
	compile::{self, BoundParams, CompiledFilter, SqlValue},
	plan::{DISTANCE_ALIAS, PlanArtifacts, QueryPlan, SortKey},
};

pub const ALWAYS_FALSE: &str = "FALSE";

/// Outcome of the semantic stage as seen by the relational query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SemanticFilter {
	/// Semantic stage skipped or not ready. Relational filters alone decide.
	Unrestricted,
	/// Semantic stage ran and matched nothing.
	NoMatches,
	/// Only these place IDs may appear.
	Restrict(Vec<i64>),
}

#[derive(Clone, Debug, Serialize)]
pub struct AssembledQuery {
	pub sql: String,
	pub params: BoundParams,
}

/// Builds the result query over the plan's relational window and records the generated filter on
/// the plan.
pub fn assemble(plan: &mut QueryPlan, semantic: &SemanticFilter) -> AssembledQuery {
	let window = plan.relational_window();

	assemble_window(plan, semantic, window)
}

/// Like [`assemble`], but always reads the requested page, even for semantic plans.
pub fn assemble_page(plan: &mut QueryPlan, semantic: &SemanticFilter) -> AssembledQuery {
	let window = plan.page_window();

	assemble_window(plan, semantic, window)
}

fn assemble_window(
	plan: &mut QueryPlan,
	semantic: &SemanticFilter,
	(limit, offset): (u64, u64),
) -> AssembledQuery {
	let (mut where_clauses, mut params, filter_joins, dropped) = base_filter(plan, semantic);
	let mut columns = plan
		.selected_fields
		.iter()
		.map(|field| (field.alias.as_str(), field.expression.as_str()))
		.collect::<Vec<_>>();

	if let Some(expr) = plan.distance.expression.as_ref()
		&& !columns.iter().any(|(alias, _)| *alias == DISTANCE_ALIAS)
	{
		columns.push((DISTANCE_ALIAS, expr.sql.as_str()));
	}

	let select = columns
		.iter()
		.map(|(alias, expression)| format!("{expression} AS {alias}"))
		.collect::<Vec<_>>()
		.join(", ");
	let joins = plan.joins().chain(filter_joins).collect::<BTreeSet<_>>();
	let mut order_by = plan
		.sort_clauses
		.iter()
		.map(|clause| format!("{} {}", clause.key.expression(), clause.direction.as_sql()))
		.collect::<Vec<_>>();

	if !plan.sort_clauses.iter().any(|clause| clause.key == SortKey::Field(Field::Id)) {
		order_by.push(format!("{PLACE_ID_COLUMN} ASC"));
	}

	let mut sql = format!("SELECT {select} FROM {PLACE_TABLE} {PLACE_ALIAS}");

	push_joins(&mut sql, &joins);

	let where_text = render_where(&mut where_clauses);

	if let Some(text) = where_text.as_deref() {
		sql.push_str(" WHERE ");
		sql.push_str(text);
	}

	sql.push_str(&format!(" GROUP BY {PLACE_ID_COLUMN} ORDER BY {}", order_by.join(", ")));

	let limit_placeholder = params.push(SqlValue::Int(clamp_i64(limit)));
	let offset_placeholder = params.push(SqlValue::Int(clamp_i64(offset)));

	sql.push_str(&format!(" LIMIT {limit_placeholder} OFFSET {offset_placeholder}"));

	record(plan, where_text, &params, dropped);

	AssembledQuery { sql, params }
}

/// Builds the companion `COUNT(DISTINCT p.id)` query with its own parameter numbering.
pub fn assemble_count(plan: &mut QueryPlan, semantic: &SemanticFilter) -> AssembledQuery {
	let (mut where_clauses, params, filter_joins, dropped) = base_filter(plan, semantic);
	let mut sql =
		format!("SELECT COUNT(DISTINCT {PLACE_ID_COLUMN}) AS total FROM {PLACE_TABLE} {PLACE_ALIAS}");

	push_joins(&mut sql, &filter_joins);

	let where_text = render_where(&mut where_clauses);

	if let Some(text) = where_text.as_deref() {
		sql.push_str(" WHERE ");
		sql.push_str(text);
	}

	record(plan, where_text, &params, dropped);

	AssembledQuery { sql, params }
}

fn base_filter(
	plan: &QueryPlan,
	semantic: &SemanticFilter,
) -> (Vec<String>, BoundParams, BTreeSet<Join>, Vec<String>) {
	let CompiledFilter { expression, mut params, dropped, joins } =
		compile::compile(plan.tree.as_ref());
	let mut clauses = expression.into_iter().collect::<Vec<_>>();

	if plan.semantic.needed {
		match semantic {
			SemanticFilter::Unrestricted => {},
			SemanticFilter::NoMatches => clauses.push(ALWAYS_FALSE.to_string()),
			SemanticFilter::Restrict(ids) if ids.is_empty() =>
				clauses.push(ALWAYS_FALSE.to_string()),
			SemanticFilter::Restrict(ids) => {
				let placeholder = params.push(SqlValue::IntArray(ids.clone()));

				clauses.push(format!("{PLACE_ID_COLUMN} = ANY({placeholder})"));
			},
		}
	}

	let dropped = dropped.into_iter().map(|leaf| leaf.field).collect();

	(clauses, params, joins, dropped)
}

fn render_where(clauses: &mut Vec<String>) -> Option<String> {
	match clauses.len() {
		0 => None,
		1 => clauses.pop(),
		_ => Some(clauses.join(" AND ")),
	}
}

fn push_joins(sql: &mut String, joins: &BTreeSet<Join>) {
	for join in joins {
		sql.push(' ');
		sql.push_str(join.clause());
	}
}

fn record(
	plan: &mut QueryPlan,
	where_text: Option<String>,
	params: &BoundParams,
	dropped: Vec<String>,
) {
	plan.artifacts = PlanArtifacts {
		compiled_filter: where_text,
		bound_parameters: params.clone(),
		dropped_leaves: dropped,
	};
}

fn clamp_i64(value: u64) -> i64 {
	i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
	use serde_json::{Value, json};

	use super::*;
	use crate::plan::{Planner, SearchRequest};

	fn plan(raw: Value) -> QueryPlan {
		let request: SearchRequest =
			serde_json::from_value(raw).expect("Failed to decode request.");

		Planner::default().plan(&request).expect("plan failed")
	}

	fn semantic_plan() -> QueryPlan {
		plan(json!({
			"session_id": "s1",
			"logic_tree": {
				"op": "AND",
				"conditions": [
					{ "rating": { "cmp": ">", "value": 4.0 } },
					{ "flavor": { "value": "spicy" } }
				]
			}
		}))
	}

	#[test]
	fn assembles_plain_query() {
		let mut plan = plan(json!({ "session_id": "s1", "page": 2, "page_size": 10 }));
		let query = assemble(&mut plan, &SemanticFilter::Unrestricted);

		assert_eq!(
			query.sql,
			"SELECT p.id AS id, p.name AS name, p.address AS address, p.rating AS rating \
			 FROM all_places p GROUP BY p.id ORDER BY p.id ASC LIMIT $1 OFFSET $2"
		);
		assert_eq!(query.params.values(), &[SqlValue::Int(10), SqlValue::Int(10)]);
		assert!(plan.artifacts.compiled_filter.is_none());
	}

	#[test]
	fn joins_follow_selected_and_filtered_fields() {
		let mut plan = plan(json!({
			"session_id": "s1",
			"info_needed": ["service_tags"],
			"logic_tree": { "merchant_category": { "value": "cafe" } }
		}));
		let query = assemble(&mut plan, &SemanticFilter::Unrestricted);
		let merchant = query.sql.find("LEFT JOIN place_merchant_category").expect("merchant join");
		let tags = query.sql.find("LEFT JOIN place_tags").expect("tags join");

		assert!(merchant < tags);
		assert!(query.sql.contains("string_agg(DISTINCT tow.tag_content, ',') AS service_tags"));
		assert!(query.sql.contains("WHERE mc.name ILIKE $1 GROUP BY p.id"));

		let count = assemble_count(&mut plan, &SemanticFilter::Unrestricted);

		assert!(count.sql.contains("LEFT JOIN place_merchant_category"));
		assert!(!count.sql.contains("place_tags"));
	}

	#[test]
	fn distance_column_and_sort() {
		let mut plan = plan(json!({
			"session_id": "s1",
			"user_location": { "lat": 25.03, "lng": 121.56 },
			"sort_conditions": [
				{ "field": "distance", "method": "ASC" },
				{ "field": "rating", "method": "DESC" }
			]
		}));
		let query = assemble(&mut plan, &SemanticFilter::Unrestricted);

		assert_eq!(query.sql.matches(" AS distance").count(), 1);
		assert!(query.sql.contains("ORDER BY distance ASC, p.rating DESC, p.id ASC"));
	}

	#[test]
	fn distance_is_injected_once() {
		let mut plan = plan(json!({ "session_id": "s1", "info_needed": ["distance"] }));

		plan.selected_fields.push(crate::plan::SelectedField {
			alias: DISTANCE_ALIAS.to_string(),
			expression: "0".to_string(),
			join: None,
		});

		let query = assemble(&mut plan, &SemanticFilter::Unrestricted);

		assert_eq!(query.sql.matches(" AS distance").count(), 1);
	}

	#[test]
	fn no_matches_forces_false() {
		let mut plan = semantic_plan();
		let query = assemble(&mut plan, &SemanticFilter::NoMatches);

		assert!(query.sql.contains("WHERE p.rating > $1 AND FALSE GROUP BY"));
		assert_eq!(plan.artifacts.compiled_filter.as_deref(), Some("p.rating > $1 AND FALSE"));

		let mut plan = semantic_plan();
		let query = assemble(&mut plan, &SemanticFilter::Restrict(Vec::new()));

		assert!(query.sql.contains("AND FALSE"));
	}

	#[test]
	fn unrestricted_adds_no_id_clause() {
		let mut plan = semantic_plan();
		let query = assemble(&mut plan, &SemanticFilter::Unrestricted);

		assert!(!query.sql.contains("ANY("));
		assert!(!query.sql.contains("FALSE"));
		assert_eq!(plan.artifacts.compiled_filter.as_deref(), Some("p.rating > $1"));
	}

	#[test]
	fn restrict_binds_id_array() {
		let mut plan = semantic_plan();
		let query = assemble(&mut plan, &SemanticFilter::Restrict(vec![7, 3]));

		assert!(query.sql.contains("WHERE p.rating > $1 AND p.id = ANY($2)"));
		assert!(query.sql.ends_with("LIMIT $3 OFFSET $4"));
		assert_eq!(query.params.values()[1], SqlValue::IntArray(vec![7, 3]));
		// Semantic plans fetch the candidate window from the start.
		assert_eq!(query.params.values()[2], SqlValue::Int(200));
		assert_eq!(query.params.values()[3], SqlValue::Int(0));
	}

	#[test]
	fn page_assembly_reads_the_requested_page() {
		let mut plan = semantic_plan();

		plan.pagination.page = 3;
		plan.pagination.page_size = 4;

		let query = assemble_page(&mut plan, &SemanticFilter::Unrestricted);

		assert!(query.sql.contains("WHERE p.rating > $1 GROUP BY"));
		assert!(query.sql.ends_with("LIMIT $2 OFFSET $3"));
		assert_eq!(&query.params.values()[1..], &[SqlValue::Int(4), SqlValue::Int(8)]);
	}

	#[test]
	fn semantic_filter_is_ignored_for_relational_plans() {
		let mut plan = plan(json!({
			"session_id": "s1",
			"logic_tree": { "rating": { "cmp": ">", "value": 4 } }
		}));
		let query = assemble(&mut plan, &SemanticFilter::NoMatches);

		assert!(!query.sql.contains("FALSE"));
	}

	#[test]
	fn count_query_restarts_numbering() {
		let mut plan = plan(json!({
			"session_id": "s1",
			"info_needed": ["merchant_category"],
			"sort_conditions": [{ "field": "rating", "method": "DESC" }],
			"logic_tree": {
				"conditions": [
					{ "rating": { "cmp": ">", "value": 4 } },
					{ "address": { "value": "Taipei" } }
				]
			}
		}));
		let main = assemble(&mut plan, &SemanticFilter::Unrestricted);
		let count = assemble_count(&mut plan, &SemanticFilter::Unrestricted);

		assert_eq!(main.params.len(), 4);
		assert_eq!(
			count.sql,
			"SELECT COUNT(DISTINCT p.id) AS total FROM all_places p \
			 WHERE (p.rating > $1 AND p.address ILIKE $2)"
		);
		assert_eq!(count.params.len(), 2);
		assert_eq!(
			serde_json::to_value(&plan.artifacts.bound_parameters).expect("serialize failed"),
			json!({ "p0": 4.0, "p1": "%Taipei%" })
		);
	}

	#[test]
	fn dropped_leaves_are_recorded() {
		let mut plan = plan(json!({
			"session_id": "s1",
			"logic_tree": {
				"conditions": [{ "vibes": { "value": "cozy" } }, { "wifi": { "value": false } }]
			}
		}));

		assemble(&mut plan, &SemanticFilter::Unrestricted);

		assert_eq!(plan.artifacts.dropped_leaves, vec!["vibes", "wifi"]);
		assert!(plan.artifacts.compiled_filter.is_none());
	}
}
