use serde_json::{Map, Value, json};

use loci_domain::{
	assemble::{self, ALWAYS_FALSE, SemanticFilter},
	compile,
	condition::Condition,
	plan::{Planner, QueryPlan, SearchRequest},
	scan,
	score::{self, ScoreWeights, SemanticHit},
};

fn tree(raw: Value) -> Option<Condition> {
	Condition::parse(&raw).expect("Failed to parse tree.")
}

fn plan(raw: Value) -> QueryPlan {
	let request: SearchRequest = serde_json::from_value(raw).expect("Failed to decode request.");

	Planner::default().plan(&request).expect("Failed to plan request.")
}

fn row(id: i64) -> Map<String, Value> {
	let Value::Object(map) = json!({ "id": id, "rating": 4.0, "review_count": id * 10 }) else {
		unreachable!();
	};

	map
}

#[test]
fn compilation_is_deterministic() {
	let parsed = tree(json!({
		"op": "OR",
		"conditions": [
			{ "name": { "value": "noodle" } },
			{ "op": "AND", "conditions": [
				{ "price_level": { "cmp": "in", "value": [1, 2] } },
				{ "wifi": { "value": true } }
			] }
		]
	}));
	let first = compile::compile(parsed.as_ref());
	let second = compile::compile(parsed.as_ref());

	assert_eq!(first.expression, second.expression);
	assert_eq!(first.params, second.params);
	assert_eq!(
		first.expression.as_deref(),
		Some("(p.name ILIKE $1 OR (p.price_level IN ($2, $3) AND p.wifi = $4))")
	);
}

#[test]
fn single_surviving_child_is_returned_verbatim() {
	let grouped = tree(json!({
		"op": "AND",
		"conditions": [
			{ "rating": { "cmp": ">", "value": 4.0 } },
			{ "flavor": { "value": "spicy" } }
		]
	}));
	let bare = tree(json!({ "rating": { "cmp": ">", "value": 4.0 } }));

	assert_eq!(
		compile::compile(grouped.as_ref()).expression,
		compile::compile(bare.as_ref()).expression
	);
}

#[test]
fn semantic_only_groups_compile_to_nothing() {
	let parsed = tree(json!({
		"op": "OR",
		"conditions": [
			{ "cuisine_type": { "value": "sichuan" } },
			{ "op": "AND", "conditions": [{ "dish_name": { "value": ["dumpling", "bao"] } }] }
		]
	}));
	let compiled = compile::compile(parsed.as_ref());
	let scanned = scan::scan(parsed.as_ref());

	assert!(compiled.expression.is_none());
	assert!(compiled.params.is_empty());
	assert_eq!(scanned.terms, vec!["sichuan", "dumpling", "bao"]);
}

#[test]
fn scanned_semantic_fields_never_reach_sql() {
	let parsed = tree(json!({
		"op": "AND",
		"conditions": [
			{ "flavor": { "value": "spicy" } },
			{ "address": { "value": "Xinyi" } },
			{ "dish_name": { "cmp": "!=", "value": "tofu" } }
		]
	}));
	let compiled = compile::compile(parsed.as_ref());
	let expression = compiled.expression.expect("Expected a relational predicate.");

	assert_eq!(expression, "p.address ILIKE $1");

	for field in ["flavor", "dish_name", "cuisine_type"] {
		assert!(!expression.contains(field));
	}
}

#[test]
fn mixed_tree_splits_relational_and_semantic_parts() {
	let parsed = tree(json!({
		"op": "AND",
		"conditions": [
			{ "rating": { "cmp": ">", "value": 4.0 } },
			{ "flavor": { "value": "spicy" } }
		]
	}));
	let compiled = compile::compile(parsed.as_ref());

	assert_eq!(compiled.expression.as_deref(), Some("p.rating > $1"));
	assert_eq!(compiled.params.len(), 1);
	assert_eq!(scan::scan(parsed.as_ref()).terms, vec!["spicy"]);
}

#[test]
fn false_facility_compiles_to_nothing() {
	let parsed = tree(json!({ "air_conditioning": { "value": false } }));
	let compiled = compile::compile(parsed.as_ref());

	assert!(compiled.expression.is_none());
	assert!(compiled.params.is_empty());
	assert_eq!(compiled.dropped.len(), 1);
}

#[test]
fn pagination_offsets_follow_page_and_size() {
	let first = plan(json!({ "session_id": "s", "page": 1, "page_size": 10 }));
	let third = plan(json!({ "session_id": "s", "page": 3, "page_size": 10 }));

	assert_eq!(first.pagination.offset(), 0);
	assert_eq!(third.pagination.offset(), 20);
}

#[test]
fn semantic_filter_variants_shape_the_where_clause() {
	let raw = json!({
		"session_id": "s",
		"logic_tree": { "op": "AND", "conditions": [
			{ "rating": { "cmp": ">", "value": 4.0 } },
			{ "flavor": { "value": "spicy" } }
		] }
	});
	let mut no_matches = plan(raw.clone());
	let sql = assemble::assemble(&mut no_matches, &SemanticFilter::NoMatches).sql;

	assert!(sql.contains(&format!("WHERE p.rating > $1 AND {ALWAYS_FALSE} ")));

	let mut unrestricted = plan(raw.clone());
	let sql = assemble::assemble(&mut unrestricted, &SemanticFilter::Unrestricted).sql;

	assert!(sql.contains("WHERE p.rating > $1 GROUP BY"));
	assert!(!sql.contains("ANY("));

	let mut restricted = plan(raw);
	let sql = assemble::assemble(&mut restricted, &SemanticFilter::Restrict(vec![4, 8])).sql;

	assert!(sql.contains("WHERE p.rating > $1 AND p.id = ANY($2)"));
}

#[test]
fn restriction_needs_an_active_semantic_requirement() {
	let mut relational = plan(json!({
		"session_id": "s",
		"logic_tree": { "rating": { "cmp": ">", "value": 4.0 } }
	}));
	let sql = assemble::assemble(&mut relational, &SemanticFilter::NoMatches).sql;

	assert!(!sql.contains(ALWAYS_FALSE));
}

#[test]
fn fusing_no_candidates_returns_empty() {
	let ranked = score::fuse(
		&[],
		&[SemanticHit { id: 1, similarity: 0.9, payload: Map::new() }],
		&ScoreWeights::default(),
		5,
	);

	assert!(ranked.is_empty());
}

#[test]
fn fused_results_respect_top_k_and_candidate_ids() {
	let rows = (1..=6).map(row).collect::<Vec<_>>();
	let hits = [2, 4, 6, 8, 10]
		.into_iter()
		.map(|id| SemanticHit { id, similarity: 1.0 / id as f32, payload: Map::new() })
		.collect::<Vec<_>>();

	for top_k in [0, 1, 2, 5] {
		let ranked = score::fuse(&rows, &hits, &ScoreWeights::default(), top_k);

		assert!(ranked.len() <= top_k);
		assert!(ranked.iter().all(|candidate| matches!(candidate.id(), Some(2 | 4 | 6))));
	}
}
