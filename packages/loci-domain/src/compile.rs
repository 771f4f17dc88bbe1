//! Lowers a condition tree into a parameterized PostgreSQL filter expression.
//!
//! Every literal is bound. Parameters are numbered from `$1` within one compilation and named
//! `p0, p1, ...` for diagnostics. Semantic leaves never produce a predicate.

use std::collections::BTreeSet;

use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{
	catalog::{Field, FieldRef, Join, MatchPolicy, ValueKind},
	condition::{Comparator, Condition, Leaf, LeafValue, Scalar},
};

/// A value bound to one positional parameter.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
	Text(String),
	Int(i64),
	Float(f64),
	Bool(bool),
	IntArray(Vec<i64>),
}

/// Ordered parameter list. Entry `i` is named `p{i}` and rendered as `${i + 1}`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundParams {
	values: Vec<SqlValue>,
}
impl BoundParams {
	/// Binds `value` and returns its placeholder.
	pub fn push(&mut self, value: SqlValue) -> String {
		self.values.push(value);

		format!("${}", self.values.len())
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn values(&self) -> &[SqlValue] {
		&self.values
	}

	pub fn get(&self, name: &str) -> Option<&SqlValue> {
		let index = name.strip_prefix('p')?.parse::<usize>().ok()?;

		self.values.get(index)
	}
}
impl Serialize for BoundParams {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut map = serializer.serialize_map(Some(self.values.len()))?;

		for (index, value) in self.values.iter().enumerate() {
			map.serialize_entry(&format!("p{index}"), value)?;
		}

		map.end()
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DroppedLeaf {
	pub field: String,
	pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct CompiledFilter {
	pub expression: Option<String>,
	pub params: BoundParams,
	pub dropped: Vec<DroppedLeaf>,
	/// Joins needed by the emitted predicates.
	pub joins: BTreeSet<Join>,
}

#[derive(Default)]
struct CompileState {
	params: BoundParams,
	dropped: Vec<DroppedLeaf>,
	joins: BTreeSet<Join>,
}
impl CompileState {
	fn drop_leaf(&mut self, field: &str, reason: impl Into<String>) {
		let reason = reason.into();

		tracing::debug!(field, reason = %reason, "Dropping condition leaf.");

		self.dropped.push(DroppedLeaf { field: field.to_string(), reason });
	}
}

/// Compiles `tree` with fresh parameter numbering.
pub fn compile(tree: Option<&Condition>) -> CompiledFilter {
	let mut state = CompileState::default();
	let expression = tree.and_then(|node| compile_node(node, &mut state));

	CompiledFilter {
		expression,
		params: state.params,
		dropped: state.dropped,
		joins: state.joins,
	}
}

fn compile_node(node: &Condition, state: &mut CompileState) -> Option<String> {
	match node {
		Condition::Group { op, children } => {
			let parts = children
				.iter()
				.filter_map(|child| compile_node(child, state))
				.collect::<Vec<_>>();

			match parts.len() {
				0 => None,
				1 => parts.into_iter().next(),
				_ => Some(format!("({})", parts.join(&format!(" {} ", op.as_sql())))),
			}
		},
		Condition::Leaf(leaf) => compile_leaf(leaf, state),
	}
}

fn compile_leaf(leaf: &Leaf, state: &mut CompileState) -> Option<String> {
	match &leaf.field {
		FieldRef::Semantic(_) => None,
		FieldRef::Unknown(name) => {
			state.drop_leaf(name, "unknown field");

			None
		},
		FieldRef::Facility(facility) => match &leaf.value {
			Some(LeafValue::Scalar(Scalar::Bool(true))) => {
				let placeholder = state.params.push(SqlValue::Bool(true));

				Some(format!("{} = {placeholder}", facility.column()))
			},
			_ => {
				state.drop_leaf(facility.as_str(), "facility flags only match the value true");

				None
			},
		},
		FieldRef::Relational(field) => {
			let expression = compile_relational(*field, leaf, state)?;

			if let Some(join) = field.spec().join {
				state.joins.insert(join);
			}

			Some(expression)
		},
	}
}

fn compile_relational(field: Field, leaf: &Leaf, state: &mut CompileState) -> Option<String> {
	let spec = field.spec();
	let name = field.as_str();
	let Some(column) = spec.filter_column else {
		state.drop_leaf(name, "field is not filterable");

		return None;
	};
	let Some(value) = &leaf.value else {
		state.drop_leaf(name, "missing value");

		return None;
	};

	match spec.policy {
		MatchPolicy::Substring => compile_substring(name, column, value, state),
		MatchPolicy::General if leaf.comparator.is_membership() =>
			compile_membership(name, column, spec.kind, leaf.comparator, value, state),
		MatchPolicy::General =>
			compile_general(name, column, spec.kind, leaf.comparator, value, state),
	}
}

fn compile_substring(
	name: &str,
	column: &str,
	value: &LeafValue,
	state: &mut CompileState,
) -> Option<String> {
	let parts = value
		.scalars()
		.iter()
		.map(|scalar| {
			let pattern = format!("%{}%", escape_like(&scalar.to_term()));
			let placeholder = state.params.push(SqlValue::Text(pattern));

			format!("{column} ILIKE {placeholder}")
		})
		.collect::<Vec<_>>();

	match parts.len() {
		0 => {
			state.drop_leaf(name, "empty list");

			None
		},
		1 => parts.into_iter().next(),
		_ => Some(format!("({})", parts.join(" OR "))),
	}
}

fn compile_membership(
	name: &str,
	column: &str,
	kind: ValueKind,
	comparator: Comparator,
	value: &LeafValue,
	state: &mut CompileState,
) -> Option<String> {
	let scalars = value.scalars();

	if scalars.is_empty() {
		return match comparator {
			Comparator::NotIn => None,
			_ => Some("FALSE".to_string()),
		};
	}

	let Some(values) = scalars.iter().map(|scalar| coerce(scalar, kind)).collect::<Option<Vec<_>>>()
	else {
		state.drop_leaf(name, format!("value does not match the {} column type", column));

		return None;
	};
	let placeholders =
		values.into_iter().map(|value| state.params.push(value)).collect::<Vec<_>>().join(", ");

	Some(format!("{column} {} ({placeholders})", comparator.as_sql()))
}

fn compile_general(
	name: &str,
	column: &str,
	kind: ValueKind,
	comparator: Comparator,
	value: &LeafValue,
	state: &mut CompileState,
) -> Option<String> {
	let scalar = match value.scalars() {
		[] => {
			state.drop_leaf(name, "empty list");

			return None;
		},
		[single] => single,
		_ => {
			let membership = match comparator {
				Comparator::Eq => Comparator::In,
				Comparator::Ne => Comparator::NotIn,
				other => {
					state.drop_leaf(name, format!("comparator {other} does not accept a list"));

					return None;
				},
			};

			return compile_membership(name, column, kind, membership, value, state);
		},
	};

	if comparator == Comparator::Like {
		let placeholder = state.params.push(SqlValue::Text(scalar.to_term()));
		let target = if kind == ValueKind::Text {
			column.to_string()
		} else {
			format!("CAST({column} AS TEXT)")
		};

		return Some(format!("{target} LIKE {placeholder}"));
	}

	let Some(bound) = coerce(scalar, kind) else {
		state.drop_leaf(name, format!("value does not match the {column} column type"));

		return None;
	};
	let placeholder = state.params.push(bound);

	Some(format!("{column} {} {placeholder}", comparator.as_sql()))
}

fn coerce(scalar: &Scalar, kind: ValueKind) -> Option<SqlValue> {
	match (kind, scalar) {
		(ValueKind::Text, scalar) => Some(SqlValue::Text(scalar.to_term())),
		(ValueKind::Integer, Scalar::Int(value)) => Some(SqlValue::Int(*value)),
		(ValueKind::Integer, Scalar::Float(value)) if value.fract() == 0.0 =>
			Some(SqlValue::Int(*value as i64)),
		(ValueKind::Integer, Scalar::Text(text)) => text.trim().parse().ok().map(SqlValue::Int),
		(ValueKind::Decimal, Scalar::Int(value)) => Some(SqlValue::Float(*value as f64)),
		(ValueKind::Decimal, Scalar::Float(value)) => Some(SqlValue::Float(*value)),
		(ValueKind::Decimal, Scalar::Text(text)) => text
			.trim()
			.parse::<f64>()
			.ok()
			.filter(|value| value.is_finite())
			.map(SqlValue::Float),
		_ => None,
	}
}

/// Escapes `LIKE` metacharacters using the default backslash escape.
pub fn escape_like(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.chars() {
		if matches!(ch, '\\' | '%' | '_') {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}

#[cfg(test)]
mod tests {
	use serde_json::{Value, json};

	use super::*;
	use crate::scan;

	fn compile_json(raw: Value) -> CompiledFilter {
		let tree = Condition::parse(&raw).expect("parse failed");

		compile(tree.as_ref())
	}

	#[test]
	fn empty_tree_compiles_to_nothing() {
		let compiled = compile(None);

		assert!(compiled.expression.is_none());
		assert!(compiled.params.is_empty());
		assert!(compile_json(json!({ "conditions": [{}] })).expression.is_none());
	}

	#[test]
	fn single_survivor_is_not_parenthesized() {
		let raw = json!({
			"op": "AND",
			"conditions": [
				{ "rating": { "cmp": ">", "value": 4.0 } },
				{ "flavor": { "cmp": "=", "value": "spicy" } }
			]
		});
		let tree = Condition::parse(&raw).expect("parse failed");
		let compiled = compile(tree.as_ref());
		let scan = scan::scan(tree.as_ref());

		assert_eq!(compiled.expression.as_deref(), Some("p.rating > $1"));
		assert_eq!(compiled.params.values(), &[SqlValue::Float(4.0)]);
		assert_eq!(scan.terms, vec!["spicy"]);
	}

	#[test]
	fn groups_join_survivors_with_their_operator() {
		let compiled = compile_json(json!({
			"op": "OR",
			"conditions": [
				{ "rating": { "cmp": ">=", "value": 4 } },
				{ "op": "AND", "conditions": [
					{ "review_count": { "cmp": ">", "value": "100" } },
					{ "wifi": { "value": true } }
				] }
			]
		}));

		assert_eq!(
			compiled.expression.as_deref(),
			Some("(p.rating >= $1 OR (p.user_ratings_total > $2 AND p.wifi = $3))")
		);
		assert_eq!(
			compiled.params.values(),
			&[SqlValue::Float(4.0), SqlValue::Int(100), SqlValue::Bool(true)]
		);
	}

	#[test]
	fn all_semantic_group_compiles_to_nothing() {
		let compiled = compile_json(json!({
			"conditions": [
				{ "flavor": { "value": "spicy" } },
				{ "op": "OR", "conditions": [{ "cuisine_type": { "value": "thai" } }] }
			]
		}));

		assert!(compiled.expression.is_none());
		assert!(compiled.params.is_empty());
		assert!(compiled.dropped.is_empty());
	}

	#[test]
	fn facility_flags_only_match_true() {
		let compiled = compile_json(json!({ "air_conditioning": { "value": false } }));

		assert!(compiled.expression.is_none());
		assert!(compiled.params.is_empty());
		assert_eq!(compiled.dropped[0].field, "air_conditioning");

		for value in [json!("true"), json!(1), Value::Null] {
			let compiled = compile_json(json!({ "parking": { "value": value } }));

			assert!(compiled.expression.is_none());
		}

		let compiled = compile_json(json!({ "parking": { "value": true } }));

		assert_eq!(compiled.expression.as_deref(), Some("p.parking = $1"));
	}

	#[test]
	fn text_fields_always_use_substring_match() {
		let compiled = compile_json(json!({ "name": { "cmp": ">", "value": ["50%_off"] } }));

		assert_eq!(compiled.expression.as_deref(), Some("p.name ILIKE $1"));
		assert_eq!(compiled.params.values(), &[SqlValue::Text("%50\\%\\_off%".to_string())]);

		let compiled =
			compile_json(json!({ "merchant_category": { "value": ["cafe", "bakery"] } }));

		assert_eq!(compiled.expression.as_deref(), Some("(mc.name ILIKE $1 OR mc.name ILIKE $2)"));
		assert!(compiled.joins.contains(&Join::MerchantCategory));
	}

	#[test]
	fn membership_binds_each_element() {
		let compiled = compile_json(json!({ "id": { "cmp": "in", "value": [3, 5, 8] } }));

		assert_eq!(compiled.expression.as_deref(), Some("p.id IN ($1, $2, $3)"));
		assert_eq!(compiled.params.len(), 3);

		let compiled = compile_json(json!({ "price_level": { "cmp": "not in", "value": 4 } }));

		assert_eq!(compiled.expression.as_deref(), Some("p.price_level NOT IN ($1)"));
	}

	#[test]
	fn empty_membership_lists() {
		let compiled = compile_json(json!({ "id": { "cmp": "in", "value": [] } }));

		assert_eq!(compiled.expression.as_deref(), Some("FALSE"));

		let compiled = compile_json(json!({ "id": { "cmp": "not in", "value": [] } }));

		assert!(compiled.expression.is_none());
	}

	#[test]
	fn list_values_on_general_fields() {
		let compiled = compile_json(json!({ "service_tags": { "value": ["wifi", "quiet"] } }));

		assert_eq!(compiled.expression.as_deref(), Some("tow.tag_content IN ($1, $2)"));
		assert!(compiled.joins.contains(&Join::ServiceTags));

		let compiled = compile_json(json!({ "rating": { "cmp": "!=", "value": [1, 2] } }));

		assert_eq!(compiled.expression.as_deref(), Some("p.rating NOT IN ($1, $2)"));

		let compiled = compile_json(json!({ "rating": { "cmp": "<", "value": [4.5] } }));

		assert_eq!(compiled.expression.as_deref(), Some("p.rating < $1"));

		let compiled = compile_json(json!({ "rating": { "cmp": ">", "value": [1, 2] } }));

		assert!(compiled.expression.is_none());
		assert_eq!(compiled.dropped.len(), 1);
	}

	#[test]
	fn unknown_fields_and_missing_values_are_dropped() {
		let compiled = compile_json(json!({
			"conditions": [
				{ "vibes": { "value": "cozy" } },
				{ "rating": {} },
				{ "phone": { "value": "02" } },
				{ "rating": { "cmp": ">", "value": "high" } },
				{ "address": { "value": "Da'an" } }
			]
		}));

		assert_eq!(compiled.expression.as_deref(), Some("p.address ILIKE $1"));
		assert_eq!(
			compiled.dropped.iter().map(|leaf| leaf.field.as_str()).collect::<Vec<_>>(),
			vec!["vibes", "rating", "phone", "rating"]
		);
	}

	#[test]
	fn like_on_numeric_columns_casts_to_text() {
		let compiled = compile_json(json!({ "id": { "cmp": "like", "value": "12%" } }));

		assert_eq!(compiled.expression.as_deref(), Some("CAST(p.id AS TEXT) LIKE $1"));
	}

	#[test]
	fn compilation_is_deterministic_and_numbering_restarts() {
		let raw = json!({
			"op": "AND",
			"conditions": [
				{ "rating": { "cmp": ">", "value": 4 } },
				{ "address": { "value": "Taipei" } },
				{ "id": { "cmp": "in", "value": [1, 2] } }
			]
		});
		let first = compile_json(raw.clone());
		let second = compile_json(raw);

		assert_eq!(first.expression, second.expression);
		assert_eq!(first.params, second.params);
		assert_eq!(
			first.expression.as_deref(),
			Some("(p.rating > $1 AND p.address ILIKE $2 AND p.id IN ($3, $4))")
		);
	}

	#[test]
	fn params_serialize_as_named_map() {
		let compiled = compile_json(json!({
			"conditions": [
				{ "rating": { "cmp": ">", "value": 4 } },
				{ "name": { "value": "Tea" } }
			]
		}));
		let value = serde_json::to_value(&compiled.params).expect("serialize failed");

		assert_eq!(value, json!({ "p0": 4.0, "p1": "%Tea%" }));
		assert_eq!(compiled.params.get("p1"), Some(&SqlValue::Text("%Tea%".to_string())));
		assert_eq!(compiled.params.get("p9"), None);
	}

	#[test]
	fn escape_like_escapes_metacharacters() {
		assert_eq!(escape_like(r"a\b%c_d"), r"a\\b\%c\_d");
	}
}
