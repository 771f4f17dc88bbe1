//! Typed form of the nested AND/OR condition tree carried by a search request.
//!
//! Wire format:
//! - group: `{"op": "AND" | "OR", "conditions": [node, ...]}` (`op` defaults to AND)
//! - leaf: `{"<field>": {"cmp": "<comparator>", "value": <scalar | [scalar, ...]>}}`
//!   (`cmp` defaults to `=`, `value` may be absent)

use std::fmt::{Display, Formatter};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result, catalog::FieldRef};

pub const MAX_TREE_DEPTH: usize = 8;
pub const MAX_TREE_NODES: usize = 128;
pub const MAX_LIST_ITEMS: usize = 128;
pub const MAX_STRING_BYTES: usize = 512;

const ROOT_PATH: &str = "$.logic_tree";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOp {
	And,
	Or,
}
impl GroupOp {
	pub fn as_sql(self) -> &'static str {
		match self {
			Self::And => "AND",
			Self::Or => "OR",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
	Eq,
	Ne,
	Gt,
	Gte,
	Lt,
	Lte,
	Like,
	In,
	NotIn,
}
impl Comparator {
	pub fn parse(raw: &str) -> Option<Self> {
		let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase();

		match normalized.as_str() {
			"=" | "==" => Some(Self::Eq),
			"!=" | "<>" => Some(Self::Ne),
			">" => Some(Self::Gt),
			">=" => Some(Self::Gte),
			"<" => Some(Self::Lt),
			"<=" => Some(Self::Lte),
			"like" => Some(Self::Like),
			"in" => Some(Self::In),
			"not in" => Some(Self::NotIn),
			_ => None,
		}
	}

	pub fn as_sql(self) -> &'static str {
		match self {
			Self::Eq => "=",
			Self::Ne => "!=",
			Self::Gt => ">",
			Self::Gte => ">=",
			Self::Lt => "<",
			Self::Lte => "<=",
			Self::Like => "LIKE",
			Self::In => "IN",
			Self::NotIn => "NOT IN",
		}
	}

	pub fn is_membership(self) -> bool {
		matches!(self, Self::In | Self::NotIn)
	}
}
impl Display for Comparator {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_sql())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
	Text(String),
	Int(i64),
	Float(f64),
	Bool(bool),
}
impl Scalar {
	/// Text used when the value becomes part of a similarity query.
	pub fn to_term(&self) -> String {
		match self {
			Self::Text(text) => text.clone(),
			Self::Int(value) => value.to_string(),
			Self::Float(value) => value.to_string(),
			Self::Bool(value) => value.to_string(),
		}
	}

	fn parse(raw: &Value, path: &str) -> Result<Self> {
		match raw {
			Value::String(text) => {
				if text.len() > MAX_STRING_BYTES {
					return Err(Error::tree(
						path,
						format!("string value exceeds {MAX_STRING_BYTES} bytes."),
					));
				}

				Ok(Self::Text(text.clone()))
			},
			Value::Bool(value) => Ok(Self::Bool(*value)),
			Value::Number(number) => number
				.as_i64()
				.map(Self::Int)
				.or_else(|| number.as_f64().filter(|value| value.is_finite()).map(Self::Float))
				.ok_or_else(|| Error::tree(path, "number is out of range.")),
			_ => Err(Error::tree(path, "value must be a string, number, or boolean.")),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum LeafValue {
	Scalar(Scalar),
	List(Vec<Scalar>),
}
impl LeafValue {
	fn parse(raw: &Value, path: &str) -> Result<Option<Self>> {
		match raw {
			Value::Null => Ok(None),
			Value::Array(items) => {
				if items.len() > MAX_LIST_ITEMS {
					return Err(Error::tree(
						path,
						format!("list exceeds maximum size ({}/{MAX_LIST_ITEMS}).", items.len()),
					));
				}

				items
					.iter()
					.enumerate()
					.map(|(index, item)| Scalar::parse(item, &format!("{path}[{index}]")))
					.collect::<Result<Vec<_>>>()
					.map(|items| Some(Self::List(items)))
			},
			other => Scalar::parse(other, path).map(|scalar| Some(Self::Scalar(scalar))),
		}
	}

	/// Every scalar in order, whether the value is a single scalar or a list.
	pub fn scalars(&self) -> &[Scalar] {
		match self {
			Self::Scalar(scalar) => std::slice::from_ref(scalar),
			Self::List(items) => items.as_slice(),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Leaf {
	pub field: FieldRef,
	pub comparator: Comparator,
	pub value: Option<LeafValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
	Group { op: GroupOp, children: Vec<Condition> },
	Leaf(Leaf),
}
impl Condition {
	/// Parses the raw request tree. `null` and `{}` mean no conditions at all.
	pub fn parse(raw: &Value) -> Result<Option<Self>> {
		if is_empty_node(raw) {
			return Ok(None);
		}

		let mut state = ParseState::default();

		parse_node(raw, ROOT_PATH, 1, &mut state).map(Some)
	}
}

#[derive(Default)]
struct ParseState {
	nodes: usize,
}

fn is_empty_node(raw: &Value) -> bool {
	match raw {
		Value::Null => true,
		Value::Object(map) => map.is_empty(),
		_ => false,
	}
}

fn parse_node(raw: &Value, path: &str, depth: usize, state: &mut ParseState) -> Result<Condition> {
	state.nodes = state.nodes.saturating_add(1);

	if state.nodes > MAX_TREE_NODES {
		return Err(Error::tree(
			path,
			format!("tree exceeds node limit ({}/{MAX_TREE_NODES}).", state.nodes),
		));
	}
	if depth > MAX_TREE_DEPTH {
		return Err(Error::tree(
			path,
			format!("tree exceeds depth limit ({depth}/{MAX_TREE_DEPTH})."),
		));
	}

	let obj = raw.as_object().ok_or_else(|| Error::tree(path, "node must be an object."))?;

	// An empty object nested in a group is an empty node: kept, contributes nothing.
	if obj.is_empty() {
		return Ok(Condition::Group { op: GroupOp::And, children: Vec::new() });
	}
	if obj.contains_key("conditions") {
		return parse_group(obj, path, depth, state);
	}

	parse_leaf(obj, path)
}

fn parse_group(
	obj: &Map<String, Value>,
	path: &str,
	depth: usize,
	state: &mut ParseState,
) -> Result<Condition> {
	if let Some(key) = obj.keys().find(|key| !matches!(key.as_str(), "op" | "conditions")) {
		return Err(Error::tree(path, format!("unexpected key '{key}' in group node.")));
	}

	let op = match obj.get("op") {
		None | Some(Value::Null) => GroupOp::And,
		Some(Value::String(raw)) => match raw.trim().to_ascii_uppercase().as_str() {
			"AND" => GroupOp::And,
			"OR" => GroupOp::Or,
			_ =>
				return Err(Error::tree(
					format!("{path}.op"),
					format!("unsupported operator '{raw}'."),
				)),
		},
		Some(_) => return Err(Error::tree(format!("{path}.op"), "operator must be a string.")),
	};
	let conditions_path = format!("{path}.conditions");
	let children = obj
		.get("conditions")
		.and_then(Value::as_array)
		.ok_or_else(|| Error::tree(&conditions_path, "conditions must be an array."))?
		.iter()
		.enumerate()
		.map(|(index, child)| {
			let child_path = format!("{conditions_path}[{index}]");

			parse_node(child, &child_path, depth.saturating_add(1), state)
		})
		.collect::<Result<Vec<_>>>()?;

	Ok(Condition::Group { op, children })
}

fn parse_leaf(obj: &Map<String, Value>, path: &str) -> Result<Condition> {
	if obj.len() != 1 {
		return Err(Error::tree(path, "leaf node must have exactly one field key."));
	}

	let Some((name, body)) = obj.iter().next() else {
		return Err(Error::tree(path, "leaf node must have exactly one field key."));
	};
	let leaf_path = format!("{path}.{name}");
	let body =
		body.as_object().ok_or_else(|| Error::tree(&leaf_path, "leaf body must be an object."))?;

	if let Some(key) = body.keys().find(|key| !matches!(key.as_str(), "cmp" | "value")) {
		return Err(Error::tree(&leaf_path, format!("unexpected key '{key}' in leaf body.")));
	}

	let comparator = match body.get("cmp") {
		None | Some(Value::Null) => Comparator::Eq,
		Some(Value::String(raw)) => Comparator::parse(raw).ok_or_else(|| {
			Error::tree(format!("{leaf_path}.cmp"), format!("unsupported comparator '{raw}'."))
		})?,
		Some(_) =>
			return Err(Error::tree(format!("{leaf_path}.cmp"), "comparator must be a string.")),
	};
	let value = match body.get("value") {
		Some(raw) => LeafValue::parse(raw, &format!("{leaf_path}.value"))?,
		None => None,
	};

	Ok(Condition::Leaf(Leaf { field: FieldRef::resolve(name), comparator, value }))
}
