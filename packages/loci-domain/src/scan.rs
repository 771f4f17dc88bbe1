use serde::Serialize;

use crate::{catalog::FieldRef, condition::Condition};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SemanticScan {
	pub needed: bool,
	/// Terms in depth-first, left-to-right order.
	pub terms: Vec<String>,
}
impl SemanticScan {
	/// The similarity query text: all terms joined by a single space.
	pub fn query_text(&self) -> String {
		self.terms.join(" ")
	}
}

pub fn scan(tree: Option<&Condition>) -> SemanticScan {
	let mut out = SemanticScan::default();

	if let Some(tree) = tree {
		visit(tree, &mut out);
	}

	out
}

fn visit(node: &Condition, out: &mut SemanticScan) {
	match node {
		Condition::Group { children, .. } =>
			for child in children {
				visit(child, out);
			},
		Condition::Leaf(leaf) => {
			let FieldRef::Semantic(_) = leaf.field else {
				return;
			};

			out.needed = true;

			if let Some(value) = &leaf.value {
				out.terms.extend(value.scalars().iter().map(|scalar| scalar.to_term()));
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn scan_json(raw: serde_json::Value) -> SemanticScan {
		let tree = Condition::parse(&raw).expect("parse failed");

		scan(tree.as_ref())
	}

	#[test]
	fn absent_tree_needs_nothing() {
		assert_eq!(scan(None), SemanticScan::default());
		assert_eq!(scan_json(json!({})), SemanticScan::default());
	}

	#[test]
	fn collects_terms_depth_first_in_array_order() {
		let scan = scan_json(json!({
			"op": "AND",
			"conditions": [
				{ "cuisine_type": { "value": "japanese" } },
				{ "op": "OR", "conditions": [
					{ "flavor": { "value": ["spicy", "sour"] } },
					{ "rating": { "cmp": ">", "value": 4 } }
				] },
				{ "dish_name": { "value": "ramen" } }
			]
		}));

		assert!(scan.needed);
		assert_eq!(scan.terms, vec!["japanese", "spicy", "sour", "ramen"]);
		assert_eq!(scan.query_text(), "japanese spicy sour ramen");
	}

	#[test]
	fn relational_only_tree_is_not_semantic() {
		let scan = scan_json(json!({
			"conditions": [
				{ "rating": { "cmp": ">", "value": 4 } },
				{ "wifi": { "value": true } },
				{ "food_type": { "value": "noodles" } }
			]
		}));

		assert_eq!(scan, SemanticScan::default());
	}

	#[test]
	fn semantic_leaf_without_value_still_requires_semantic() {
		let scan = scan_json(json!({ "flavor": {} }));

		assert!(scan.needed);
		assert!(scan.terms.is_empty());
	}
}
