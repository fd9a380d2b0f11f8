//! Shallow change detection between an incoming element and its stored
//! counterpart.
//!
//! The comparison is intentionally shallow. Scalars compare by value. Arrays
//! and objects compare one level deep: same kind, same length (or key set),
//! and pairwise equal scalar members. A container nested inside a container
//! only counts as equal when both sides are empty. Deeply nested edits inside
//! `custom` are therefore reported as a change of the whole `custom`
//! property, and two deeply nested but identical values are still reported
//! as changed. Callers rely on unchanged flat fields being skipped, so this
//! is kept as is rather than switched to deep equality.

use serde::Serialize;
use serde_json::Value;

use crate::element::Element;

/// Result of comparing an incoming element against a stored one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
	pub has_changed: bool,
	pub properties: Vec<String>,
}

impl ChangeSet {
	pub fn touches(&self, property: &str) -> bool {
		self.properties.iter().any(|p| p == property)
	}
}

/// Shallow, asymmetric comparison contract.
pub trait Comparable {
	/// Compare the own properties of `self` against `stored`. Properties that
	/// only exist on `stored` are ignored.
	fn diff(&self, stored: &Self) -> ChangeSet;
}

impl Comparable for Element {
	fn diff(&self, stored: &Self) -> ChangeSet {
		compare(self, stored)
	}
}

/// Compare `incoming` against `stored`, property by property over the
/// incoming element's own property names.
pub fn compare(incoming: &Element, stored: &Element) -> ChangeSet {
	let properties: Vec<String> = incoming
		.iter()
		.filter(|(name, value)| match stored.get(name) {
			Some(existing) => !shallow_eq(value, existing),
			None => true,
		})
		.map(|(name, _)| name.clone())
		.collect();

	ChangeSet {
		has_changed: !properties.is_empty(),
		properties,
	}
}

fn shallow_eq(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Array(xs), Value::Array(ys)) => {
			xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| member_eq(x, y))
		}
		(Value::Object(xm), Value::Object(ym)) => {
			xm.len() == ym.len()
				&& xm
					.iter()
					.all(|(k, x)| ym.get(k).is_some_and(|y| member_eq(x, y)))
		}
		_ => scalar_eq(a, b),
	}
}

fn member_eq(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Array(xs), Value::Array(ys)) => xs.is_empty() && ys.is_empty(),
		(Value::Object(xm), Value::Object(ym)) => xm.is_empty() && ym.is_empty(),
		_ => scalar_eq(a, b),
	}
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Null, Value::Null) => true,
		(Value::Bool(x), Value::Bool(y)) => x == y,
		(Value::String(x), Value::String(y)) => x == y,
		// 1 and 1.0 are the same number in the document format. Integers
		// compare exactly so values past 2^53 are not collapsed.
		(Value::Number(x), Value::Number(y)) => {
			if x.is_f64() || y.is_f64() {
				x.as_f64() == y.as_f64()
			} else {
				x == y
			}
		}
		_ => false,
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use serde_json::json;

	use super::*;

	fn el(v: Value) -> Element {
		Element::try_from(v).unwrap()
	}

	#[test]
	fn detects_changed_name_and_ignores_equal_custom() {
		let stored = el(json!({"id": "e1", "name": "Old", "custom": {}}));
		let incoming = el(json!({"id": "e1", "name": "New", "custom": {}}));
		let changes = incoming.diff(&stored);
		assert!(changes.has_changed);
		assert_eq!(changes.properties, vec!["name".to_string()]);
		assert!(!changes.touches("parent"));
	}

	#[test]
	fn unchanged_when_every_incoming_property_matches() {
		let stored = el(json!({"id": "e1", "name": "Same", "createdBy": "admin", "custom": {"k": "v"}}));
		let incoming = el(json!({"id": "e1", "name": "Same", "custom": {"k": "v"}}));
		let changes = compare(&incoming, &stored);
		assert_eq!(changes, ChangeSet::default());
	}

	#[test]
	fn property_missing_on_stored_is_a_change() {
		let stored = el(json!({"id": "e1"}));
		let incoming = el(json!({"id": "e1", "documentation": ""}));
		assert_eq!(compare(&incoming, &stored).properties, vec!["documentation"]);
	}

	#[test]
	fn comparison_is_asymmetric() {
		let stored = el(json!({"id": "e1", "name": "A"}));
		let incoming = el(json!({"id": "e1"}));
		assert!(!compare(&incoming, &stored).has_changed);
		assert!(compare(&stored, &incoming).has_changed);
	}

	#[test]
	fn nested_containers_are_compared_shallowly() {
		let stored = el(json!({"id": "e1", "custom": {"a": {"b": 1}}}));
		let incoming = el(json!({"id": "e1", "custom": {"a": {"b": 1}}}));
		assert_eq!(compare(&incoming, &stored).properties, vec!["custom"]);

		let stored = el(json!({"id": "e1", "custom": {"a": []}}));
		let incoming = el(json!({"id": "e1", "custom": {"a": []}}));
		assert!(!compare(&incoming, &stored).has_changed);
	}

	#[test]
	fn parent_change_is_reported() {
		let stored = el(json!({"id": "e1", "parent": "model"}));
		let incoming = el(json!({"id": "e1", "parent": "holding_bin"}));
		assert!(compare(&incoming, &stored).touches("parent"));
	}

	#[test]
	fn integer_and_float_forms_are_equal() {
		let stored = el(json!({"id": "e1", "mass": 1}));
		let incoming = el(json!({"id": "e1", "mass": 1.0}));
		assert!(!compare(&incoming, &stored).has_changed);
	}

	#[test]
	fn large_integers_compare_exactly() {
		let stored = el(json!({"id": "e1", "serial": 9007199254740992_u64}));
		let incoming = el(json!({"id": "e1", "serial": 9007199254740993_u64}));
		assert_eq!(compare(&incoming, &stored).properties, vec!["serial"]);

		let stored = el(json!({"id": "e1", "serial": -9007199254740993_i64}));
		let incoming = el(json!({"id": "e1", "serial": -9007199254740993_i64}));
		assert!(!compare(&incoming, &stored).has_changed);
	}
}
