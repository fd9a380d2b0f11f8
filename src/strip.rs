//! Projection of stored element records into their exported (public) form.
//!
//! Stored records carry namespaced references (`org:project:branch:id`) and
//! platform bookkeeping. The public form is what an exported document holds:
//! local ids only and no bookkeeping, so the document can be edited offline
//! and imported into any branch.

use serde::Deserialize;
use serde_json::Value;

use crate::element::{BOOKKEEPING_FIELDS, Element, REFERENCE_FIELDS, RELATIONSHIP_FIELDS};
use crate::ids::denamespace;

/// What to do with the embedded `contains` / `sourceOf` / `targetOf` views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipMode {
	/// Drop the arrays from the exported element.
	#[default]
	Strip,
	/// Keep the arrays, stripping each embedded summary by the same rule.
	Retain,
}

/// The reference stripper.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceStripper {
	mode: RelationshipMode,
}

impl ReferenceStripper {
	pub fn new(mode: RelationshipMode) -> Self {
		Self { mode }
	}

	pub fn mode(&self) -> RelationshipMode {
		self.mode
	}

	/// Project one stored record into its public form.
	pub fn strip(&self, element: &Element) -> Element {
		let mut out = element.clone();
		strip_in_place(&mut out);

		for field in RELATIONSHIP_FIELDS {
			match self.mode {
				RelationshipMode::Strip => {
					out.remove(field);
				}
				RelationshipMode::Retain => {
					if let Some(Value::Array(items)) = out.remove(field) {
						let stripped: Vec<Value> = items.into_iter().map(strip_summary).collect();
						out.set(field, Value::Array(stripped));
					}
				}
			}
		}
		out
	}

	/// Batch variant of [`ReferenceStripper::strip`], order preserving.
	pub fn strip_all(&self, elements: &[Element]) -> Vec<Element> {
		elements.iter().map(|el| self.strip(el)).collect()
	}
}

/// Named capability for the platform's `getPublicData(element, 'element')`.
///
/// The reference stripper is the default implementation; alternate
/// projections can be plugged into the exporter through this trait.
pub trait PublicDataProjector: Send + Sync {
	fn public_data(&self, element: &Element) -> Element;
}

impl PublicDataProjector for ReferenceStripper {
	fn public_data(&self, element: &Element) -> Element {
		self.strip(element)
	}
}

fn strip_in_place(el: &mut Element) {
	for field in REFERENCE_FIELDS {
		let local = match el.get(field) {
			Some(Value::String(s)) => denamespace(s).to_string(),
			_ => continue,
		};
		el.set(field, Value::String(local));
	}
	for field in BOOKKEEPING_FIELDS {
		el.remove(field);
	}
}

// Embedded summaries are either full element objects or bare id strings.
fn strip_summary(summary: Value) -> Value {
	match summary {
		Value::String(s) => Value::String(denamespace(&s).to_string()),
		Value::Object(map) => {
			let mut el = Element::from(map);
			strip_in_place(&mut el);
			for field in RELATIONSHIP_FIELDS {
				el.remove(field);
			}
			el.into()
		}
		other => other,
	}
}
