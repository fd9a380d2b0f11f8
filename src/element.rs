use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ID: &str = "id";
pub const PARENT: &str = "parent";
pub const SOURCE: &str = "source";
pub const TARGET: &str = "target";
pub const CUSTOM: &str = "custom";

/// Fields that hold element references and are namespaced in storage.
pub const REFERENCE_FIELDS: [&str; 4] = [ID, PARENT, SOURCE, TARGET];

/// Server computed relationship views. Never accepted as import input.
pub const RELATIONSHIP_FIELDS: [&str; 3] = ["contains", "sourceOf", "targetOf"];

/// Bookkeeping stamped by the platform. Removed from exported documents.
pub const BOOKKEEPING_FIELDS: [&str; 10] = [
	"project",
	"branch",
	"org",
	"createdOn",
	"createdBy",
	"updatedOn",
	"lastModifiedBy",
	"archived",
	"archivedOn",
	"archivedBy",
];

/// Bookkeeping a client may send back in an import payload and which is
/// discarded before reconciliation.
pub const CLIENT_IMMUTABLE_FIELDS: [&str; 7] = [
	"branch",
	"org",
	"project",
	"createdOn",
	"createdBy",
	"updatedOn",
	"lastModifiedBy",
];

/// A node or edge of a branch's model graph.
///
/// Elements are kept as an ordered JSON object rather than a fixed struct: the
/// platform lets clients attach arbitrary properties, and change detection
/// works property by property over whatever the incoming document carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Element(Map<String, Value>);

impl Element {
	pub fn new() -> Self {
		Self::default()
	}

	/// Convenience constructor for an element with only an id.
	pub fn with_id(id: impl Into<String>) -> Self {
		let mut el = Self::new();
		el.set(ID, Value::String(id.into()));
		el
	}

	/// Builder-style property setter.
	pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
		self.set(key, value.into());
		self
	}

	pub fn id(&self) -> Option<&str> {
		self.str_field(ID)
	}

	pub fn parent(&self) -> Option<&str> {
		self.str_field(PARENT)
	}

	pub fn str_field(&self, key: &str) -> Option<&str> {
		self.0.get(key).and_then(Value::as_str)
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.0.contains_key(key)
	}

	pub fn set(&mut self, key: &str, value: Value) -> Option<Value> {
		self.0.insert(key.to_string(), value)
	}

	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.0.remove(key)
	}

	/// Own property names in document order.
	pub fn property_names(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
		self.0.iter()
	}

	pub fn as_map(&self) -> &Map<String, Value> {
		&self.0
	}

	pub fn into_map(self) -> Map<String, Value> {
		self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Map<String, Value>> for Element {
	fn from(map: Map<String, Value>) -> Self {
		Self(map)
	}
}

impl TryFrom<Value> for Element {
	type Error = Value;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		match value {
			Value::Object(map) => Ok(Self(map)),
			other => Err(other),
		}
	}
}

impl From<Element> for Value {
	fn from(el: Element) -> Self {
		Value::Object(el.0)
	}
}
