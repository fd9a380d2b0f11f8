use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between the org, project, branch and local segments of an id.
pub const ID_DELIMITER: char = ':';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
	#[error("malformed identifier '{id}': expected org:project:branch:localId")]
	Malformed { id: String },
	#[error("empty {segment} segment")]
	EmptySegment { segment: &'static str },
}

/// Join the four segments into a fully namespaced element id.
pub fn namespace(org: &str, project: &str, branch: &str, local_id: &str) -> String {
	format!("{org}{d}{project}{d}{branch}{d}{local_id}", d = ID_DELIMITER)
}

/// Return the local id (last `:` segment). Ids that carry no namespace are
/// returned unchanged.
pub fn denamespace(full_id: &str) -> &str {
	full_id.rsplit(ID_DELIMITER).next().unwrap_or(full_id)
}

/// Split a fully namespaced id into its parts.
///
/// Requires at least four segments. Local ids are not allowed to contain the
/// delimiter, so anything past the fourth segment is rejected as well.
pub fn parse_composite_id(full_id: &str) -> Result<ElementKey, IdError> {
	let parts: Vec<&str> = full_id.split(ID_DELIMITER).collect();
	if parts.len() != 4 {
		return Err(IdError::Malformed {
			id: full_id.to_string(),
		});
	}
	let scope = BranchScope::new(parts[0], parts[1], parts[2]).map_err(|_| IdError::Malformed {
		id: full_id.to_string(),
	})?;
	if parts[3].is_empty() {
		return Err(IdError::Malformed {
			id: full_id.to_string(),
		});
	}
	Ok(ElementKey {
		scope,
		local_id: parts[3].to_string(),
	})
}

/// The `(org, project, branch)` partition every element lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchScope {
	pub org: String,
	pub project: String,
	pub branch: String,
}

impl BranchScope {
	/// Build a scope, rejecting empty segments and segments that contain the
	/// delimiter (they would not survive a namespace/denamespace round trip).
	pub fn new(
		org: impl Into<String>,
		project: impl Into<String>,
		branch: impl Into<String>,
	) -> Result<Self, IdError> {
		let scope = Self {
			org: org.into(),
			project: project.into(),
			branch: branch.into(),
		};
		for (segment, value) in [
			("org", &scope.org),
			("project", &scope.project),
			("branch", &scope.branch),
		] {
			if value.is_empty() {
				return Err(IdError::EmptySegment { segment });
			}
			if value.contains(ID_DELIMITER) {
				return Err(IdError::Malformed { id: value.clone() });
			}
		}
		Ok(scope)
	}

	/// Composite key `org:project:branch` used to partition lookups.
	pub fn key(&self) -> String {
		format!(
			"{}{d}{}{d}{}",
			self.org,
			self.project,
			self.branch,
			d = ID_DELIMITER
		)
	}

	/// Namespace a local id into this branch.
	pub fn element_id(&self, local_id: &str) -> String {
		namespace(&self.org, &self.project, &self.branch, local_id)
	}

	/// True when `full_id` is namespaced into this branch.
	pub fn owns(&self, full_id: &str) -> bool {
		match parse_composite_id(full_id) {
			Ok(key) => key.scope == *self,
			Err(_) => false,
		}
	}
}

impl fmt::Display for BranchScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.key())
	}
}

/// A parsed, fully namespaced element id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementKey {
	pub scope: BranchScope,
	pub local_id: String,
}

impl fmt::Display for ElementKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.scope.element_id(&self.local_id))
	}
}
