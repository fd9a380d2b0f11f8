//! Exported documents on disk: a pretty-printed JSON array of elements.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::api::ImportRequest;
use crate::element::Element;

#[derive(Debug, Error)]
pub enum DocumentError {
	#[error("failed to access {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("{path} is not a model document: {source}")]
	Json {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
}

// Files saved from the HTTP surface may still carry the request wrapper.
#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentFile {
	Array(Vec<Element>),
	Request(ImportRequest),
}

pub async fn read_document(path: &Path) -> Result<Vec<Element>, DocumentError> {
	let bytes = fs::read(path).await.map_err(|source| DocumentError::Io {
		path: path.to_path_buf(),
		source,
	})?;
	let file: DocumentFile =
		serde_json::from_slice(&bytes).map_err(|source| DocumentError::Json {
			path: path.to_path_buf(),
			source,
		})?;
	Ok(match file {
		DocumentFile::Array(elements) => elements,
		DocumentFile::Request(request) => request.into_elements(),
	})
}

pub async fn write_document(path: &Path, elements: &[Element]) -> Result<(), DocumentError> {
	let mut body = serde_json::to_vec_pretty(elements).map_err(|source| DocumentError::Json {
		path: path.to_path_buf(),
		source,
	})?;
	body.push(b'\n');
	fs::write(path, body).await.map_err(|source| DocumentError::Io {
		path: path.to_path_buf(),
		source,
	})
}

/// Document rendered for stdout.
pub fn to_pretty_string(elements: &[Element]) -> Result<String, serde_json::Error> {
	serde_json::to_string_pretty(elements)
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use serde_json::json;

	use super::*;

	#[tokio::test]
	async fn written_documents_read_back_in_order() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("model.json");
		let doc = vec![
			Element::with_id("model").with("name", "Model"),
			Element::with_id("e1").with("parent", "model").with("name", "Engine"),
		];
		write_document(&path, &doc).await.unwrap();
		assert_eq!(read_document(&path).await.unwrap(), doc);

		let text = std::fs::read_to_string(&path).unwrap();
		assert!(text.starts_with("[\n"));
		assert!(text.find("\"model\"").unwrap() < text.find("\"e1\"").unwrap());
	}

	#[tokio::test]
	async fn wrapped_request_bodies_are_accepted() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("upload.json");
		let body = json!({"type": "application/json", "data": {"data": [{"id": "e1"}]}});
		std::fs::write(&path, body.to_string()).unwrap();
		let doc = read_document(&path).await.unwrap();
		assert_eq!(doc, vec![Element::with_id("e1")]);
	}

	#[tokio::test]
	async fn bad_files_name_the_path() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("broken.json");
		std::fs::write(&path, "{not json").unwrap();
		let err = read_document(&path).await.unwrap_err();
		assert!(matches!(err, DocumentError::Json { .. }));
		assert!(err.to_string().contains("broken.json"));

		let missing = dir.path().join("missing.json");
		assert!(matches!(
			read_document(&missing).await,
			Err(DocumentError::Io { .. })
		));
	}
}
