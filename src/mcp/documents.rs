//! Read-only documents (domain schema, process definitions) served as MCP resources.

use crate::config::{DocumentConfig, DocumentSource};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("failed to read {uri}: {source}")]
    Read {
        uri: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug, Default)]
pub struct DocumentStore {
    documents: Vec<DocumentConfig>,
    /// Relative document paths resolve against this directory (the config file's).
    base_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(documents: Vec<DocumentConfig>, base_dir: impl Into<PathBuf>) -> Self {
        DocumentStore {
            documents,
            base_dir: base_dir.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Entries for `resources/list`.
    pub fn list(&self) -> Vec<Value> {
        self.documents
            .iter()
            .map(|d| {
                json!({
                    "uri": d.uri,
                    "name": d.name,
                    "description": d.description,
                    "mimeType": d.mime_type,
                })
            })
            .collect()
    }

    /// Result body for `resources/read`.
    pub async fn read(&self, uri: &str) -> Result<Value, DocumentError> {
        let doc = self
            .documents
            .iter()
            .find(|d| d.uri == uri)
            .ok_or_else(|| DocumentError::NotFound(uri.to_string()))?;
        let text = match &doc.source {
            DocumentSource::Text(t) => t.clone(),
            DocumentSource::Path(p) => {
                let path = self.resolve_path(p);
                tokio::fs::read_to_string(&path).await.map_err(|source| DocumentError::Read {
                    uri: uri.to_string(),
                    source,
                })?
            }
        };
        Ok(json!({
            "contents": [{"uri": doc.uri, "mimeType": doc.mime_type, "text": text}]
        }))
    }

    fn resolve_path(&self, p: &str) -> PathBuf {
        let path = Path::new(p);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(uri: &str, source: DocumentSource) -> DocumentConfig {
        DocumentConfig {
            uri: uri.into(),
            name: "Domain DBML".into(),
            description: None,
            mime_type: "text/plain".into(),
            source,
        }
    }

    #[tokio::test]
    async fn test_reads_inline_text() {
        let store = DocumentStore::new(vec![doc("domain://dbml", DocumentSource::Text("Table users {}".into()))], ".");
        let body = store.read("domain://dbml").await.unwrap();
        assert_eq!(body["contents"][0]["text"], "Table users {}");
        assert_eq!(store.list()[0]["mimeType"], "text/plain");
    }

    #[tokio::test]
    async fn test_unknown_uri_and_missing_file() {
        let store = DocumentStore::new(
            vec![doc("process://bpmn", DocumentSource::Path("does-not-exist.bpmn".into()))],
            std::env::temp_dir(),
        );
        assert!(matches!(store.read("x://y").await, Err(DocumentError::NotFound(_))));
        assert!(matches!(store.read("process://bpmn").await, Err(DocumentError::Read { .. })));
    }
}
