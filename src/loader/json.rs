//! JSON-family loader: plain json plus the excalidraw and canvas formats.
//!
//! Malformed JSON fails closed: the file is skipped rather than indexed
//! as opaque text, since a canvas or drawing mid-save is routinely invalid.

use async_trait::async_trait;

use super::{base_document, DocumentLoader};
use crate::hash;
use crate::models::{Document, DocumentType};
use crate::vault::Vault;

pub struct JsonLoader;

#[async_trait]
impl DocumentLoader for JsonLoader {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["json", "excalidraw", "canvas"]
    }

    fn doc_type(&self) -> DocumentType {
        DocumentType::Json
    }

    async fn read_by_path(
        &self,
        vault: &Vault,
        rel_path: &str,
        _gen_cache_content: bool,
    ) -> Option<Document> {
        let doc_type = match crate::vault::extension_of(rel_path).as_str() {
            "excalidraw" => DocumentType::Excalidraw,
            "canvas" => DocumentType::Canvas,
            _ => DocumentType::Json,
        };
        let mut doc = base_document(vault, rel_path, doc_type)?;

        let text = match vault.read_text(rel_path) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("Warning: cannot read {}: {}", rel_path, e);
                return None;
            }
        };
        let value: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Warning: skipping malformed JSON {}: {}", rel_path, e);
                return None;
            }
        };

        doc.content_hash = hash::hash_text(&text);
        doc.source_info.content = text.clone();
        doc.cache_info.content = match doc_type {
            DocumentType::Excalidraw => drawing_text(&value, "elements"),
            DocumentType::Canvas => drawing_text(&value, "nodes"),
            _ => text,
        };
        Some(doc)
    }
}

/// Pull the human-visible `text` fields out of a drawing's element array.
/// The geometry is noise for retrieval; the labels are the content.
fn drawing_text(value: &serde_json::Value, array_key: &str) -> String {
    let mut parts = Vec::new();
    if let Some(items) = value.get(array_key).and_then(|v| v.as_array()) {
        for item in items {
            if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
                let text = text.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
            // Canvas file-embed nodes reference other documents by path.
            if let Some(file) = item.get("file").and_then(|f| f.as_str()) {
                parts.push(file.to_string());
            }
        }
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::super::test_util::open_vault;
    use super::*;

    #[tokio::test]
    async fn canvas_extracts_node_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("board.canvas"),
            r#"{"nodes":[{"id":"a","text":"First idea"},{"id":"b","file":"notes/plan.md"},{"id":"c","x":10}],"edges":[]}"#,
        )
        .unwrap();
        let vault = open_vault(dir.path());
        let doc = JsonLoader
            .read_by_path(&vault, "board.canvas", true)
            .await
            .unwrap();
        assert_eq!(doc.doc_type, DocumentType::Canvas);
        assert_eq!(doc.indexable_content(), "First idea\nnotes/plan.md");
    }

    #[tokio::test]
    async fn malformed_json_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not valid").unwrap();
        let vault = open_vault(dir.path());
        assert!(JsonLoader
            .read_by_path(&vault, "broken.json", true)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn plain_json_indexes_raw_text() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.json"), r#"{"name":"widget"}"#).unwrap();
        let vault = open_vault(dir.path());
        let doc = JsonLoader
            .read_by_path(&vault, "data.json", true)
            .await
            .unwrap();
        assert_eq!(doc.indexable_content(), r#"{"name":"widget"}"#);
    }
}
