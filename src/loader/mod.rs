//! Per-format document loaders.
//!
//! One loader per document type, all behind [`DocumentLoader`]. Loaders
//! normalize raw files into the uniform [`Document`] model, know how to
//! chunk their own content type, and expose the cheap metadata scan used
//! by the change detector. Read errors are swallowed as best-effort: a
//! single bad file must never abort a whole indexing pass, so
//! [`DocumentLoader::read_by_path`] fails closed with `None`.

mod image;
mod json;
mod markdown;
mod office;
mod pdf;
mod tabular;
mod text;

pub use image::ImageLoader;
pub use json::JsonLoader;
pub use markdown::MarkdownLoader;
pub use office::OfficeLoader;
pub use pdf::PdfLoader;
pub use tabular::TabularLoader;
pub use text::PlainTextLoader;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::ChunkingSettings;
use crate::hash;
use crate::models::{Chunk, Document, DocumentMetadata, DocumentType, FileInfo};
use crate::splitter::split_text;
use crate::summarize::Summarizer;
use crate::vault::{ScanRecord, Vault};

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Extensions this loader owns. No overlap is permitted across loaders.
    fn supported_extensions(&self) -> &'static [&'static str];

    /// Primary document type for dispatch display.
    fn doc_type(&self) -> DocumentType;

    /// Resolve a vault-relative path into a [`Document`]. Returns `None`
    /// if the file does not exist, has an unsupported extension, or fails
    /// to parse. When `gen_cache_content` is false, expensive derived
    /// content (extraction, AI description) is skipped and left empty;
    /// the content hash is still computed.
    async fn read_by_path(
        &self,
        vault: &Vault,
        rel_path: &str,
        gen_cache_content: bool,
    ) -> Option<Document>;

    /// Split a document's already-extracted content into chunks. Pure:
    /// no I/O, deterministic apart from fresh chunk ids.
    fn chunk_content(&self, doc: &Document, settings: &ChunkingSettings) -> Vec<Chunk> {
        default_chunks(doc, settings)
    }

    /// Cheap batched `{path, mtime, type}` records for every file this
    /// loader owns. Content is never read here.
    fn scan_documents(&self, vault: &Vault, limit: Option<usize>) -> Result<Vec<Vec<ScanRecord>>> {
        vault.scan(self.supported_extensions(), limit)
    }

    /// Produce an AI summary (or description) of the document. The default
    /// summarizes extracted text; fails with an explicit error when no
    /// summarizer is configured.
    async fn get_summary(
        &self,
        _vault: &Vault,
        doc: &Document,
        summarizer: &dyn Summarizer,
    ) -> Result<String> {
        if !summarizer.is_available() {
            anyhow::bail!(
                "No summarizer configured; cannot summarize {}",
                doc.source_info.path
            );
        }
        let mut vars = HashMap::new();
        vars.insert("title".to_string(), doc.metadata.title.clone());
        vars.insert(
            "content".to_string(),
            doc.indexable_content().chars().take(8000).collect(),
        );
        summarizer.complete("document-summary", &vars, None).await
    }
}

/// Shared chunking policy: content at or below the whole-document
/// threshold stays as exactly one chunk with no synthetic id; larger
/// content goes through the recursive splitter with fresh ids and
/// contiguous indices from 0.
pub fn default_chunks(doc: &Document, settings: &ChunkingSettings) -> Vec<Chunk> {
    let content = doc.indexable_content();
    if content.is_empty() {
        return Vec::new();
    }

    if content.len() <= settings.min_document_size_for_chunking {
        return vec![Chunk {
            doc_id: doc.id.clone(),
            chunk_id: None,
            chunk_index: 0,
            content: content.to_string(),
        }];
    }

    split_text(content, settings.max_chunk_size, settings.chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Chunk {
            doc_id: doc.id.clone(),
            chunk_id: Some(Uuid::new_v4().to_string()),
            chunk_index: i as i64,
            content: piece,
        })
        .collect()
}

/// Assemble the common parts of a [`Document`] from a vault file.
/// Returns `None` when the file cannot be stat'ed.
pub(crate) fn base_document(
    vault: &Vault,
    rel_path: &str,
    doc_type: DocumentType,
) -> Option<Document> {
    let stat = match vault.stat(rel_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Warning: cannot stat {}: {}", rel_path, e);
            return None;
        }
    };

    let name = std::path::Path::new(rel_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| rel_path.to_string());

    let info = FileInfo {
        path: rel_path.to_string(),
        name: name.clone(),
        extension: crate::vault::extension_of(rel_path),
        size: stat.size,
        mtime: stat.mtime,
        ctime: stat.ctime,
        content: String::new(),
    };

    let stem = std::path::Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or(name);

    Some(Document {
        id: hash::doc_id_for_path(rel_path),
        doc_type,
        source_info: info.clone(),
        cache_info: info,
        metadata: DocumentMetadata {
            title: stem,
            ..DocumentMetadata::default()
        },
        outgoing: Vec::new(),
        incoming: Vec::new(),
        summary: None,
        content_hash: String::new(),
        last_processed_at: None,
    })
}

/// Read a text-native file into a [`Document`]: raw text in
/// `source_info.content`, mirrored into `cache_info.content`, hash over
/// normalized text.
pub(crate) fn read_text_document(
    vault: &Vault,
    rel_path: &str,
    doc_type: DocumentType,
) -> Option<Document> {
    let mut doc = base_document(vault, rel_path, doc_type)?;
    let text = match vault.read_text(rel_path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Warning: cannot read {}: {}", rel_path, e);
            return None;
        }
    };
    doc.content_hash = hash::hash_text(&text);
    doc.source_info.content = text.clone();
    doc.cache_info.content = text;
    Some(doc)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::config::VaultConfig;
    use std::path::Path;

    pub fn open_vault(root: &Path) -> Vault {
        Vault::open(&VaultConfig {
            root: root.to_path_buf(),
            exclude_globs: vec![],
            follow_symlinks: false,
            scan_batch_size: 100,
        })
        .unwrap()
    }

    pub fn settings(max: usize, overlap: usize, min: usize) -> ChunkingSettings {
        ChunkingSettings {
            max_chunk_size: max,
            chunk_overlap: overlap,
            min_document_size_for_chunking: min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[tokio::test]
    async fn small_document_stays_single_chunk_without_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tiny.md"), "just fifty characters of markdown text here al").unwrap();
        let vault = open_vault(dir.path());
        let loader = MarkdownLoader;
        let doc = loader.read_by_path(&vault, "tiny.md", true).await.unwrap();
        let chunks = loader.chunk_content(&doc, &settings(1000, 200, 1500));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].chunk_id.is_none());
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].content, doc.indexable_content());
    }

    #[tokio::test]
    async fn large_document_gets_indexed_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let body = "A sentence about vaults. ".repeat(200); // 5000 chars
        std::fs::write(dir.path().join("big.txt"), &body).unwrap();
        let vault = open_vault(dir.path());
        let loader = PlainTextLoader;
        let doc = loader.read_by_path(&vault, "big.txt", true).await.unwrap();
        let chunks = loader.chunk_content(&doc, &settings(1000, 200, 1500));
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert!(c.content.len() <= 1000);
            assert!(c.chunk_id.is_some());
        }
    }

    #[tokio::test]
    async fn missing_file_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let vault = open_vault(dir.path());
        assert!(MarkdownLoader
            .read_by_path(&vault, "ghost.md", true)
            .await
            .is_none());
    }
}
