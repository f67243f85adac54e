//! Image loader. No text to extract; retrieval content comes from an AI
//! description, so this is the one loader that hard-requires a summarizer.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use super::{base_document, DocumentLoader};
use crate::hash;
use crate::models::{Document, DocumentType};
use crate::summarize::{Attachment, Summarizer};
use crate::vault::Vault;

pub struct ImageLoader;

fn mime_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

#[async_trait]
impl DocumentLoader for ImageLoader {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp"]
    }

    fn doc_type(&self) -> DocumentType {
        DocumentType::Image
    }

    async fn read_by_path(
        &self,
        vault: &Vault,
        rel_path: &str,
        _gen_cache_content: bool,
    ) -> Option<Document> {
        let mut doc = base_document(vault, rel_path, DocumentType::Image)?;
        let bytes = match vault.read_bytes(rel_path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("Warning: cannot read {}: {}", rel_path, e);
                return None;
            }
        };
        doc.content_hash = hash::hash_bytes(&bytes);
        Some(doc)
    }

    /// Vision description. The image bytes ride along as an attachment; the
    /// result lands in `cache_info.content` at the call site so it is
    /// chunked and embedded like any extracted text.
    async fn get_summary(
        &self,
        vault: &Vault,
        doc: &Document,
        summarizer: &dyn Summarizer,
    ) -> Result<String> {
        if !summarizer.is_available() {
            anyhow::bail!(
                "No summarizer configured; cannot describe image {}",
                doc.source_info.path
            );
        }
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), doc.source_info.name.clone());
        let attachment = Attachment {
            mime: mime_for(&doc.source_info.extension).to_string(),
            bytes: vault.read_bytes(&doc.source_info.path)?,
        };
        summarizer
            .complete("image-description", &vars, Some(&attachment))
            .await
    }
}
