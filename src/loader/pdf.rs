//! PDF loader. The content hash always covers the raw bytes; text
//! extraction is the expensive, skippable step.

use async_trait::async_trait;

use super::{base_document, DocumentLoader};
use crate::hash;
use crate::models::{Document, DocumentType};
use crate::vault::Vault;

pub struct PdfLoader;

#[async_trait]
impl DocumentLoader for PdfLoader {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn doc_type(&self) -> DocumentType {
        DocumentType::Pdf
    }

    async fn read_by_path(
        &self,
        vault: &Vault,
        rel_path: &str,
        gen_cache_content: bool,
    ) -> Option<Document> {
        let mut doc = base_document(vault, rel_path, DocumentType::Pdf)?;
        let bytes = match vault.read_bytes(rel_path) {
            Ok(b) => b,
            Err(e) => {
                eprintln!("Warning: cannot read {}: {}", rel_path, e);
                return None;
            }
        };
        doc.content_hash = hash::hash_bytes(&bytes);

        if gen_cache_content {
            match pdf_extract::extract_text_from_mem(&bytes) {
                Ok(text) => doc.cache_info.content = text.trim().to_string(),
                Err(e) => {
                    // Unextractable PDFs are still tracked by hash so the
                    // change detector does not revisit them every pass.
                    eprintln!("Warning: PDF extraction failed for {}: {}", rel_path, e);
                }
            }
        }
        Some(doc)
    }
}
