//! Plain-text family loader: txt, log, and markup files treated as text.

use async_trait::async_trait;

use super::{read_text_document, DocumentLoader};
use crate::models::{Document, DocumentType};
use crate::vault::Vault;

pub struct PlainTextLoader;

#[async_trait]
impl DocumentLoader for PlainTextLoader {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["txt", "log", "html", "htm", "xml"]
    }

    fn doc_type(&self) -> DocumentType {
        DocumentType::Txt
    }

    async fn read_by_path(
        &self,
        vault: &Vault,
        rel_path: &str,
        _gen_cache_content: bool,
    ) -> Option<Document> {
        let doc_type = match crate::vault::extension_of(rel_path).as_str() {
            "html" | "htm" => DocumentType::Html,
            "xml" => DocumentType::Xml,
            _ => DocumentType::Txt,
        };
        read_text_document(vault, rel_path, doc_type)
    }
}
