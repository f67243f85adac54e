//! Tabular loader: csv and dataloom tables chunked row-wise.
//!
//! A split mid-row destroys the record it was carrying, so chunking packs
//! whole lines and only falls back to character splitting for a single
//! row that alone exceeds the chunk ceiling.

use async_trait::async_trait;
use uuid::Uuid;

use super::{read_text_document, DocumentLoader};
use crate::config::ChunkingSettings;
use crate::models::{Chunk, Document, DocumentType};
use crate::splitter::split_text;
use crate::vault::Vault;

pub struct TabularLoader;

#[async_trait]
impl DocumentLoader for TabularLoader {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["csv", "loom", "dataloom"]
    }

    fn doc_type(&self) -> DocumentType {
        DocumentType::Csv
    }

    async fn read_by_path(
        &self,
        vault: &Vault,
        rel_path: &str,
        _gen_cache_content: bool,
    ) -> Option<Document> {
        let doc_type = match crate::vault::extension_of(rel_path).as_str() {
            "loom" | "dataloom" => DocumentType::Dataloom,
            _ => DocumentType::Csv,
        };
        read_text_document(vault, rel_path, doc_type)
    }

    fn chunk_content(&self, doc: &Document, settings: &ChunkingSettings) -> Vec<Chunk> {
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

        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();
        for line in content.split_inclusive('\n') {
            if line.len() > settings.max_chunk_size {
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                }
                pieces.extend(split_text(
                    line,
                    settings.max_chunk_size,
                    settings.chunk_overlap,
                ));
                continue;
            }
            if current.len() + line.len() > settings.max_chunk_size && !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            current.push_str(line);
        }
        if !current.is_empty() {
            pieces.push(current);
        }

        pieces
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
}
