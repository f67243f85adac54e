//! Core data models for the indexing and retrieval pipeline.
//!
//! These types represent the documents, chunks, embeddings, and graph
//! entities that flow between the loaders, the incremental indexer, and the
//! query engines.

use serde::{Deserialize, Serialize};

/// Closed set of document kinds the loader registry can dispatch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Markdown,
    Txt,
    Csv,
    Json,
    Html,
    Xml,
    Pdf,
    Image,
    Docx,
    Xlsx,
    Pptx,
    Excalidraw,
    Canvas,
    Dataloom,
    Folder,
    Url,
    Unknown,
}

impl DocumentType {
    /// Map a lowercase file extension to a document type.
    pub fn from_extension(ext: &str) -> DocumentType {
        match ext {
            "md" | "markdown" => DocumentType::Markdown,
            "txt" | "log" => DocumentType::Txt,
            "csv" => DocumentType::Csv,
            "json" => DocumentType::Json,
            "html" | "htm" => DocumentType::Html,
            "xml" => DocumentType::Xml,
            "pdf" => DocumentType::Pdf,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => DocumentType::Image,
            "docx" => DocumentType::Docx,
            "xlsx" => DocumentType::Xlsx,
            "pptx" => DocumentType::Pptx,
            "excalidraw" => DocumentType::Excalidraw,
            "canvas" => DocumentType::Canvas,
            "loom" | "dataloom" => DocumentType::Dataloom,
            _ => DocumentType::Unknown,
        }
    }

    /// Whether the content hash for this type is computed from raw file
    /// bytes instead of extracted text. Binary formats must hash bytes so
    /// two different files with empty extracted text stay distinguishable.
    pub fn hashes_raw_bytes(&self) -> bool {
        matches!(
            self,
            DocumentType::Pdf
                | DocumentType::Image
                | DocumentType::Docx
                | DocumentType::Xlsx
                | DocumentType::Pptx
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Markdown => "markdown",
            DocumentType::Txt => "txt",
            DocumentType::Csv => "csv",
            DocumentType::Json => "json",
            DocumentType::Html => "html",
            DocumentType::Xml => "xml",
            DocumentType::Pdf => "pdf",
            DocumentType::Image => "image",
            DocumentType::Docx => "docx",
            DocumentType::Xlsx => "xlsx",
            DocumentType::Pptx => "pptx",
            DocumentType::Excalidraw => "excalidraw",
            DocumentType::Canvas => "canvas",
            DocumentType::Dataloom => "dataloom",
            DocumentType::Folder => "folder",
            DocumentType::Url => "url",
            DocumentType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> DocumentType {
        match s {
            "markdown" => DocumentType::Markdown,
            "txt" => DocumentType::Txt,
            "csv" => DocumentType::Csv,
            "json" => DocumentType::Json,
            "html" => DocumentType::Html,
            "xml" => DocumentType::Xml,
            "pdf" => DocumentType::Pdf,
            "image" => DocumentType::Image,
            "docx" => DocumentType::Docx,
            "xlsx" => DocumentType::Xlsx,
            "pptx" => DocumentType::Pptx,
            "excalidraw" => DocumentType::Excalidraw,
            "canvas" => DocumentType::Canvas,
            "dataloom" => DocumentType::Dataloom,
            "folder" => DocumentType::Folder,
            "url" => DocumentType::Url,
            _ => DocumentType::Unknown,
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of any indexable or summarizable entity. Superset of
/// [`DocumentType`] plus the special non-file resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Document(DocumentType),
    Tag,
    Folder,
    Category,
    Url,
    Unknown,
}

/// File metadata plus (optionally) its content.
///
/// Documents carry two of these: `source_info` holds the raw on-disk view
/// (text content for text-native formats, empty for binaries) and
/// `cache_info` holds derived text (extraction, OCR, AI description).
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    /// Vault-relative path.
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub content: String,
}

/// Extracted document metadata. Recomputed from content, never authoritative.
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub title: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub frontmatter: Option<serde_json::Value>,
}

/// Kind of outgoing reference extracted from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Link,
    Tag,
    Category,
}

/// A directed reference from one document to another resource.
#[derive(Debug, Clone)]
pub struct DocumentReference {
    /// Link target as written (wiki-link text, tag name, category name).
    pub target: String,
    pub kind: RefKind,
}

/// The canonical unit of indexable content.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable id derived from the vault-relative path.
    pub id: String,
    pub doc_type: DocumentType,
    pub source_info: FileInfo,
    pub cache_info: FileInfo,
    pub metadata: DocumentMetadata,
    pub outgoing: Vec<DocumentReference>,
    /// Populated only after a global pass resolves all outgoing links.
    pub incoming: Vec<DocumentReference>,
    pub summary: Option<String>,
    /// Single source of truth for "has this document changed".
    pub content_hash: String,
    pub last_processed_at: Option<i64>,
}

impl Document {
    /// The text the index and the chunker operate on: extracted/derived
    /// content when present, otherwise the raw source text.
    pub fn indexable_content(&self) -> &str {
        if !self.cache_info.content.is_empty() {
            &self.cache_info.content
        } else {
            &self.source_info.content
        }
    }
}

/// A contiguous sub-span of a document's indexable text.
///
/// Chunk ids are generated fresh on each chunking pass; only
/// `(doc_id, chunk_index)` is positionally stable within one run. A
/// document small enough to stay whole gets exactly one chunk with no
/// synthetic id.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_id: Option<String>,
    pub chunk_index: i64,
    pub content: String,
}

/// Persisted embedding row for one chunk.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    /// Composite `file_id:chunk_index`.
    pub id: String,
    pub file_id: String,
    pub chunk_id: Option<String>,
    pub chunk_index: i64,
    /// Content hash of the chunk text at embedding time.
    pub content_hash: String,
    pub ctime: i64,
    pub mtime: i64,
    pub model: String,
    pub dims: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphNodeKind {
    Document,
    Tag,
    Category,
    Resource,
    /// Unresolved wiki-link target. Kept as a node so it can later resolve
    /// into a document without renumbering edges.
    Link,
    Concept,
    Person,
    Project,
    Custom,
}

impl GraphNodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphNodeKind::Document => "document",
            GraphNodeKind::Tag => "tag",
            GraphNodeKind::Category => "category",
            GraphNodeKind::Resource => "resource",
            GraphNodeKind::Link => "link",
            GraphNodeKind::Concept => "concept",
            GraphNodeKind::Person => "person",
            GraphNodeKind::Project => "project",
            GraphNodeKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> GraphNodeKind {
        match s {
            "document" => GraphNodeKind::Document,
            "tag" => GraphNodeKind::Tag,
            "category" => GraphNodeKind::Category,
            "resource" => GraphNodeKind::Resource,
            "link" => GraphNodeKind::Link,
            "concept" => GraphNodeKind::Concept,
            "person" => GraphNodeKind::Person,
            "project" => GraphNodeKind::Project,
            _ => GraphNodeKind::Custom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphEdgeKind {
    References,
    Tagged,
    Categorized,
    Contains,
    Related,
    PartOf,
    DependsOn,
    Similar,
    Custom,
}

impl GraphEdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphEdgeKind::References => "references",
            GraphEdgeKind::Tagged => "tagged",
            GraphEdgeKind::Categorized => "categorized",
            GraphEdgeKind::Contains => "contains",
            GraphEdgeKind::Related => "related",
            GraphEdgeKind::PartOf => "part_of",
            GraphEdgeKind::DependsOn => "depends_on",
            GraphEdgeKind::Similar => "similar",
            GraphEdgeKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> GraphEdgeKind {
        match s {
            "references" => GraphEdgeKind::References,
            "tagged" => GraphEdgeKind::Tagged,
            "categorized" => GraphEdgeKind::Categorized,
            "contains" => GraphEdgeKind::Contains,
            "related" => GraphEdgeKind::Related,
            "part_of" => GraphEdgeKind::PartOf,
            "depends_on" => GraphEdgeKind::DependsOn,
            "similar" => GraphEdgeKind::Similar,
            _ => GraphEdgeKind::Custom,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub kind: GraphNodeKind,
    pub label: String,
}

/// Edge endpoints must reference existing node ids.
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: GraphEdgeKind,
    pub weight: f64,
}

/// Per-document derived scoring inputs. Ranking features only.
#[derive(Debug, Clone, Default)]
pub struct DocStatistics {
    pub word_count: i64,
    pub language: String,
    pub richness: f64,
}

/// A ranked hit returned from the hybrid query engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub path: String,
    pub title: String,
    pub score: f64,
    pub snippet: String,
}

/// Query output plus the degraded-mode signal: `degraded` is set when the
/// vector backend was unavailable and only full-text results are included.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub results: Vec<SearchResult>,
    pub degraded: bool,
}

/// A related-document candidate ranked by the graph inspector.
#[derive(Debug, Clone)]
pub struct RankedNode {
    pub id: String,
    pub label: String,
    pub kind: GraphNodeKind,
    pub score: f64,
    /// True when reached via an explicit link rather than pure similarity.
    pub physical: bool,
}

/// A path between two documents found by the bidirectional search.
#[derive(Debug, Clone)]
pub struct GraphPath {
    /// Node ids from start to goal inclusive.
    pub nodes: Vec<String>,
    pub hops: usize,
}

/// Structured result of a full or incremental indexing pass.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub scanned: u64,
    pub new: u64,
    pub modified: u64,
    pub unchanged: u64,
    pub deleted: u64,
    pub chunks_written: u64,
    pub embeddings_written: u64,
    pub embeddings_pending: u64,
    pub cancelled: bool,
}

/// Result of the orphaned-embedding cleanup sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupReport {
    pub found: u64,
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping_covers_binary_formats() {
        assert_eq!(DocumentType::from_extension("pdf"), DocumentType::Pdf);
        assert_eq!(DocumentType::from_extension("docx"), DocumentType::Docx);
        assert_eq!(DocumentType::from_extension("png"), DocumentType::Image);
        assert_eq!(DocumentType::from_extension("weird"), DocumentType::Unknown);
    }

    #[test]
    fn binary_types_hash_raw_bytes() {
        assert!(DocumentType::Pdf.hashes_raw_bytes());
        assert!(DocumentType::Image.hashes_raw_bytes());
        assert!(!DocumentType::Markdown.hashes_raw_bytes());
        assert!(!DocumentType::Csv.hashes_raw_bytes());
    }

    #[test]
    fn type_string_roundtrip() {
        for t in [
            DocumentType::Markdown,
            DocumentType::Pdf,
            DocumentType::Dataloom,
            DocumentType::Canvas,
        ] {
            assert_eq!(DocumentType::parse(t.as_str()), t);
        }
    }

    #[test]
    fn indexable_content_prefers_cache() {
        let mut doc = Document {
            id: "d1".into(),
            doc_type: DocumentType::Pdf,
            source_info: FileInfo::default(),
            cache_info: FileInfo {
                content: "extracted".into(),
                ..FileInfo::default()
            },
            metadata: DocumentMetadata::default(),
            outgoing: vec![],
            incoming: vec![],
            summary: None,
            content_hash: String::new(),
            last_processed_at: None,
        };
        assert_eq!(doc.indexable_content(), "extracted");
        doc.cache_info.content.clear();
        doc.source_info.content = "raw".into();
        assert_eq!(doc.indexable_content(), "raw");
    }
}
