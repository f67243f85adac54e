//! Incremental indexing pipeline: scan, classify, process, sweep.
//!
//! The mtime is only a cheap pre-filter; the content hash is the single
//! source of truth for whether a document changed. A document whose mtime
//! moved but whose hash did not is reclassified as unchanged and only its
//! recorded mtime is refreshed.
//!
//! Cancellation is checked at batch boundaries, never mid-document, so an
//! interrupted pass leaves every processed document fully committed. The
//! deletion sweep runs only on complete, unlimited passes; a partial scan
//! must not mistake unscanned files for deleted ones.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::embed_pipeline;
use crate::models::{
    DocStatistics, Document, DocumentType, GraphEdgeKind, GraphNodeKind, IndexReport, RefKind,
};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, Throttle};
use crate::registry::LoaderRegistry;
use crate::summarize::{create_summarizer, Summarizer};
use crate::vault::{ScanRecord, Vault};

/// Shared cancellation flag, flipped from a signal handler.
pub type CancelFlag = Arc<AtomicBool>;

pub fn cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Ignore stored state and reprocess every file.
    pub full: bool,
    /// Cap on files processed this pass. Disables the deletion sweep.
    pub limit: Option<usize>,
    /// Classify only; write nothing.
    pub dry_run: bool,
}

enum Change {
    New,
    Modified,
    /// Content identical; at most the recorded mtime needs refreshing.
    Unchanged { refresh_mtime: bool },
}

pub struct IndexService {
    pool: SqlitePool,
    config: Config,
    registry: LoaderRegistry,
    vault: Vault,
    summarizer: Box<dyn Summarizer>,
    in_flight: Mutex<HashSet<String>>,
}

impl IndexService {
    pub fn new(pool: SqlitePool, config: Config) -> Result<Self> {
        let registry = LoaderRegistry::new()?;
        let vault = Vault::open(&config.vault)?;
        let summarizer = create_summarizer(&config.summarizer)?;
        Ok(Self {
            pool,
            config,
            registry,
            vault,
            summarizer,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn registry(&self) -> &LoaderRegistry {
        &self.registry
    }

    /// Run one indexing pass.
    pub async fn run(
        &self,
        options: &IndexOptions,
        cancel: &CancelFlag,
        reporter: &dyn IndexProgressReporter,
    ) -> Result<IndexReport> {
        reporter.report(IndexProgressEvent::Scanning {
            vault: self.vault.root().display().to_string(),
        });

        let known = self.load_known().await?;

        let mut report = IndexReport::default();
        let mut seen_paths: HashSet<String> = HashSet::new();
        let mut processed = 0usize;
        let mut throttle = Throttle::new(Duration::from_secs(2));

        let batches = self.scan_all(options.limit)?;
        let total: u64 = batches.iter().map(|b| b.len() as u64).sum();

        'outer: for batch in &batches {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }
            for record in batch {
                if let Some(limit) = options.limit {
                    if processed >= limit {
                        break 'outer;
                    }
                }
                report.scanned += 1;
                seen_paths.insert(record.path.clone());

                let change = if options.full {
                    if known.contains_key(&record.path) {
                        Change::Modified
                    } else {
                        Change::New
                    }
                } else {
                    self.classify(&known, record).await
                };
                match change {
                    Change::Unchanged { refresh_mtime } => {
                        report.unchanged += 1;
                        if refresh_mtime && !options.dry_run {
                            self.refresh_mtime(&record.path, record.mtime).await?;
                        }
                    }
                    change => {
                        match change {
                            Change::New => report.new += 1,
                            _ => report.modified += 1,
                        }
                        if !options.dry_run {
                            match self.process_path(&record.path).await {
                                Ok(Some(counts)) => {
                                    report.chunks_written += counts.chunks;
                                    report.embeddings_written += counts.embedded;
                                    report.embeddings_pending += counts.pending;
                                }
                                // Coalesced with an in-flight pass, or the
                                // loader skipped the file.
                                Ok(None) => {}
                                Err(e) => {
                                    eprintln!(
                                        "Warning: failed to index {}: {}",
                                        record.path, e
                                    );
                                }
                            }
                        }
                        processed += 1;
                    }
                }

                if throttle.ready(report.scanned == total) {
                    reporter.report(IndexProgressEvent::Processing {
                        n: report.scanned,
                        total,
                    });
                }
            }
        }

        // Sweep only when the scan demonstrably covered the whole vault.
        if !report.cancelled && options.limit.is_none() && !options.dry_run {
            report.deleted = self.sweep_deleted(&known, &seen_paths).await?;
        }

        if !options.dry_run {
            self.update_status().await?;
        }
        Ok(report)
    }

    fn scan_all(&self, limit: Option<usize>) -> Result<Vec<Vec<ScanRecord>>> {
        let mut batches = Vec::new();
        for loader in self.registry.all() {
            batches.extend(loader.scan_documents(&self.vault, limit)?);
        }
        Ok(batches)
    }

    async fn load_known(&self) -> Result<HashMap<String, KnownState>> {
        let rows = sqlx::query("SELECT path, mtime, content_hash FROM documents")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get::<String, _>("path"),
                    KnownState {
                        mtime: row.get("mtime"),
                        content_hash: row.get("content_hash"),
                    },
                )
            })
            .collect())
    }

    async fn classify(&self, known: &HashMap<String, KnownState>, record: &ScanRecord) -> Change {
        let state = match known.get(&record.path) {
            Some(s) => s,
            None => return Change::New,
        };
        if state.mtime == record.mtime {
            return Change::Unchanged {
                refresh_mtime: false,
            };
        }
        // mtime moved: hash the content cheaply (no extraction) to decide.
        let loader = match self.registry.for_path(&record.path) {
            Some(l) => l,
            None => return Change::Unchanged {
                refresh_mtime: false,
            },
        };
        match loader.read_by_path(&self.vault, &record.path, false).await {
            Some(doc) if doc.content_hash == state.content_hash => Change::Unchanged {
                refresh_mtime: true,
            },
            Some(_) => Change::Modified,
            None => Change::Unchanged {
                refresh_mtime: false,
            },
        }
    }

    async fn refresh_mtime(&self, path: &str, mtime: i64) -> Result<()> {
        sqlx::query("UPDATE documents SET mtime = ? WHERE path = ?")
            .bind(mtime)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fully process one document: load, chunk, persist, graph, embed.
    /// Returns `None` when another pass already holds this path or the
    /// loader declined the file.
    pub async fn process_path(&self, rel_path: &str) -> Result<Option<DocCounts>> {
        {
            let mut guard = self.in_flight.lock().await;
            if !guard.insert(rel_path.to_string()) {
                return Ok(None);
            }
        }
        let result = self.process_path_inner(rel_path).await;
        self.in_flight.lock().await.remove(rel_path);
        result
    }

    async fn process_path_inner(&self, rel_path: &str) -> Result<Option<DocCounts>> {
        let loader = self
            .registry
            .for_path(rel_path)
            .ok_or_else(|| anyhow!("No loader for {}", rel_path))?;

        let mut doc = match loader.read_by_path(&self.vault, rel_path, true).await {
            Some(d) => d,
            None => return Ok(None),
        };

        // Images have no extractable text; a vision description is their
        // only retrieval content. Best-effort.
        if doc.doc_type == DocumentType::Image && self.summarizer.is_available() {
            match loader
                .get_summary(&self.vault, &doc, self.summarizer.as_ref())
                .await
            {
                Ok(description) => {
                    doc.summary = Some(description.clone());
                    doc.cache_info.content = description;
                }
                Err(e) => {
                    eprintln!("Warning: could not describe {}: {}", rel_path, e);
                }
            }
        }

        doc.last_processed_at = Some(chrono::Utc::now().timestamp());
        let chunks = loader.chunk_content(&doc, &self.config.chunking);

        let mut tx = self.pool.begin().await?;
        upsert_document(&mut tx, &doc).await?;
        replace_chunks(&mut tx, &doc.id, &chunks).await?;
        write_graph(&mut tx, &doc).await?;
        tx.commit().await?;

        let (embedded, pending) =
            embed_pipeline::embed_chunks_inline(&self.config, &self.pool, &chunks).await;

        Ok(Some(DocCounts {
            chunks: chunks.len() as u64,
            embedded,
            pending,
        }))
    }

    /// Delete index state for documents no longer on disk.
    async fn sweep_deleted(
        &self,
        known: &HashMap<String, KnownState>,
        seen: &HashSet<String>,
    ) -> Result<u64> {
        let mut deleted = 0u64;
        for path in known.keys() {
            if seen.contains(path) {
                continue;
            }
            let doc_id: Option<String> =
                sqlx::query_scalar("SELECT id FROM documents WHERE path = ?")
                    .bind(path)
                    .fetch_optional(&self.pool)
                    .await?;
            let Some(doc_id) = doc_id else { continue };

            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
                .bind(&doc_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chunks WHERE document_id = ?")
                .bind(&doc_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM embeddings WHERE file_id = ?")
                .bind(&doc_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM graph_edges WHERE from_id = ? OR to_id = ?")
                .bind(&doc_id)
                .bind(&doc_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM graph_nodes WHERE id = ?")
                .bind(&doc_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(&doc_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn update_status(&self) -> Result<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO index_status (id, built_at, indexed_docs) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                built_at = excluded.built_at,
                indexed_docs = excluded.indexed_docs
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

struct KnownState {
    mtime: i64,
    content_hash: String,
}

#[derive(Debug, Clone, Copy)]
pub struct DocCounts {
    pub chunks: u64,
    pub embedded: u64,
    pub pending: u64,
}

/// Derived ranking features of the indexable text: whitespace word count,
/// a script-level language tag, and type-token richness.
fn content_stats(text: &str) -> DocStatistics {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return DocStatistics::default();
    }
    let distinct: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();

    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    let latin = letters.iter().filter(|c| c.is_ascii_alphabetic()).count();
    // Script heuristic only; a ranking feature, not a claim about content.
    let language = if letters.is_empty() || latin * 10 >= letters.len() * 9 {
        "latin".to_string()
    } else {
        "other".to_string()
    };

    DocStatistics {
        word_count: words.len() as i64,
        language,
        richness: distinct.len() as f64 / words.len() as f64,
    }
}

async fn upsert_document(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    doc: &Document,
) -> Result<()> {
    let stats = content_stats(doc.indexable_content());
    let tags_json = serde_json::to_string(&doc.metadata.tags)?;
    let categories_json = serde_json::to_string(&doc.metadata.categories)?;
    let frontmatter_json = doc
        .metadata
        .frontmatter
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO documents
            (id, path, doc_type, title, size, mtime, ctime, content_hash,
             tags_json, categories_json, frontmatter_json, summary,
             last_processed_at, word_count, language, richness)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            path = excluded.path,
            doc_type = excluded.doc_type,
            title = excluded.title,
            size = excluded.size,
            mtime = excluded.mtime,
            ctime = excluded.ctime,
            content_hash = excluded.content_hash,
            tags_json = excluded.tags_json,
            categories_json = excluded.categories_json,
            frontmatter_json = excluded.frontmatter_json,
            summary = excluded.summary,
            last_processed_at = excluded.last_processed_at,
            word_count = excluded.word_count,
            language = excluded.language,
            richness = excluded.richness
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.source_info.path)
    .bind(doc.doc_type.as_str())
    .bind(&doc.metadata.title)
    .bind(doc.source_info.size)
    .bind(doc.source_info.mtime)
    .bind(doc.source_info.ctime)
    .bind(&doc.content_hash)
    .bind(tags_json)
    .bind(categories_json)
    .bind(frontmatter_json)
    .bind(&doc.summary)
    .bind(doc.last_processed_at)
    .bind(stats.word_count)
    .bind(&stats.language)
    .bind(stats.richness)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn replace_chunks(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    doc_id: &str,
    chunks: &[crate::models::Chunk],
) -> Result<()> {
    sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
        .bind(doc_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(doc_id)
        .execute(&mut **tx)
        .await?;
    // A document that re-chunks shorter would otherwise keep embedding
    // rows past the new count, and those still feed the vector channel.
    sqlx::query("DELETE FROM embeddings WHERE file_id = ? AND chunk_index >= ?")
        .bind(doc_id)
        .bind(chunks.len() as i64)
        .execute(&mut **tx)
        .await?;

    for chunk in chunks {
        let row_id = format!("{}:{}", doc_id, chunk.chunk_index);
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, content, content_hash) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&row_id)
        .bind(doc_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(crate::hash::hash_text(&chunk.content))
        .execute(&mut **tx)
        .await?;

        sqlx::query("INSERT INTO chunks_fts (chunk_id, document_id, content) VALUES (?, ?, ?)")
            .bind(&row_id)
            .bind(doc_id)
            .bind(&chunk.content)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Rewrite this document's node and outgoing edges. Wiki-link targets that
/// resolve to an indexed document link directly; unresolved targets get a
/// placeholder link node that later resolves into a document node without
/// edge rewrites.
async fn write_graph(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    doc: &Document,
) -> Result<()> {
    upsert_node(tx, &doc.id, GraphNodeKind::Document, &doc.metadata.title).await?;
    sqlx::query("DELETE FROM graph_edges WHERE from_id = ?")
        .bind(&doc.id)
        .execute(&mut **tx)
        .await?;

    for reference in &doc.outgoing {
        let (node_id, node_kind, edge_kind) = match reference.kind {
            RefKind::Link => {
                match resolve_link_target(tx, &reference.target).await? {
                    Some(target_id) => (target_id, GraphNodeKind::Document, GraphEdgeKind::References),
                    None => (
                        format!("link:{}", reference.target),
                        GraphNodeKind::Link,
                        GraphEdgeKind::References,
                    ),
                }
            }
            RefKind::Tag => (
                format!("tag:{}", reference.target),
                GraphNodeKind::Tag,
                GraphEdgeKind::Tagged,
            ),
            RefKind::Category => (
                format!("category:{}", reference.target),
                GraphNodeKind::Category,
                GraphEdgeKind::Categorized,
            ),
        };

        if node_kind != GraphNodeKind::Document {
            upsert_node(tx, &node_id, node_kind, &reference.target).await?;
        }
        sqlx::query(
            r#"
            INSERT INTO graph_edges (from_id, to_id, kind, weight) VALUES (?, ?, ?, 1.0)
            ON CONFLICT(from_id, to_id, kind) DO NOTHING
            "#,
        )
        .bind(&doc.id)
        .bind(&node_id)
        .bind(edge_kind.as_str())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn upsert_node(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: &str,
    kind: GraphNodeKind,
    label: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO graph_nodes (id, kind, label) VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET kind = excluded.kind, label = excluded.label
        "#,
    )
    .bind(id)
    .bind(kind.as_str())
    .bind(label)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// A wiki-link target names a note by title or by path without extension.
/// Runs on the open transaction so the lookup never contends for a second
/// pool connection mid-write.
async fn resolve_link_target(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    target: &str,
) -> Result<Option<String>> {
    let id: Option<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM documents
        WHERE path = ? OR path = ? || '.md' OR title = ?
        ORDER BY path LIMIT 1
        "#,
    )
    .bind(target)
    .bind(target)
    .bind(target)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(id)
}
