//! Embedding pipeline: inline embedding during indexing, catch-up and
//! rebuild passes, and orphan cleanup.
//!
//! An embedding row is fresh when its `(content_hash, model)` pair matches
//! the chunk it covers; anything else is pending work. Embedding failures
//! are never fatal to indexing, the chunks stay pending.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::embedder::{self, EmbeddingProvider};
use crate::models::{Chunk, CleanupReport, EmbeddingRecord};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, Throttle};

/// Embed freshly-written chunks during an index pass. Returns
/// `(written, pending)`. With the provider disabled everything is
/// pending; the fulltext channel still works.
pub async fn embed_chunks_inline(
    config: &Config,
    pool: &SqlitePool,
    chunks: &[Chunk],
) -> (u64, u64) {
    if !config.embedding.is_enabled() {
        return (0, chunks.len() as u64);
    }

    let provider = match embedder::create_provider(&config.embedding) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Warning: could not create embedding provider: {}", e);
            return (0, chunks.len() as u64);
        }
    };
    let model = provider.model_name().to_string();

    let mut written = 0u64;
    let mut pending = 0u64;

    for batch in chunks.chunks(config.embedding.batch_size) {
        let mut stale: Vec<(&Chunk, String)> = Vec::new();
        for chunk in batch {
            let hash = crate::hash::hash_text(&chunk.content);
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT content_hash FROM embeddings \
                 WHERE file_id = ? AND chunk_index = ? AND model = ?",
            )
            .bind(&chunk.doc_id)
            .bind(chunk.chunk_index)
            .bind(&model)
            .fetch_optional(pool)
            .await
            .unwrap_or(None);

            if existing.as_deref() == Some(hash.as_str()) {
                written += 1;
                continue;
            }
            stale.push((chunk, hash));
        }

        if stale.is_empty() {
            continue;
        }

        let texts: Vec<String> = stale.iter().map(|(c, _)| c.content.clone()).collect();
        match embedder::embed_texts(provider.as_ref(), &config.embedding, &texts).await {
            Ok(vectors) => {
                for ((chunk, hash), vec) in stale.iter().zip(vectors.iter()) {
                    let record = record_for(provider.as_ref(), chunk, hash);
                    match store_embedding(pool, &record, vec).await {
                        Ok(()) => written += 1,
                        Err(e) => {
                            eprintln!(
                                "Warning: failed to store embedding for {}:{}: {}",
                                chunk.doc_id, chunk.chunk_index, e
                            );
                            pending += 1;
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
                pending += stale.len() as u64;
            }
        }
    }

    (written, pending)
}

/// Row metadata for one chunk's vector, ready to persist.
fn record_for(provider: &dyn EmbeddingProvider, chunk: &Chunk, content_hash: &str) -> EmbeddingRecord {
    let now = chrono::Utc::now().timestamp();
    EmbeddingRecord {
        id: format!("{}:{}", chunk.doc_id, chunk.chunk_index),
        file_id: chunk.doc_id.clone(),
        chunk_id: chunk.chunk_id.clone(),
        chunk_index: chunk.chunk_index,
        content_hash: content_hash.to_string(),
        ctime: now,
        mtime: now,
        model: provider.model_name().to_string(),
        dims: provider.dims() as i64,
    }
}

async fn store_embedding(pool: &SqlitePool, record: &EmbeddingRecord, vector: &[f32]) -> Result<()> {
    let blob = embedder::vec_to_blob(vector);
    sqlx::query(
        r#"
        INSERT INTO embeddings
            (id, file_id, chunk_id, chunk_index, content_hash, model, dims, ctime, mtime, embedding)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(file_id, chunk_index) DO UPDATE SET
            chunk_id = excluded.chunk_id,
            content_hash = excluded.content_hash,
            model = excluded.model,
            dims = excluded.dims,
            mtime = excluded.mtime,
            embedding = excluded.embedding
        "#,
    )
    .bind(&record.id)
    .bind(&record.file_id)
    .bind(&record.chunk_id)
    .bind(record.chunk_index)
    .bind(&record.content_hash)
    .bind(&record.model)
    .bind(record.dims)
    .bind(record.ctime)
    .bind(record.mtime)
    .bind(blob)
    .execute(pool)
    .await?;
    Ok(())
}

struct PendingChunk {
    doc_id: String,
    chunk_index: i64,
    content: String,
    content_hash: String,
}

/// Chunks with no embedding for the active model, or a stale one.
async fn find_pending(
    pool: &SqlitePool,
    model: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingChunk>> {
    let rows = sqlx::query(
        r#"
        SELECT c.document_id, c.chunk_index, c.content, c.content_hash
        FROM chunks c
        LEFT JOIN embeddings e
            ON e.file_id = c.document_id AND e.chunk_index = c.chunk_index AND e.model = ?
        WHERE e.id IS NULL OR e.content_hash != c.content_hash
        ORDER BY c.document_id, c.chunk_index
        LIMIT ?
        "#,
    )
    .bind(model)
    .bind(limit.map(|l| l as i64).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PendingChunk {
            doc_id: row.get("document_id"),
            chunk_index: row.get("chunk_index"),
            content: row.get("content"),
            content_hash: row.get("content_hash"),
        })
        .collect())
}

/// Embed chunks left pending by earlier passes (provider outage, inline
/// embedding disabled at index time).
pub async fn run_embed_pending(
    config: &Config,
    pool: &SqlitePool,
    limit: Option<usize>,
    dry_run: bool,
    reporter: &dyn IndexProgressReporter,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    let provider = embedder::create_provider(&config.embedding)?;
    let pending = find_pending(pool, provider.model_name(), limit).await?;

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  chunks needing embeddings: {}", pending.len());
        return Ok(());
    }
    if pending.is_empty() {
        println!("embed pending");
        println!("  all chunks up to date");
        return Ok(());
    }

    let (embedded, failed) =
        embed_pending_list(config, pool, provider.as_ref(), &pending, reporter).await;

    println!("embed pending");
    println!("  total pending: {}", pending.len());
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);
    Ok(())
}

/// Drop every embedding and regenerate from scratch. Model or dimension
/// changes go through here.
pub async fn run_embed_rebuild(
    config: &Config,
    pool: &SqlitePool,
    reporter: &dyn IndexProgressReporter,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    let provider = embedder::create_provider(&config.embedding)?;

    sqlx::query("DELETE FROM embeddings").execute(pool).await?;
    println!("embed rebuild: cleared existing embeddings");

    let pending = find_pending(pool, provider.model_name(), None).await?;
    if pending.is_empty() {
        println!("  no chunks to embed");
        return Ok(());
    }

    let (embedded, failed) =
        embed_pending_list(config, pool, provider.as_ref(), &pending, reporter).await;

    println!("embed rebuild");
    println!("  total chunks: {}", pending.len());
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);
    Ok(())
}

async fn embed_pending_list(
    config: &Config,
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    pending: &[PendingChunk],
    reporter: &dyn IndexProgressReporter,
) -> (u64, u64) {
    let total = pending.len() as u64;
    let mut embedded = 0u64;
    let mut failed = 0u64;
    let mut throttle = Throttle::new(std::time::Duration::from_secs(2));

    for batch in pending.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|p| p.content.clone()).collect();
        match embedder::embed_texts(provider, &config.embedding, &texts).await {
            Ok(vectors) => {
                for (item, vec) in batch.iter().zip(vectors.iter()) {
                    let chunk = Chunk {
                        doc_id: item.doc_id.clone(),
                        chunk_id: None,
                        chunk_index: item.chunk_index,
                        content: String::new(),
                    };
                    let record = record_for(provider, &chunk, &item.content_hash);
                    match store_embedding(pool, &record, vec).await {
                        Ok(()) => embedded += 1,
                        Err(e) => {
                            eprintln!(
                                "Warning: failed to store embedding for {}:{}: {}",
                                item.doc_id, item.chunk_index, e
                            );
                            failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {}", e);
                failed += batch.len() as u64;
            }
        }
        let done = embedded + failed;
        if throttle.ready(done == total) {
            reporter.report(IndexProgressEvent::Embedding { n: done, total });
        }
    }
    (embedded, failed)
}

/// Delete embedding rows whose chunk no longer exists. Documents deleted
/// or re-chunked shorter leave these behind.
pub async fn cleanup_orphans(pool: &SqlitePool, dry_run: bool) -> Result<CleanupReport> {
    let found: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM embeddings e
        LEFT JOIN chunks c
            ON c.document_id = e.file_id AND c.chunk_index = e.chunk_index
        WHERE c.id IS NULL
        "#,
    )
    .fetch_one(pool)
    .await?;

    if dry_run || found == 0 {
        return Ok(CleanupReport {
            found: found as u64,
            deleted: 0,
        });
    }

    let deleted = sqlx::query(
        r#"
        DELETE FROM embeddings
        WHERE id IN (
            SELECT e.id
            FROM embeddings e
            LEFT JOIN chunks c
                ON c.document_id = e.file_id AND c.chunk_index = e.chunk_index
            WHERE c.id IS NULL
        )
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();

    Ok(CleanupReport {
        found: found as u64,
        deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations;

    async fn pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    async fn insert_chunk(pool: &SqlitePool, doc: &str, index: i64, content: &str) {
        // Chunks reference documents; seed the parent row first.
        sqlx::query(
            "INSERT OR IGNORE INTO documents (id, path, doc_type, content_hash) \
             VALUES (?, ?, 'markdown', 'h')",
        )
        .bind(doc)
        .bind(format!("{}.md", doc))
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, content, content_hash) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(format!("{}:{}", doc, index))
        .bind(doc)
        .bind(index)
        .bind(content)
        .bind(crate::hash::hash_text(content))
        .execute(pool)
        .await
        .unwrap();
    }

    async fn insert_embedding(pool: &SqlitePool, doc: &str, index: i64, hash: &str) {
        sqlx::query(
            "INSERT INTO embeddings \
             (id, file_id, chunk_id, chunk_index, content_hash, model, dims, ctime, mtime, embedding) \
             VALUES (?, ?, NULL, ?, ?, 'm', 3, 0, 0, ?)",
        )
        .bind(format!("{}:{}", doc, index))
        .bind(doc)
        .bind(index)
        .bind(hash)
        .bind(crate::embedder::vec_to_blob(&[1.0, 0.0, 0.0]))
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn disabled_provider_leaves_chunks_pending() {
        let pool = pool().await;
        let config = crate::config::Config {
            db: crate::config::DbConfig {
                path: "unused.db".into(),
            },
            vault: crate::config::VaultConfig {
                root: ".".into(),
                exclude_globs: vec![],
                follow_symlinks: false,
                scan_batch_size: 100,
            },
            chunking: Default::default(),
            retrieval: Default::default(),
            graph: Default::default(),
            embedding: Default::default(),
            summarizer: Default::default(),
        };
        let chunks = vec![Chunk {
            doc_id: "d1".into(),
            chunk_id: None,
            chunk_index: 0,
            content: "text".into(),
        }];
        let (written, pending) = embed_chunks_inline(&config, &pool, &chunks).await;
        assert_eq!(written, 0);
        assert_eq!(pending, 1);
    }

    #[tokio::test]
    async fn stale_hash_counts_as_pending() {
        let pool = pool().await;
        insert_chunk(&pool, "d1", 0, "current text").await;
        insert_embedding(&pool, "d1", 0, "old-hash").await;

        let pending = find_pending(&pool, "m", None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].doc_id, "d1");
    }

    #[tokio::test]
    async fn fresh_embedding_is_not_pending() {
        let pool = pool().await;
        insert_chunk(&pool, "d1", 0, "current text").await;
        let hash = crate::hash::hash_text("current text");
        insert_embedding(&pool, "d1", 0, &hash).await;

        let pending = find_pending(&pool, "m", None).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn cleanup_removes_only_orphans() {
        let pool = pool().await;
        insert_chunk(&pool, "kept", 0, "still here").await;
        insert_embedding(&pool, "kept", 0, "h").await;
        insert_embedding(&pool, "gone", 0, "h").await;
        insert_embedding(&pool, "gone", 1, "h").await;

        let dry = cleanup_orphans(&pool, true).await.unwrap();
        assert_eq!(dry.found, 2);
        assert_eq!(dry.deleted, 0);

        let report = cleanup_orphans(&pool, false).await.unwrap();
        assert_eq!(report.deleted, 2);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }
}
