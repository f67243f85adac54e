//! Index status, health verification, stats, and reset.
//!
//! `open_count`/`last_opened_at` tracking is the one write path outside
//! the indexing pipeline; everything else here only reads or wipes.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

/// The single-row status record. `None` until the first completed pass.
#[derive(Debug, Clone, Copy)]
pub struct IndexStatus {
    pub built_at: i64,
    pub indexed_docs: i64,
}

pub async fn get_status(pool: &SqlitePool) -> Result<Option<IndexStatus>> {
    let row = sqlx::query("SELECT built_at, indexed_docs FROM index_status WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| IndexStatus {
        built_at: r.get("built_at"),
        indexed_docs: r.get("indexed_docs"),
    }))
}

/// Structured output of the health check.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyReport {
    pub documents: i64,
    pub chunks: i64,
    pub fts_rows: i64,
    pub embeddings: i64,
    /// Chunks without an FTS row, or FTS rows without a chunk.
    pub fts_mismatch: i64,
    /// Embedding rows pointing at missing chunks.
    pub orphaned_embeddings: i64,
    /// Graph edges with a missing endpoint node.
    pub dangling_edges: i64,
    pub fts_present: bool,
}

impl VerifyReport {
    pub fn healthy(&self) -> bool {
        self.fts_present
            && self.fts_mismatch == 0
            && self.orphaned_embeddings == 0
            && self.dangling_edges == 0
    }
}

pub async fn run_verify(pool: &SqlitePool) -> Result<VerifyReport> {
    let mut report = VerifyReport {
        documents: count(pool, "SELECT COUNT(*) FROM documents").await?,
        chunks: count(pool, "SELECT COUNT(*) FROM chunks").await?,
        embeddings: count(pool, "SELECT COUNT(*) FROM embeddings").await?,
        ..Default::default()
    };

    report.fts_present = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if report.fts_present {
        report.fts_rows = count(pool, "SELECT COUNT(*) FROM chunks_fts").await?;
        let missing_fts = count(
            pool,
            "SELECT COUNT(*) FROM chunks c \
             WHERE NOT EXISTS (SELECT 1 FROM chunks_fts f WHERE f.chunk_id = c.id)",
        )
        .await?;
        let stray_fts = count(
            pool,
            "SELECT COUNT(*) FROM chunks_fts f \
             WHERE NOT EXISTS (SELECT 1 FROM chunks c WHERE c.id = f.chunk_id)",
        )
        .await?;
        report.fts_mismatch = missing_fts + stray_fts;
    }

    report.orphaned_embeddings = count(
        pool,
        "SELECT COUNT(*) FROM embeddings e \
         LEFT JOIN chunks c ON c.document_id = e.file_id AND c.chunk_index = e.chunk_index \
         WHERE c.id IS NULL",
    )
    .await?;

    report.dangling_edges = count(
        pool,
        "SELECT COUNT(*) FROM graph_edges g \
         WHERE NOT EXISTS (SELECT 1 FROM graph_nodes n WHERE n.id = g.from_id) \
            OR NOT EXISTS (SELECT 1 FROM graph_nodes n WHERE n.id = g.to_id)",
    )
    .await?;

    Ok(report)
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

/// Aggregate counts for the stats command.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub documents: i64,
    pub chunks: i64,
    pub embedded_chunks: i64,
    pub graph_nodes: i64,
    pub graph_edges: i64,
    pub by_type: Vec<(String, i64)>,
    pub built_at: Option<i64>,
}

pub async fn run_stats(pool: &SqlitePool) -> Result<IndexStats> {
    let mut stats = IndexStats {
        documents: count(pool, "SELECT COUNT(*) FROM documents").await?,
        chunks: count(pool, "SELECT COUNT(*) FROM chunks").await?,
        embedded_chunks: count(
            pool,
            "SELECT COUNT(*) FROM chunks c \
             WHERE EXISTS (SELECT 1 FROM embeddings e \
                           WHERE e.file_id = c.document_id AND e.chunk_index = c.chunk_index)",
        )
        .await?,
        graph_nodes: count(pool, "SELECT COUNT(*) FROM graph_nodes").await?,
        graph_edges: count(pool, "SELECT COUNT(*) FROM graph_edges").await?,
        ..Default::default()
    };

    let rows = sqlx::query(
        "SELECT doc_type, COUNT(*) AS n FROM documents GROUP BY doc_type ORDER BY n DESC, doc_type",
    )
    .fetch_all(pool)
    .await?;
    stats.by_type = rows
        .into_iter()
        .map(|row| (row.get("doc_type"), row.get("n")))
        .collect();

    stats.built_at = get_status(pool).await?.map(|s| s.built_at);
    Ok(stats)
}

/// Counts removed by a reset, per table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetReport {
    pub documents: u64,
    pub chunks: u64,
    pub embeddings: u64,
    pub graph_nodes: u64,
    pub graph_edges: u64,
}

/// Delete all index data. The schema stays; the next pass rebuilds from
/// an empty state.
pub async fn run_reset(pool: &SqlitePool) -> Result<ResetReport> {
    let mut tx = pool.begin().await?;
    let mut report = ResetReport::default();

    report.embeddings = sqlx::query("DELETE FROM embeddings")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM chunks_fts").execute(&mut *tx).await?;
    report.chunks = sqlx::query("DELETE FROM chunks")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    report.graph_edges = sqlx::query("DELETE FROM graph_edges")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    report.graph_nodes = sqlx::query("DELETE FROM graph_nodes")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    report.documents = sqlx::query("DELETE FROM documents")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM index_status")
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(report)
}

/// Record that a document was opened. Feeds the open-count and last-open
/// ranking dimensions of the graph inspector.
pub async fn record_open(pool: &SqlitePool, doc_id: &str) -> Result<bool> {
    let affected = sqlx::query(
        "UPDATE documents SET open_count = open_count + 1, last_opened_at = ? WHERE id = ?",
    )
    .bind(chrono::Utc::now().timestamp())
    .bind(doc_id)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(affected > 0)
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

    async fn seed_doc(pool: &SqlitePool, id: &str) {
        sqlx::query(
            "INSERT INTO documents (id, path, doc_type, title, content_hash) \
             VALUES (?, ?, 'markdown', ?, 'h')",
        )
        .bind(id)
        .bind(format!("{}.md", id))
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn fresh_database_verifies_healthy_and_empty() {
        let pool = pool().await;
        let report = run_verify(&pool).await.unwrap();
        assert!(report.healthy());
        assert_eq!(report.documents, 0);
        assert!(get_status(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn verify_flags_orphaned_embeddings() {
        let pool = pool().await;
        sqlx::query(
            "INSERT INTO embeddings \
             (id, file_id, chunk_id, chunk_index, content_hash, model, dims, ctime, mtime, embedding) \
             VALUES ('x:0', 'x', NULL, 0, 'h', 'm', 3, 0, 0, x'000000')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = run_verify(&pool).await.unwrap();
        assert_eq!(report.orphaned_embeddings, 1);
        assert!(!report.healthy());
    }

    #[tokio::test]
    async fn reset_clears_everything_and_reports_counts() {
        let pool = pool().await;
        seed_doc(&pool, "d1").await;
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, content, content_hash) \
             VALUES ('d1:0', 'd1', 0, 'text', 'h')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = run_reset(&pool).await.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.chunks, 1);

        let stats = run_stats(&pool).await.unwrap();
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.chunks, 0);
    }

    #[tokio::test]
    async fn record_open_bumps_counters() {
        let pool = pool().await;
        seed_doc(&pool, "d1").await;
        assert!(record_open(&pool, "d1").await.unwrap());
        assert!(record_open(&pool, "d1").await.unwrap());
        assert!(!record_open(&pool, "missing").await.unwrap());

        let row = sqlx::query("SELECT open_count, last_opened_at FROM documents WHERE id = 'd1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("open_count"), 2);
        assert!(row.get::<Option<i64>, _>("last_opened_at").is_some());
    }
}
