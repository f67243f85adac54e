//! Idempotent schema migrations for the index database.
//!
//! The indexing pipeline is the only writer of these tables; the query
//! engines read them. `open_count`/`last_opened_at` on `documents` is the
//! one narrow write path outside indexing.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Document metadata. `content_hash` drives change detection; the
    // statistics columns are ranking features only.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            doc_type TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            size INTEGER NOT NULL DEFAULT 0,
            mtime INTEGER NOT NULL DEFAULT 0,
            ctime INTEGER NOT NULL DEFAULT 0,
            content_hash TEXT NOT NULL,
            tags_json TEXT NOT NULL DEFAULT '[]',
            categories_json TEXT NOT NULL DEFAULT '[]',
            frontmatter_json TEXT,
            summary TEXT,
            last_processed_at INTEGER,
            open_count INTEGER NOT NULL DEFAULT 0,
            last_opened_at INTEGER,
            word_count INTEGER NOT NULL DEFAULT 0,
            language TEXT NOT NULL DEFAULT '',
            richness REAL NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunk rows are keyed positionally; the row id is `doc_id:index` so
    // re-chunking replaces rather than accumulates.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            UNIQUE(document_id, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embedding vectors inline as little-endian f32 BLOBs.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            id TEXT PRIMARY KEY,
            file_id TEXT NOT NULL,
            chunk_id TEXT,
            chunk_index INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            ctime INTEGER NOT NULL,
            mtime INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(file_id, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_nodes (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_edges (
            from_id TEXT NOT NULL,
            to_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 1.0,
            PRIMARY KEY (from_id, to_id, kind),
            FOREIGN KEY (from_id) REFERENCES graph_nodes(id),
            FOREIGN KEY (to_id) REFERENCES graph_nodes(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Single-row status record deciding full vs. incremental on startup.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_status (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            built_at INTEGER NOT NULL,
            indexed_docs INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 virtual table over chunk text.
    // FTS5 CREATE is not idempotent natively, so we check first.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                document_id UNINDEXED,
                content
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_file_id ON embeddings(file_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_mtime ON documents(mtime DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_graph_edges_from ON graph_edges(from_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_graph_edges_to ON graph_edges(to_id)")
        .execute(pool)
        .await?;

    Ok(())
}
