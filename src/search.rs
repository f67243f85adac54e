//! Two-stage hybrid query engine.
//!
//! Stage one fuses the full-text and vector channels into a content
//! ranking; stage two fuses that with the metadata channel under the
//! configured channel weights. Fusion is reciprocal-rank (RRF): a
//! document at rank r in a list contributes `weight / (k + r + 1)`, so
//! raw channel scores never need cross-channel calibration.
//!
//! The vector channel is optional at query time. When the provider is
//! disabled or unreachable the query degrades to full-text plus metadata
//! and the outcome is flagged, never failed.

use std::collections::HashMap;

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::embedder;
use crate::models::{QueryOutcome, SearchResult};

/// Which retrieval channels participate in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// All channels; vector degrades instead of failing.
    Hybrid,
    /// Full-text and metadata only.
    Fulltext,
    /// Vector only; fails outright without an embedding provider.
    Semantic,
}

impl QueryMode {
    pub fn parse(s: &str) -> Result<QueryMode> {
        match s {
            "hybrid" => Ok(QueryMode::Hybrid),
            "fulltext" => Ok(QueryMode::Fulltext),
            "semantic" => Ok(QueryMode::Semantic),
            other => bail!(
                "Unknown search mode: {}. Use hybrid, fulltext, or semantic.",
                other
            ),
        }
    }
}

pub async fn run_query(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    mode: QueryMode,
    limit: Option<i64>,
) -> Result<QueryOutcome> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(QueryOutcome {
            results: Vec::new(),
            degraded: false,
        });
    }
    ensure_fts_table(pool).await?;
    if mode == QueryMode::Semantic && !config.embedding.is_enabled() {
        bail!("Semantic mode requires embeddings. Set [embedding] provider in config.");
    }

    let final_limit = limit.unwrap_or(config.retrieval.final_limit).max(1);
    let fetch_limit = final_limit * config.retrieval.over_fetch_factor.max(1);

    let mut snippets: HashMap<String, String> = HashMap::new();
    let mut degraded = false;

    let fulltext = if mode == QueryMode::Semantic {
        Vec::new()
    } else {
        fetch_fulltext(pool, query, fetch_limit, &mut snippets).await?
    };

    let vector = if mode == QueryMode::Fulltext {
        Vec::new()
    } else if config.embedding.is_enabled() {
        match fetch_vector(pool, config, query, fetch_limit, &mut snippets).await {
            Ok(list) => list,
            Err(e) if mode == QueryMode::Semantic => return Err(e),
            Err(e) => {
                eprintln!("Warning: vector channel unavailable: {}", e);
                degraded = true;
                Vec::new()
            }
        }
    } else {
        degraded = true;
        Vec::new()
    };

    let metadata = if mode == QueryMode::Semantic {
        Vec::new()
    } else {
        fetch_metadata(pool, query, fetch_limit).await?
    };

    let k = config.retrieval.rrf_k;
    let content = rrf_fuse(&[(&fulltext, 1.0), (&vector, 1.0)], k);
    let content_ids: Vec<String> = content.iter().map(|(id, _)| id.clone()).collect();
    let fused = rrf_fuse(
        &[
            (&content_ids, config.retrieval.content_weight),
            (&metadata, config.retrieval.metadata_weight),
        ],
        k,
    );

    let mut results = Vec::new();
    for (doc_id, score) in fused.into_iter().take(final_limit as usize) {
        let row = sqlx::query("SELECT path, title FROM documents WHERE id = ?")
            .bind(&doc_id)
            .fetch_optional(pool)
            .await?;
        let Some(row) = row else { continue };
        let snippet = match snippets.get(&doc_id) {
            Some(s) => s.clone(),
            None => first_chunk_prefix(pool, &doc_id).await?,
        };
        results.push(SearchResult {
            path: row.get("path"),
            title: row.get("title"),
            doc_id,
            score,
            snippet,
        });
    }

    Ok(QueryOutcome { results, degraded })
}

/// The index database is unusable for queries without its FTS table;
/// surface that as a setup error rather than an empty result.
async fn ensure_fts_table(pool: &SqlitePool) -> Result<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;
    if !exists {
        bail!("Index database has no full-text table. Run the index command first.");
    }
    Ok(())
}

/// FTS5 chokes on bare operators and unbalanced quotes, so each
/// whitespace token is quoted (implicit AND between tokens).
fn fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full-text channel: best-ranked chunk per document, document order by
/// that chunk's rank.
async fn fetch_fulltext(
    pool: &SqlitePool,
    query: &str,
    fetch_limit: i64,
    snippets: &mut HashMap<String, String>,
) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT document_id, rank,
               snippet(chunks_fts, 2, '>>>', '<<<', '...', 48) AS snippet
        FROM chunks_fts
        WHERE chunks_fts MATCH ?
        ORDER BY rank
        "#,
    )
    .bind(fts_query(query))
    .fetch_all(pool)
    .await?;

    let mut docs = Vec::new();
    for row in rows {
        let doc_id: String = row.get("document_id");
        if !docs.contains(&doc_id) {
            snippets.insert(doc_id.clone(), row.get("snippet"));
            docs.push(doc_id);
            if docs.len() as i64 >= fetch_limit {
                break;
            }
        }
    }
    Ok(docs)
}

/// Vector channel: cosine similarity against every stored embedding,
/// best chunk per document.
async fn fetch_vector(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    fetch_limit: i64,
    snippets: &mut HashMap<String, String>,
) -> Result<Vec<String>> {
    let provider = embedder::create_provider(&config.embedding)?;
    let query_vec = embedder::embed_query(provider.as_ref(), &config.embedding, query).await?;

    let rows = sqlx::query(
        r#"
        SELECT e.file_id, e.embedding,
               COALESCE(substr(c.content, 1, 240), '') AS snippet
        FROM embeddings e
        LEFT JOIN chunks c ON c.document_id = e.file_id AND c.chunk_index = e.chunk_index
        WHERE e.model = ?
        "#,
    )
    .bind(provider.model_name())
    .fetch_all(pool)
    .await?;

    let mut best: HashMap<String, (f64, String)> = HashMap::new();
    for row in rows {
        let doc_id: String = row.get("file_id");
        let blob: Vec<u8> = row.get("embedding");
        let similarity =
            embedder::cosine_similarity(&query_vec, &embedder::blob_to_vec(&blob)) as f64;
        let entry = best.entry(doc_id).or_insert((f64::NEG_INFINITY, String::new()));
        if similarity > entry.0 {
            *entry = (similarity, row.get("snippet"));
        }
    }

    let mut scored: Vec<(String, f64, String)> = best
        .into_iter()
        .map(|(id, (score, snippet))| (id, score, snippet))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(fetch_limit as usize);

    Ok(scored
        .into_iter()
        .map(|(id, _, snippet)| {
            snippets.entry(id.clone()).or_insert(snippet);
            id
        })
        .collect())
}

/// Metadata channel: term matches over title, tags, categories, and path.
/// A title hit outranks a path hit.
async fn fetch_metadata(pool: &SqlitePool, query: &str, fetch_limit: i64) -> Result<Vec<String>> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query("SELECT id, path, title, tags_json, categories_json FROM documents")
        .fetch_all(pool)
        .await?;

    let mut scored: Vec<(String, f64)> = Vec::new();
    for row in rows {
        let id: String = row.get("id");
        let path: String = row.get::<String, _>("path").to_lowercase();
        let title: String = row.get::<String, _>("title").to_lowercase();
        let tags: String = row.get::<String, _>("tags_json").to_lowercase();
        let categories: String = row.get::<String, _>("categories_json").to_lowercase();

        let mut score = 0.0;
        for term in &terms {
            if title.contains(term.as_str()) {
                score += 3.0;
            }
            if tags.contains(term.as_str()) || categories.contains(term.as_str()) {
                score += 2.0;
            }
            if path.contains(term.as_str()) {
                score += 1.0;
            }
        }
        if score > 0.0 {
            scored.push((id, score));
        }
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(fetch_limit as usize);
    Ok(scored.into_iter().map(|(id, _)| id).collect())
}

async fn first_chunk_prefix(pool: &SqlitePool, doc_id: &str) -> Result<String> {
    let content: Option<String> = sqlx::query_scalar(
        "SELECT substr(content, 1, 240) FROM chunks WHERE document_id = ? ORDER BY chunk_index LIMIT 1",
    )
    .bind(doc_id)
    .fetch_optional(pool)
    .await?;
    Ok(content.unwrap_or_default())
}

/// Weighted reciprocal-rank fusion. Ties break on id ascending so output
/// is stable across runs.
fn rrf_fuse(lists: &[(&Vec<String>, f64)], k: f64) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for (list, weight) in lists {
        for (rank, id) in list.iter().enumerate() {
            *scores.entry(id.clone()).or_insert(0.0) += weight / (k + rank as f64 + 1.0);
        }
    }
    let mut fused: Vec<(String, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    fused
}
