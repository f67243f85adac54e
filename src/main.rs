//! # Vault Index CLI (`vidx`)
//!
//! The `vidx` binary is the primary interface for Vault Index. It provides
//! commands for database initialization, vault indexing, hybrid search,
//! graph exploration, embedding management, and index maintenance.
//!
//! ## Usage
//!
//! ```bash
//! vidx --config ./config/vidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vidx init` | Create the SQLite database and run schema migrations |
//! | `vidx index` | Scan the vault and index new or changed documents |
//! | `vidx search "<query>"` | Search indexed documents |
//! | `vidx related <id>` | Rank the documents most related to a document |
//! | `vidx path <from> <to>` | Find link paths between two graph nodes |
//! | `vidx get <id>` | Print a full document and record the open |
//! | `vidx embed pending` | Backfill missing or stale embeddings |
//! | `vidx embed rebuild` | Delete and regenerate all embeddings |
//! | `vidx cleanup` | Remove embeddings whose chunks no longer exist |
//! | `vidx verify` | Cross-check document, chunk, FTS, and embedding counts |
//! | `vidx stats` | Print index statistics |
//! | `vidx reset` | Delete all index data (schema stays) |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! vidx init --config ./config/vidx.toml
//!
//! # Incremental indexing pass
//! vidx index
//!
//! # Reprocess everything regardless of stored state
//! vidx index --full
//!
//! # Hybrid search (full-text + semantic)
//! vidx search "quarterly planning"
//!
//! # Pure keyword search, no embedding provider needed
//! vidx search "quarterly planning" --mode fulltext
//!
//! # Explore the link graph
//! vidx related 4f1c0b2a... --limit 10
//! vidx path 4f1c0b2a... tag:project-x
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sqlx::Row;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use vault_index::config;
use vault_index::db;
use vault_index::embed_pipeline;
use vault_index::graph;
use vault_index::indexer::{self, IndexOptions, IndexService};
use vault_index::migrate;
use vault_index::progress::ProgressMode;
use vault_index::search::{self, QueryMode};
use vault_index::status;
use vault_index::vault::Vault;

/// Vault Index CLI — a local-first indexing and retrieval engine for a
/// personal knowledge vault.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/vidx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "vidx",
    about = "Vault Index — a local-first indexing and retrieval engine for a personal knowledge vault",
    version,
    long_about = "Vault Index scans a directory of markdown notes, attachments, and office \
    documents, detects changes by content hash, chunks and embeds what changed, and maintains \
    a link graph alongside full-text and vector indexes. Retrieval combines both with \
    reciprocal-rank fusion."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/vidx.toml`. Vault location, database path,
    /// chunking, retrieval, graph, and embedding settings are read from
    /// this file.
    #[arg(long, global = true, default_value = "./config/vidx.toml")]
    config: PathBuf,

    /// Progress output: `auto` (stderr when attached to a terminal),
    /// `human`, `json`, or `off`.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, chunks_fts, embeddings, graph_nodes,
    /// graph_edges, index_status). Idempotent — running it multiple
    /// times is safe.
    Init,

    /// Scan the vault and index new or changed documents.
    ///
    /// Detects changes by content hash, re-chunks and re-embeds only what
    /// changed, rebuilds graph edges for touched documents, and sweeps
    /// rows for files deleted from the vault. Ctrl-C stops the pass at
    /// the next batch boundary and leaves the index consistent.
    Index {
        /// Ignore stored state — reprocess every file from scratch.
        #[arg(long)]
        full: bool,

        /// Classify changes and print counts without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process. Disables the deletion sweep.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search indexed documents.
    ///
    /// Runs the two-stage fusion query and prints ranked results with
    /// scores and snippets.
    Search {
        /// The search query string.
        query: String,

        /// Search mode: `hybrid` (full-text + vector, degrades to
        /// full-text when the provider is unavailable), `fulltext`
        /// (FTS5 only), or `semantic` (vector only, requires a provider).
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Rank the documents most related to a document.
    ///
    /// Combines link-graph proximity with embedding similarity and
    /// per-document signals (recency, richness, open history).
    Related {
        /// Document id, vault-relative path, `[[Note]]` link, or `#tag`.
        id: String,

        /// Maximum number of related nodes to return.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Find link paths between two graph nodes.
    ///
    /// Bidirectional search over the link graph. Returns up to a few
    /// distinct routes; endpoints accept document ids, vault-relative
    /// paths, `[[Note]]` links, `#tag`, or raw `tag:`/`category:` node
    /// ids.
    Path {
        /// Start node.
        from: String,

        /// Goal node.
        to: String,
    },

    /// Retrieve a document by id.
    ///
    /// Prints the document's metadata and cached content, and records
    /// the open for related-node ranking.
    Get {
        /// Document id.
        id: String,
    },

    /// Manage embedding vectors.
    ///
    /// Subcommands for backfilling and rebuilding embeddings. Requires
    /// an embedding provider to be configured.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Remove embeddings whose chunks no longer exist.
    ///
    /// Documents deleted or re-chunked shorter leave orphaned embedding
    /// rows behind; this sweeps them.
    Cleanup {
        /// Show counts without deleting anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Cross-check index consistency.
    ///
    /// Compares document, chunk, FTS, and embedding counts and reports
    /// mismatches, orphans, and dangling graph edges.
    Verify,

    /// Print index statistics.
    Stats,

    /// Delete all index data.
    ///
    /// The schema stays in place; the next indexing pass rebuilds from
    /// an empty state.
    Reset,
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that are missing or have stale embeddings.
    ///
    /// Finds chunks without embeddings (or whose content or model
    /// changed) and generates new vectors using the configured provider.
    Pending {
        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Useful when switching embedding models or dimensions.
    Rebuild,
}

fn progress_mode(flag: &str) -> Result<ProgressMode> {
    match flag {
        "auto" => Ok(ProgressMode::default_for_tty()),
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        "off" => Ok(ProgressMode::Off),
        other => bail!(
            "Unknown progress mode: {}. Use auto, human, json, or off.",
            other
        ),
    }
}

fn format_epoch(secs: i64) -> String {
    match chrono::DateTime::from_timestamp(secs, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => secs.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let reporter = progress_mode(&cli.progress)?.reporter();

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Index {
            full,
            dry_run,
            limit,
        } => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            let service = IndexService::new(pool.clone(), cfg)?;

            let cancel = indexer::cancel_flag();
            let handler_flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Interrupt received, finishing current batch...");
                    handler_flag.store(true, Ordering::Relaxed);
                }
            });

            let options = IndexOptions {
                full,
                limit,
                dry_run,
            };
            let report = service.run(&options, &cancel, reporter.as_ref()).await?;
            pool.close().await;

            println!("index{}", if dry_run { " (dry-run)" } else { "" });
            println!("  scanned: {}", report.scanned);
            println!("  new: {}", report.new);
            println!("  modified: {}", report.modified);
            println!("  unchanged: {}", report.unchanged);
            println!("  deleted: {}", report.deleted);
            println!("  chunks written: {}", report.chunks_written);
            println!("  embeddings written: {}", report.embeddings_written);
            if report.embeddings_pending > 0 {
                println!(
                    "  embeddings pending: {} (run `vidx embed pending`)",
                    report.embeddings_pending
                );
            }
            if report.cancelled {
                println!("  cancelled: pass stopped early, index left consistent");
            }
        }
        Commands::Search { query, mode, limit } => {
            let mode = QueryMode::parse(&mode)?;
            let pool = db::connect(&cfg).await?;
            let outcome = search::run_query(&pool, &cfg, &query, mode, limit).await?;
            pool.close().await;

            if outcome.degraded {
                eprintln!("Warning: vector backend unavailable, full-text results only.");
            }
            if outcome.results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, hit) in outcome.results.iter().enumerate() {
                println!("{}. {} (score {:.4})", i + 1, hit.title, hit.score);
                println!("   {} [{}]", hit.path, hit.doc_id);
                if !hit.snippet.is_empty() {
                    println!("   {}", hit.snippet.replace('\n', " "));
                }
            }
        }
        Commands::Related { id, limit } => {
            let pool = db::connect(&cfg).await?;
            let vault = Vault::open(&cfg.vault)?;
            let id = graph::resolve_node_arg(&pool, &vault, &id).await?;
            let related = graph::related_nodes(&pool, &cfg.graph, &id, limit).await?;
            pool.close().await;

            if related.is_empty() {
                println!("No related nodes.");
                return Ok(());
            }
            for (i, node) in related.iter().enumerate() {
                println!(
                    "{}. {} (score {:.4}{})",
                    i + 1,
                    node.label,
                    node.score,
                    if node.physical { ", linked" } else { "" }
                );
                println!("   {} [{}]", node.kind.as_str(), node.id);
            }
        }
        Commands::Path { from, to } => {
            let pool = db::connect(&cfg).await?;
            let vault = Vault::open(&cfg.vault)?;
            let from = graph::resolve_node_arg(&pool, &vault, &from).await?;
            let to = graph::resolve_node_arg(&pool, &vault, &to).await?;
            let paths = graph::find_paths(&pool, &cfg.graph, &from, &to).await?;
            pool.close().await;

            if paths.is_empty() {
                println!("No path found.");
                return Ok(());
            }
            for (i, path) in paths.iter().enumerate() {
                println!("{}. {} hops: {}", i + 1, path.hops, path.nodes.join(" -> "));
            }
        }
        Commands::Get { id } => {
            let pool = db::connect(&cfg).await?;
            run_get(&pool, &id).await?;
            pool.close().await;
        }
        Commands::Embed { action } => {
            let pool = db::connect(&cfg).await?;
            match action {
                EmbedAction::Pending { limit, dry_run } => {
                    embed_pipeline::run_embed_pending(&cfg, &pool, limit, dry_run, reporter.as_ref())
                        .await?;
                }
                EmbedAction::Rebuild => {
                    embed_pipeline::run_embed_rebuild(&cfg, &pool, reporter.as_ref()).await?;
                }
            }
            pool.close().await;
        }
        Commands::Cleanup { dry_run } => {
            let pool = db::connect(&cfg).await?;
            let report = embed_pipeline::cleanup_orphans(&pool, dry_run).await?;
            pool.close().await;

            println!("cleanup{}", if dry_run { " (dry-run)" } else { "" });
            println!("  orphaned embeddings found: {}", report.found);
            println!("  deleted: {}", report.deleted);
        }
        Commands::Verify => {
            let pool = db::connect(&cfg).await?;
            let report = status::run_verify(&pool).await?;
            pool.close().await;

            println!("verify");
            println!("  documents: {}", report.documents);
            println!("  chunks: {}", report.chunks);
            println!("  fts rows: {}", report.fts_rows);
            println!("  embeddings: {}", report.embeddings);
            println!("  fts mismatches: {}", report.fts_mismatch);
            println!("  orphaned embeddings: {}", report.orphaned_embeddings);
            println!("  dangling graph edges: {}", report.dangling_edges);
            if report.healthy() {
                println!("  status: ok");
            } else {
                println!("  status: inconsistent (run `vidx index --full` or `vidx cleanup`)");
                std::process::exit(1);
            }
        }
        Commands::Stats => {
            let pool = db::connect(&cfg).await?;
            let stats = status::run_stats(&pool).await?;
            pool.close().await;

            println!("stats");
            println!("  documents: {}", stats.documents);
            for (doc_type, n) in &stats.by_type {
                println!("    {}: {}", doc_type, n);
            }
            println!("  chunks: {}", stats.chunks);
            println!("  embedded chunks: {}", stats.embedded_chunks);
            println!("  graph nodes: {}", stats.graph_nodes);
            println!("  graph edges: {}", stats.graph_edges);
            match stats.built_at {
                Some(ts) => println!("  last indexed: {}", format_epoch(ts)),
                None => println!("  last indexed: never"),
            }
        }
        Commands::Reset => {
            let pool = db::connect(&cfg).await?;
            let report = status::run_reset(&pool).await?;
            pool.close().await;

            println!("reset");
            println!("  documents removed: {}", report.documents);
            println!("  chunks removed: {}", report.chunks);
            println!("  embeddings removed: {}", report.embeddings);
            println!("  graph nodes removed: {}", report.graph_nodes);
            println!("  graph edges removed: {}", report.graph_edges);
        }
    }

    Ok(())
}

/// Print a document's metadata and cached content, then record the open.
async fn run_get(pool: &sqlx::SqlitePool, id: &str) -> Result<()> {
    let row = sqlx::query(
        r#"
        SELECT id, path, doc_type, title, size, mtime, content_hash,
               tags_json, categories_json, summary, open_count
        FROM documents
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => bail!("Document not found: {}", id),
    };

    println!("id: {}", row.get::<String, _>("id"));
    println!("path: {}", row.get::<String, _>("path"));
    println!("type: {}", row.get::<String, _>("doc_type"));
    println!("title: {}", row.get::<String, _>("title"));
    println!("size: {} bytes", row.get::<i64, _>("size"));
    println!("modified: {}", format_epoch(row.get::<i64, _>("mtime")));
    println!("hash: {}", row.get::<String, _>("content_hash"));
    println!("tags: {}", row.get::<String, _>("tags_json"));
    println!("categories: {}", row.get::<String, _>("categories_json"));
    if let Some(summary) = row.get::<Option<String>, _>("summary") {
        println!("summary: {}", summary);
    }

    let chunks = sqlx::query(
        "SELECT chunk_index, content FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    println!();
    for chunk in &chunks {
        let text: String = chunk.get("content");
        println!("--- chunk {} ---", chunk.get::<i64, _>("chunk_index"));
        println!("{}", text);
    }

    // The open feeds the related-node ranking; failure there should not
    // mask a successful read.
    if let Err(err) = status::record_open(pool, id).await {
        eprintln!("Warning: failed to record open: {}", err);
    }
    Ok(())
}
