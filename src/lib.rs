//! # Vault Index
//!
//! A local-first indexing and retrieval engine for a personal knowledge
//! vault: a directory of markdown notes, attachments, and office
//! documents.
//!
//! The pipeline watches nothing; each indexing pass scans the vault,
//! detects changes by content hash, re-chunks and re-embeds only what
//! changed, and maintains a link graph alongside the full-text and
//! vector indexes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Vault   │──▶│   Indexer     │──▶│  SQLite    │
//! │ (files)  │   │ load+chunk+   │   │ FTS5 + vec │
//! └──────────┘   │ embed+graph   │   └─────┬─────┘
//!                └──────────────┘         │
//!                          ┌──────────────┼─────────────┐
//!                          ▼              ▼             ▼
//!                     ┌─────────┐   ┌──────────┐  ┌─────────┐
//!                     │ search  │   │  graph   │  │  stats  │
//!                     │ (RRF)   │   │ related/ │  │ verify  │
//!                     └─────────┘   │  paths   │  └─────────┘
//!                                   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vidx init                       # create database
//! vidx index                      # scan and index the vault
//! vidx search "deployment notes"
//! vidx related <doc-id>
//! vidx path <from-id> <to-id>
//! vidx embed pending              # backfill embeddings
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`vault`] | Filesystem access and scanning |
//! | [`loader`] | Per-format document loaders |
//! | [`registry`] | Loader dispatch and resource detection |
//! | [`splitter`] | Recursive text chunking |
//! | [`indexer`] | Change detection and the indexing pipeline |
//! | [`embedder`] | Embedding provider abstraction |
//! | [`embed_pipeline`] | Inline, catch-up, and rebuild embedding passes |
//! | [`search`] | Two-stage hybrid retrieval |
//! | [`graph`] | Related-node ranking and path finding |
//! | [`status`] | Health checks, stats, reset |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embed_pipeline;
pub mod embedder;
pub mod graph;
pub mod hash;
pub mod indexer;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod registry;
pub mod search;
pub mod splitter;
pub mod status;
pub mod summarize;
pub mod vault;
