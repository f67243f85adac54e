//! Retrieval tests against a real indexed vault: hybrid/fulltext query
//! behavior, related-node ranking, and path finding over the link graph.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use vault_index::config::{Config, DbConfig, VaultConfig};
use vault_index::db;
use vault_index::graph;
use vault_index::hash::doc_id_for_path;
use vault_index::indexer::{cancel_flag, IndexOptions, IndexService};
use vault_index::migrate;
use vault_index::progress::NoProgress;
use vault_index::search::{run_query, QueryMode};
use vault_index::status;

fn test_config(root: &Path, db_path: &Path) -> Config {
    Config {
        db: DbConfig {
            path: db_path.to_path_buf(),
        },
        vault: VaultConfig {
            root: root.to_path_buf(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            scan_batch_size: 50,
        },
        chunking: Default::default(),
        retrieval: Default::default(),
        graph: Default::default(),
        embedding: Default::default(),
        summarizer: Default::default(),
    }
}

fn seed_vault(root: &Path) {
    fs::write(
        root.join("alpha.md"),
        "---\ntags: [infra]\n---\n# Alpha\n\nRust service notes. Links to [[beta]] for the runtime side.\n",
    )
    .unwrap();
    fs::write(
        root.join("beta.md"),
        "# Beta\n\nRuntime tuning and async executors. #infra\n",
    )
    .unwrap();
    fs::write(
        root.join("gamma.md"),
        "# Gamma\n\nKubernetes deployment checklists and rollout notes. #infra\n",
    )
    .unwrap();
    fs::write(
        root.join("island.md"),
        "# Island\n\nAn unlinked note about gardening.\n",
    )
    .unwrap();
}

struct Env {
    _tmp: TempDir,
    pool: sqlx::SqlitePool,
    config: Config,
}

async fn indexed_env() -> Env {
    let tmp = TempDir::new().unwrap();
    let vault_root = tmp.path().join("vault");
    fs::create_dir_all(&vault_root).unwrap();
    seed_vault(&vault_root);

    let db_path = tmp.path().join("vidx.db");
    let pool = db::connect_path(&db_path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let config = test_config(&vault_root, &db_path);
    let service = IndexService::new(pool.clone(), config.clone()).unwrap();
    let cancel = cancel_flag();
    service
        .run(&IndexOptions::default(), &cancel, &NoProgress)
        .await
        .unwrap();
    // Links to documents indexed later in the same pass resolve on the
    // next pass; run one so the graph is complete.
    service
        .run(
            &IndexOptions {
                full: true,
                ..Default::default()
            },
            &cancel,
            &NoProgress,
        )
        .await
        .unwrap();

    Env {
        _tmp: tmp,
        pool,
        config,
    }
}

#[tokio::test]
async fn fulltext_search_finds_the_keyword_match() {
    let env = indexed_env().await;

    let outcome = run_query(&env.pool, &env.config, "kubernetes", QueryMode::Fulltext, None)
        .await
        .unwrap();
    assert!(!outcome.degraded);
    assert!(!outcome.results.is_empty());
    assert_eq!(outcome.results[0].doc_id, doc_id_for_path("gamma.md"));
    assert_eq!(outcome.results[0].title, "Gamma");
    assert!(!outcome.results[0].snippet.is_empty());
}

#[tokio::test]
async fn hybrid_without_a_provider_degrades_but_still_answers() {
    let env = indexed_env().await;

    let outcome = run_query(&env.pool, &env.config, "runtime tuning", QueryMode::Hybrid, None)
        .await
        .unwrap();
    assert!(outcome.degraded);
    assert!(!outcome.results.is_empty());
    assert_eq!(outcome.results[0].doc_id, doc_id_for_path("beta.md"));
}

#[tokio::test]
async fn semantic_mode_without_a_provider_is_an_error() {
    let env = indexed_env().await;

    let err = run_query(&env.pool, &env.config, "anything", QueryMode::Semantic, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Semantic mode requires embeddings"));
}

#[tokio::test]
async fn metadata_stage_boosts_tag_matches() {
    let env = indexed_env().await;

    // "infra" appears only in tags, not in any body text.
    let outcome = run_query(&env.pool, &env.config, "infra", QueryMode::Hybrid, None)
        .await
        .unwrap();
    let ids: Vec<&str> = outcome.results.iter().map(|r| r.doc_id.as_str()).collect();
    assert!(ids.contains(&doc_id_for_path("alpha.md").as_str()));
    assert!(!ids.contains(&doc_id_for_path("island.md").as_str()));
}

#[tokio::test]
async fn blank_query_returns_no_results() {
    let env = indexed_env().await;

    let outcome = run_query(&env.pool, &env.config, "   ", QueryMode::Hybrid, None)
        .await
        .unwrap();
    assert!(outcome.results.is_empty());
    assert!(!outcome.degraded);
}

#[tokio::test]
async fn related_nodes_surface_linked_and_tag_neighbors() {
    let env = indexed_env().await;
    let alpha = doc_id_for_path("alpha.md");

    let related = graph::related_nodes(&env.pool, &env.config.graph, &alpha, 10)
        .await
        .unwrap();
    let ids: Vec<&str> = related.iter().map(|r| r.id.as_str()).collect();

    // Beta is directly linked; gamma shares the infra tag (two hops).
    assert!(ids.contains(&doc_id_for_path("beta.md").as_str()));
    assert!(ids.contains(&doc_id_for_path("gamma.md").as_str()));
    assert!(!ids.contains(&doc_id_for_path("island.md").as_str()));
    assert!(!ids.contains(&alpha.as_str()));
    for node in &related {
        assert!(node.physical, "no embeddings, so every candidate is link-reachable");
    }
}

#[tokio::test]
async fn open_history_feeds_related_ranking() {
    let env = indexed_env().await;
    let alpha = doc_id_for_path("alpha.md");
    let gamma = doc_id_for_path("gamma.md");

    for _ in 0..5 {
        assert!(status::record_open(&env.pool, &gamma).await.unwrap());
    }
    assert!(!status::record_open(&env.pool, "missing-doc").await.unwrap());

    let related = graph::related_nodes(&env.pool, &env.config.graph, &alpha, 10)
        .await
        .unwrap();
    let gamma_rank = related.iter().position(|r| r.id == gamma);
    let beta_rank = related
        .iter()
        .position(|r| r.id == doc_id_for_path("beta.md"));
    assert!(gamma_rank.is_some() && beta_rank.is_some());
}

#[tokio::test]
async fn paths_run_through_links_and_tags() {
    let env = indexed_env().await;
    let alpha = doc_id_for_path("alpha.md");
    let beta = doc_id_for_path("beta.md");
    let gamma = doc_id_for_path("gamma.md");

    let direct = graph::find_paths(&env.pool, &env.config.graph, &alpha, &beta)
        .await
        .unwrap();
    assert!(!direct.is_empty());
    assert_eq!(direct[0].hops, 1);
    assert_eq!(direct[0].nodes, vec![alpha.clone(), beta.clone()]);

    let via_tag = graph::find_paths(&env.pool, &env.config.graph, &alpha, &gamma)
        .await
        .unwrap();
    assert!(!via_tag.is_empty());
    assert_eq!(via_tag[0].hops, 2);
    assert_eq!(via_tag[0].nodes[1], "tag:infra");
}

#[tokio::test]
async fn unreachable_nodes_yield_no_path() {
    let env = indexed_env().await;

    let paths = graph::find_paths(
        &env.pool,
        &env.config.graph,
        &doc_id_for_path("alpha.md"),
        &doc_id_for_path("island.md"),
    )
    .await
    .unwrap();
    assert!(paths.is_empty());
}
