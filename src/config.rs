use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub vault: VaultConfig,
    #[serde(default)]
    pub chunking: ChunkingSettings,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Files scanned per batch during change detection.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
}

fn default_scan_batch_size() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingSettings {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Documents at or below this length stay whole as a single chunk.
    #[serde(default = "default_min_doc_size")]
    pub min_document_size_for_chunking: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_document_size_for_chunking: default_min_doc_size(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_min_doc_size() -> usize {
    1500
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// RRF smoothing constant. Tens, not units: small values overweight
    /// rank-1 items.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    /// Each channel retrieves `top_k * over_fetch_factor` candidates so
    /// dedup and filtering do not starve the final list.
    #[serde(default = "default_over_fetch")]
    pub over_fetch_factor: i64,
    #[serde(default = "default_content_weight")]
    pub content_weight: f64,
    #[serde(default = "default_metadata_weight")]
    pub metadata_weight: f64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            over_fetch_factor: default_over_fetch(),
            content_weight: default_content_weight(),
            metadata_weight: default_metadata_weight(),
            final_limit: default_final_limit(),
        }
    }
}

fn default_rrf_k() -> f64 {
    60.0
}
fn default_over_fetch() -> i64 {
    2
}
fn default_content_weight() -> f64 {
    0.7
}
fn default_metadata_weight() -> f64 {
    0.3
}
fn default_final_limit() -> i64 {
    10
}

/// Weights for the six related-node ranking dimensions plus search bounds.
/// Hand-tuned constants surfaced as configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_w_density")]
    pub weight_connection_density: f64,
    #[serde(default = "default_w_recency")]
    pub weight_update_recency: f64,
    #[serde(default = "default_w_richness")]
    pub weight_content_richness: f64,
    #[serde(default = "default_w_open_count")]
    pub weight_open_count: f64,
    #[serde(default = "default_w_last_open")]
    pub weight_last_open: f64,
    #[serde(default = "default_w_similarity")]
    pub weight_semantic_similarity: f64,
    /// Additive bonus for physically-linked candidates over purely-semantic
    /// ones.
    #[serde(default = "default_physical_bonus")]
    pub physical_bonus: f64,
    #[serde(default = "default_pool_size")]
    pub candidate_pool_size: usize,
    #[serde(default = "default_semantic_neighbors")]
    pub semantic_neighbors: usize,
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_path_iterations")]
    pub path_iterations: usize,
    /// Wall-clock budget per path-finding step, in milliseconds.
    #[serde(default = "default_step_budget_ms")]
    pub step_budget_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            weight_connection_density: default_w_density(),
            weight_update_recency: default_w_recency(),
            weight_content_richness: default_w_richness(),
            weight_open_count: default_w_open_count(),
            weight_last_open: default_w_last_open(),
            weight_semantic_similarity: default_w_similarity(),
            physical_bonus: default_physical_bonus(),
            candidate_pool_size: default_pool_size(),
            semantic_neighbors: default_semantic_neighbors(),
            max_hops: default_max_hops(),
            path_iterations: default_path_iterations(),
            step_budget_ms: default_step_budget_ms(),
        }
    }
}

fn default_w_density() -> f64 {
    1.0
}
fn default_w_recency() -> f64 {
    0.8
}
fn default_w_richness() -> f64 {
    0.6
}
fn default_w_open_count() -> f64 {
    0.5
}
fn default_w_last_open() -> f64 {
    0.5
}
fn default_w_similarity() -> f64 {
    1.0
}
fn default_physical_bonus() -> f64 {
    0.01
}
fn default_pool_size() -> usize {
    500
}
fn default_semantic_neighbors() -> usize {
    20
}
fn default_max_hops() -> usize {
    5
}
fn default_path_iterations() -> usize {
    3
}
fn default_step_budget_ms() -> u64 {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_summarizer_timeout")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            timeout_secs: default_summarizer_timeout(),
        }
    }
}

impl SummarizerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_summarizer_timeout() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chunk_size == 0 {
        anyhow::bail!("chunking.max_chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.max_chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be < chunking.max_chunk_size");
    }

    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if config.retrieval.over_fetch_factor < 1 {
        anyhow::bail!("retrieval.over_fetch_factor must be >= 1");
    }
    if config.retrieval.rrf_k <= 0.0 {
        anyhow::bail!("retrieval.rrf_k must be > 0");
    }
    if config.retrieval.content_weight <= 0.0 || config.retrieval.metadata_weight < 0.0 {
        anyhow::bail!("retrieval weights must be positive");
    }

    if config.graph.max_hops == 0 {
        anyhow::bail!("graph.max_hops must be >= 1");
    }
    if config.graph.path_iterations == 0 {
        anyhow::bail!("graph.path_iterations must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    match config.summarizer.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown summarizer provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("vidx.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[db]\npath = \"/tmp/v.sqlite\"\n\n[vault]\nroot = \"/tmp/vault\"\n",
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.max_chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.chunking.min_document_size_for_chunking, 1500);
        assert_eq!(config.retrieval.rrf_k, 60.0);
        assert_eq!(config.graph.candidate_pool_size, 500);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[db]\npath = \"/tmp/v.sqlite\"\n\n[vault]\nroot = \"/tmp/vault\"\n\n[chunking]\nmax_chunk_size = 100\nchunk_overlap = 100\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[db]\npath = \"/tmp/v.sqlite\"\n\n[vault]\nroot = \"/tmp/vault\"\n\n[embedding]\nprovider = \"openai\"\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[db]\npath = \"/tmp/v.sqlite\"\n\n[vault]\nroot = \"/tmp/vault\"\n\n[embedding]\nprovider = \"mystery\"\nmodel = \"m\"\ndims = 4\n",
        );
        assert!(load_config(&path).is_err());
    }
}
