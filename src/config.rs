use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub inference: InferenceConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Remote embedding endpoint settings plus the retry envelope.
///
/// A missing `endpoint` or missing API key does not disable the pipeline:
/// the embedding client degrades to its deterministic local fallback.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Full URL of the embedding model endpoint. Empty means fallback-only.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Environment variable holding the bearer token for the endpoint.
    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: default_embedding_model(),
            dims: default_dims(),
            api_key_env: default_embedding_key_env(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_embedding_key_env() -> String {
    "EMBEDDING_API_KEY".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// How many stored records are examined before ranking.
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: i64,
    /// How many top results are returned.
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_pool: default_candidate_pool(),
            top_k: default_top_k(),
        }
    }
}

fn default_candidate_pool() -> i64 {
    100
}
fn default_top_k() -> i64 {
    5
}

/// Inference service settings. Unlike embeddings there is no fallback:
/// a missing key or endpoint here is a fatal configuration error.
#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    /// Base URL of an OpenAI-compatible chat-completions API.
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_inference_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_inference_timeout_secs")]
    pub timeout_secs: u64,
    /// Append-only diagnostic log receiving one reasoning trace per
    /// analysis call.
    #[serde(default = "default_reasoning_log")]
    pub reasoning_log: PathBuf,
}

fn default_inference_key_env() -> String {
    "INFERENCE_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_inference_timeout_secs() -> u64 {
    60
}
fn default_reasoning_log() -> PathBuf {
    PathBuf::from("./reasoning.log")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.retrieval.candidate_pool < config.retrieval.top_k {
        anyhow::bail!("retrieval.candidate_pool must be >= retrieval.top_k");
    }

    if config.inference.endpoint.trim().is_empty() {
        anyhow::bail!("inference.endpoint must be set");
    }

    if config.inference.model.trim().is_empty() {
        anyhow::bail!("inference.model must be set");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("insight.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    const MINIMAL: &str = r#"
[db]
path = "./data/insight.sqlite"

[inference]
endpoint = "https://api.openai.com/v1"
model = "gpt-4o-mini"

[server]
bind = "127.0.0.1:7341"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(tmp.path(), MINIMAL);
        let config = load_config(&path).unwrap();

        assert_eq!(config.embedding.dims, 384);
        assert_eq!(config.embedding.max_retries, 3);
        assert_eq!(config.retrieval.candidate_pool, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.inference.temperature - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_top_k_must_be_positive() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = format!("{}\n[retrieval]\ntop_k = 0\n", MINIMAL);
        let path = write_config(tmp.path(), &body);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_candidate_pool_smaller_than_top_k_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = format!("{}\n[retrieval]\ncandidate_pool = 2\ntop_k = 5\n", MINIMAL);
        let path = write_config(tmp.path(), &body);
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_inference_endpoint_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = MINIMAL.replace("endpoint = \"https://api.openai.com/v1\"", "endpoint = \"\"");
        let path = write_config(tmp.path(), &body);
        assert!(load_config(&path).is_err());
    }
}
