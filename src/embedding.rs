//! Embedding client with retry/backoff and a deterministic local fallback.
//!
//! The remote endpoint speaks the hosted-inference protocol: `POST` with
//! `{"inputs": [...], "options": {"wait_for_model": true}}`, returning a JSON
//! array of float arrays. A 503 means the model is still warming and is
//! retried separately from generic server errors.
//!
//! The retry loop is an explicit finite-state machine with a bounded attempt
//! counter. When retries are exhausted, or no credential is configured at
//! all, the client degrades to a deterministic hashed term-frequency vector
//! instead of failing, so `embed` always returns one vector per input text.
//! Only non-retryable HTTP errors (4xx other than 429) propagate, and only
//! after being logged.
//!
//! Also provides the vector utilities shared by storage and search:
//! [`vec_to_blob`], [`blob_to_vec`], and [`cosine_similarity`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Seam for embedding backends. Production code uses [`EmbeddingClient`];
/// tests inject doubles.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts. Returns exactly `texts.len()` vectors of
    /// length [`dims`](Embedder::dims), in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dims(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// States of the retry loop. The attempt counter is carried in the state so
/// the bound is enforced in one place.
#[derive(Debug)]
enum RetryState {
    Attempting(u32),
    Warming(u32),
    FallingBack,
    Succeeded(Vec<Vec<f32>>),
}

/// Outcome of a single request to the remote endpoint.
enum AttemptOutcome {
    Success(Vec<Vec<f32>>),
    /// 503 — model warming, retryable.
    Warming,
    /// 5xx / 429 / connect or read timeout, retryable.
    Transient(String),
    /// Non-retryable (bad credentials, malformed response).
    Fatal(anyhow::Error),
}

/// Client for a remote embedding endpoint with local fallback.
pub struct EmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
    api_key: Option<String>,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            http,
            config: config.clone(),
            api_key,
        })
    }

    /// Whether the remote endpoint can be used at all. Without an endpoint
    /// and credential every batch goes straight to the fallback.
    fn remote_available(&self) -> bool {
        !self.config.endpoint.trim().is_empty() && self.api_key.is_some()
    }

    async fn attempt(&self, texts: &[String]) -> AttemptOutcome {
        let body = serde_json::json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        });

        let api_key = self.api_key.as_deref().unwrap_or_default();

        let resp = self
            .http
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        let response = match resp {
            Ok(r) => r,
            // Connect/read failures and timeouts are transient.
            Err(e) => return AttemptOutcome::Transient(e.to_string()),
        };

        let status = response.status();

        if status.is_success() {
            let json: serde_json::Value = match response.json().await {
                Ok(v) => v,
                Err(e) => return AttemptOutcome::Transient(e.to_string()),
            };
            return match parse_embedding_response(&json, texts.len(), self.config.dims) {
                Ok(vectors) => AttemptOutcome::Success(vectors),
                Err(e) => AttemptOutcome::Fatal(e),
            };
        }

        if status.as_u16() == 503 {
            return AttemptOutcome::Warming;
        }

        if status.as_u16() == 429 || status.is_server_error() {
            let body_text = response.text().await.unwrap_or_default();
            return AttemptOutcome::Transient(format!("{}: {}", status, body_text));
        }

        let body_text = response.text().await.unwrap_or_default();
        AttemptOutcome::Fatal(anyhow::anyhow!(
            "Embedding endpoint error {}: {}",
            status,
            body_text
        ))
    }

    /// Run the bounded retry state machine against the remote endpoint.
    ///
    /// Returns `Ok(None)` when the loop lands in `FallingBack`; the caller
    /// switches to the local fallback. `Err` only for non-retryable errors.
    async fn embed_remote(&self, texts: &[String]) -> Result<Option<Vec<Vec<f32>>>> {
        let max = self.config.max_retries;
        let mut state = RetryState::Attempting(0);

        loop {
            state = match state {
                RetryState::Attempting(n) if n >= max => RetryState::FallingBack,
                RetryState::Attempting(n) => match self.attempt(texts).await {
                    AttemptOutcome::Success(vectors) => RetryState::Succeeded(vectors),
                    AttemptOutcome::Warming => {
                        tracing::warn!(attempt = n, "embedding model warming, will retry");
                        RetryState::Warming(n)
                    }
                    AttemptOutcome::Transient(reason) => {
                        tracing::warn!(attempt = n, %reason, "transient embedding failure");
                        sleep_backoff(&self.config, n).await;
                        RetryState::Attempting(n + 1)
                    }
                    AttemptOutcome::Fatal(e) => {
                        tracing::error!(error = %e, "non-retryable embedding failure");
                        return Err(e);
                    }
                },
                RetryState::Warming(n) => {
                    sleep_backoff(&self.config, n).await;
                    RetryState::Attempting(n + 1)
                }
                RetryState::FallingBack => {
                    tracing::warn!(
                        attempts = max,
                        "embedding retries exhausted, using local fallback"
                    );
                    return Ok(None);
                }
                RetryState::Succeeded(vectors) => return Ok(Some(vectors)),
            };
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if !self.remote_available() {
            tracing::debug!("no embedding endpoint or credential, using local fallback");
            return Ok(fallback_embeddings(texts, self.config.dims));
        }

        match self.embed_remote(texts).await? {
            Some(vectors) => Ok(vectors),
            None => Ok(fallback_embeddings(texts, self.config.dims)),
        }
    }

    fn dims(&self) -> usize {
        self.config.dims
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Backoff delay for a given attempt: `base × 2^attempt` capped at
/// `max_delay_ms`, with ±25% jitter derived from the system clock so
/// synchronized callers spread out.
fn backoff_delay(config: &EmbeddingConfig, attempt: u32) -> Duration {
    let exponential = (config.base_delay_ms as f64) * 2f64.powi(attempt as i32);
    let delay_ms = exponential.min(config.max_delay_ms as f64) as u64;

    let jitter_range = delay_ms / 4;
    if jitter_range == 0 {
        return Duration::from_millis(delay_ms);
    }

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let jitter = nanos % (jitter_range * 2);

    Duration::from_millis(delay_ms.saturating_sub(jitter_range) + jitter)
}

async fn sleep_backoff(config: &EmbeddingConfig, attempt: u32) {
    let delay = backoff_delay(config, attempt);
    if delay > Duration::ZERO {
        tokio::time::sleep(delay).await;
    }
}

/// Parse the endpoint's response: a JSON array of float arrays, one per
/// input, each of the configured dimensionality. Partial or reshaped
/// results are rejected outright; the batch contract is all-or-nothing.
fn parse_embedding_response(
    json: &serde_json::Value,
    expected_len: usize,
    dims: usize,
) -> Result<Vec<Vec<f32>>> {
    let rows = json
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: expected an array"))?;

    if rows.len() != expected_len {
        bail!(
            "Embedding response length {} does not match input batch {}",
            rows.len(),
            expected_len
        );
    }

    let mut vectors = Vec::with_capacity(rows.len());
    for row in rows {
        let values = row
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: expected float arrays"))?;
        if values.len() != dims {
            bail!(
                "Embedding vector length {} does not match configured dims {}",
                values.len(),
                dims
            );
        }
        let vec: Vec<f32> = values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        vectors.push(vec);
    }

    Ok(vectors)
}

// ============ Local fallback ============

/// Deterministic hashed term-frequency embedding.
///
/// Each text is lowercased and whitespace-tokenized; every token is hashed
/// into one of `dims` buckets (stable content hash, so the same batch yields
/// identical vectors on every call), counts accumulate additively, and the
/// vector is L2-normalized. A text with no tokens stays the zero vector.
pub fn fallback_embeddings(texts: &[String], dims: usize) -> Vec<Vec<f32>> {
    texts.iter().map(|t| fallback_embedding(t, dims)).collect()
}

fn fallback_embedding(text: &str, dims: usize) -> Vec<f32> {
    let mut vec = vec![0f32; dims];

    for token in text.to_lowercase().split_whitespace() {
        vec[token_bucket(token, dims)] += 1.0;
    }

    l2_normalize(&mut vec);
    vec
}

/// Stable bucket index for a token: first eight bytes of its SHA-256 digest
/// reduced mod `dims`. Collisions are tolerated; only determinism matters.
fn token_bucket(token: &str, dims: usize) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % dims as u64) as usize
}

fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes) for SQLite
/// storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
