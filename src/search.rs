//! Vector similarity search over the incident store.
//!
//! The query examines up to `candidate_pool` stored records, ranks them by
//! cosine similarity against the query vector in-process, and returns the
//! top `top_k` as [`SimilarIncident`] projections (id, title, description,
//! and score, never the embedding payload).

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, Embedder, EmbeddingClient};
use crate::models::SimilarIncident;

/// Handle for similarity queries against one incident store.
#[derive(Clone)]
pub struct SimilaritySearchClient {
    pool: SqlitePool,
}

impl SimilaritySearchClient {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Rank stored incidents by similarity to `query_vec`, highest first.
    ///
    /// An empty store, or a pool of candidates that all mismatch the query
    /// dimensionality, yields an empty list, not an error.
    pub async fn search(
        &self,
        query_vec: &[f32],
        top_k: i64,
        candidate_pool: i64,
    ) -> Result<Vec<SimilarIncident>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, embedding
            FROM incidents
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(candidate_pool)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<SimilarIncident> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                // Scores are only meaningful within one dimensionality.
                if vec.len() != query_vec.len() {
                    return None;
                }
                Some(SimilarIncident {
                    id: row.get("id"),
                    title: row.get("title"),
                    description: row.get("description"),
                    score: cosine_similarity(query_vec, &vec) as f64,
                })
            })
            .collect();

        // Sort: score desc, id asc (deterministic)
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(top_k as usize);

        Ok(candidates)
    }
}

/// CLI entry point for `insight search`.
pub async fn run_search(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let embedder = EmbeddingClient::new(&config.embedding)?;
    let query_vec = embedder
        .embed(&[query.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding result for query"))?;

    let pool = db::connect(config).await?;
    let client = SimilaritySearchClient::new(pool.clone());
    let top_k = limit.unwrap_or(config.retrieval.top_k);
    let results = client
        .search(&query_vec, top_k, config.retrieval.candidate_pool)
        .await?;

    if results.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, result.score, result.title);
        println!(
            "    excerpt: \"{}\"",
            snippet(&result.description).replace('\n', " ")
        );
        println!("    id: {}", result.id);
        println!();
    }

    pool.close().await;
    Ok(())
}

fn snippet(text: &str) -> &str {
    let mut end = text.len().min(160);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
