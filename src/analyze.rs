//! The analyze pipeline: retrieval → inference → formatting → optional judge.
//!
//! Client handles are constructed here and passed down explicitly; nothing
//! in the pipeline reaches for process-global state. Retrieval failures
//! degrade to zero context; an inference failure is a terminal failure of
//! this request only.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::embedding::EmbeddingClient;
use crate::format::{format_analysis, format_judge_score};
use crate::inference::InferenceClient;
use crate::retrieval::Retriever;
use crate::search::SimilaritySearchClient;

/// Result of one analyze request, ready for presentation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalysisOutcome {
    /// Formatted analysis document (markdown).
    pub document: String,
    /// How many similar incidents grounded the analysis.
    pub similar_incidents: usize,
    /// Formatted judge verdict, when requested.
    pub judge: Option<String>,
}

/// Run the full pipeline for one incident text.
pub async fn analyze_incident(
    config: &Config,
    pool: &SqlitePool,
    query: &str,
    with_judge: bool,
) -> Result<AnalysisOutcome> {
    let embedder = EmbeddingClient::new(&config.embedding)?;
    let search = SimilaritySearchClient::new(pool.clone());
    let retriever = Retriever::new(&embedder, &search, config.retrieval.clone());
    let inference = InferenceClient::new(&config.inference)?;

    let similar = retriever.find_similar(query).await;
    tracing::info!(count = similar.len(), "retrieved similar incidents");

    let analysis = inference.analyze(query, &similar).await?;
    let document = format_analysis(&analysis);

    // Judge failure leaves the verdict empty; the analysis itself still
    // returns.
    let judge = if with_judge {
        match inference.evaluate(query, &document).await {
            Ok(raw) => Some(format_judge_score(&raw)),
            Err(e) => {
                tracing::warn!(error = %e, "judge evaluation failed");
                None
            }
        }
    } else {
        None
    };

    Ok(AnalysisOutcome {
        document,
        similar_incidents: similar.len(),
        judge,
    })
}

/// CLI entry point for `insight analyze`.
pub async fn run_analyze(config: &Config, query: &str, with_judge: bool) -> Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("Incident text must not be empty");
    }

    let pool = db::connect(config).await?;

    // A missing store is a configuration error, distinct from the store
    // being empty (which just means zero context).
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM incidents")
        .fetch_one(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Incident store not ready (run `insight init`?): {}", e))?;

    let outcome = analyze_incident(config, &pool, query, with_judge).await?;

    println!("{}", outcome.document);
    println!();
    if outcome.similar_incidents > 0 {
        println!(
            "analysis based on {} similar incident(s)",
            outcome.similar_incidents
        );
    } else {
        println!("no similar incidents found — analysis based on general knowledge");
    }

    if let Some(judge) = outcome.judge {
        println!();
        println!("{}", judge);
    }

    pool.close().await;
    Ok(())
}
