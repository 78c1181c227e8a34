//! Incident import: JSON file → embeddings → store.
//!
//! Reads an array of `{id?, title, description}` records, embeds the
//! combined title + description in batches, and upserts each record with
//! its vector. Records without an id get a generated one. A failed batch is
//! reported and skipped; the remaining batches still import.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::embedding::{vec_to_blob, Embedder, EmbeddingClient};
use crate::models::{IncidentRecord, IncidentSeed};

pub async fn run_import(config: &Config, file: &Path, dry_run: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read incident file: {}", file.display()))?;
    let seeds: Vec<IncidentSeed> =
        serde_json::from_str(&content).with_context(|| "Failed to parse incident file as JSON")?;

    if dry_run {
        println!("import (dry-run)");
        println!("  incidents in file: {}", seeds.len());
        return Ok(());
    }

    let embedder = EmbeddingClient::new(&config.embedding)?;
    let pool = db::connect(config).await?;

    let mut imported = 0u64;
    let mut failed = 0u64;

    for batch in seeds.chunks(config.embedding.batch_size) {
        let texts: Vec<String> = batch.iter().map(|s| s.combined_content()).collect();

        match embedder.embed(&texts).await {
            Ok(vectors) => {
                for (seed, vec) in batch.iter().zip(vectors.into_iter()) {
                    let record = IncidentRecord {
                        id: seed
                            .id
                            .clone()
                            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                        title: seed.title.clone(),
                        description: seed.description.clone(),
                        embedding: vec,
                    };
                    upsert_incident(&pool, &record, embedder.model_name()).await?;
                    imported += 1;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding batch failed during import");
                failed += batch.len() as u64;
            }
        }
    }

    println!("import");
    println!("  incidents in file: {}", seeds.len());
    println!("  imported: {}", imported);
    println!("  failed: {}", failed);

    pool.close().await;
    Ok(())
}

pub async fn upsert_incident(pool: &SqlitePool, record: &IncidentRecord, model: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO incidents (id, title, description, embedding, model, dims, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            embedding = excluded.embedding,
            model = excluded.model,
            dims = excluded.dims
        "#,
    )
    .bind(&record.id)
    .bind(&record.title)
    .bind(&record.description)
    .bind(vec_to_blob(&record.embedding))
    .bind(model)
    .bind(record.embedding.len() as i64)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}
