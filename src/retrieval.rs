//! Retrieval orchestration: one call from query text to grounding context.
//!
//! Composes the embedding client and the similarity search client. Embedding
//! failures are already absorbed by the fallback inside the client; a search
//! failure is caught here and converted to an empty context list with a
//! logged warning, so the caller can continue the analysis with zero
//! grounding rather than aborting the request.

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::search::SimilaritySearchClient;

/// Retrieval orchestrator, constructed per pipeline instance with its
/// collaborators passed in.
pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    search: &'a SimilaritySearchClient,
    config: RetrievalConfig,
}

impl<'a> Retriever<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        search: &'a SimilaritySearchClient,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            search,
            config,
        }
    }

    /// Find incidents similar to `query_text`, flattened to
    /// `"{title}\n{description}"` strings in descending similarity order.
    pub async fn find_similar(&self, query_text: &str) -> Vec<String> {
        let query_vec = match self.embedder.embed(&[query_text.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => {
                tracing::warn!("embedding returned no vector for query, continuing without context");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, continuing without context");
                return Vec::new();
            }
        };

        match self
            .search
            .search(&query_vec, self.config.top_k, self.config.candidate_pool)
            .await
        {
            Ok(results) => results.iter().map(|r| r.context_text()).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "similarity search failed, continuing without context");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;
    use crate::embedding::fallback_embeddings;
    use anyhow::Result;
    use async_trait::async_trait;

    /// Embedder double that always fails, to exercise the degradation path.
    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("boom")
        }
        fn dims(&self) -> usize {
            8
        }
        fn model_name(&self) -> &str {
            "broken"
        }
    }

    /// Deterministic embedder over the local fallback, dims 8.
    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(fallback_embeddings(texts, 8))
        }
        fn dims(&self) -> usize {
            8
        }
        fn model_name(&self) -> &str {
            "hash"
        }
    }

    fn test_config(dir: &std::path::Path) -> Config {
        let body = format!(
            r#"
[db]
path = "{}/insight.sqlite"

[inference]
endpoint = "http://localhost:1"
model = "test"

[server]
bind = "127.0.0.1:0"
"#,
            dir.display()
        );
        let path = dir.join("insight.toml");
        std::fs::write(&path, body).unwrap();
        crate::config::load_config(&path).unwrap()
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_empty_context() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = test_config(tmp.path());
        crate::migrate::run_migrations(&config).await.unwrap();
        let pool = db::connect(&config).await.unwrap();
        let search = SimilaritySearchClient::new(pool);

        let retriever = Retriever::new(&BrokenEmbedder, &search, RetrievalConfig::default());
        let texts = retriever.find_similar("anything").await;
        assert!(texts.is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_context() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = test_config(tmp.path());
        crate::migrate::run_migrations(&config).await.unwrap();
        let pool = db::connect(&config).await.unwrap();
        let search = SimilaritySearchClient::new(pool);

        let retriever = Retriever::new(&HashEmbedder, &search, RetrievalConfig::default());
        let texts = retriever.find_similar("jenkins pipeline failed").await;
        assert!(texts.is_empty());
    }
}
