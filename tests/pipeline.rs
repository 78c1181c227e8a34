//! Integration tests for the retrieval-augmented analysis pipeline.
//!
//! External HTTP services (embedding endpoint, inference endpoint) are
//! replaced by wiremock servers; the incident store is a temp-dir SQLite
//! database.

use std::path::Path;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use incident_insight::analyze::analyze_incident;
use incident_insight::config::{Config, EmbeddingConfig};
use incident_insight::embedding::{fallback_embeddings, Embedder, EmbeddingClient};
use incident_insight::ingest::upsert_incident;
use incident_insight::models::IncidentRecord;
use incident_insight::search::SimilaritySearchClient;
use incident_insight::{db, migrate};

const DIMS: usize = 16;

fn write_config(dir: &Path, embedding_endpoint: &str, inference_endpoint: &str) -> Config {
    let body = format!(
        r#"
[db]
path = "{dir}/insight.sqlite"

[embedding]
endpoint = "{embedding_endpoint}"
dims = {DIMS}
api_key_env = "INSIGHT_TEST_EMBED_KEY"
max_retries = 3
base_delay_ms = 1
max_delay_ms = 4
timeout_secs = 5

[retrieval]
candidate_pool = 100
top_k = 5

[inference]
endpoint = "{inference_endpoint}"
model = "test-model"
api_key_env = "INSIGHT_TEST_INFER_KEY"
timeout_secs = 5
reasoning_log = "{dir}/reasoning.log"

[server]
bind = "127.0.0.1:0"
"#,
        dir = dir.display(),
    );

    let path = dir.join("insight.toml");
    std::fs::write(&path, body).unwrap();
    incident_insight::config::load_config(&path).unwrap()
}

fn embedding_config(endpoint: &str) -> EmbeddingConfig {
    EmbeddingConfig {
        endpoint: endpoint.to_string(),
        dims: DIMS,
        api_key_env: "INSIGHT_TEST_EMBED_KEY".to_string(),
        max_retries: 3,
        base_delay_ms: 1,
        max_delay_ms: 4,
        timeout_secs: 5,
        ..EmbeddingConfig::default()
    }
}

fn set_test_keys() {
    std::env::set_var("INSIGHT_TEST_EMBED_KEY", "embed-key");
    std::env::set_var("INSIGHT_TEST_INFER_KEY", "infer-key");
}

fn embedding_body(n: usize) -> serde_json::Value {
    let vectors: Vec<Vec<f32>> = (0..n)
        .map(|i| {
            let mut v = vec![0.0f32; DIMS];
            v[i % DIMS] = 1.0;
            v
        })
        .collect();
    serde_json::json!(vectors)
}

// ---- embedding retry behavior ----

#[tokio::test]
async fn embed_returns_remote_vectors_on_success() {
    set_test_keys();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(2)))
        .expect(1)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&embedding_config(&server.uri())).unwrap();
    let texts = vec!["first".to_string(), "second".to_string()];
    let vectors = client.embed(&texts).await.unwrap();

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0].len(), DIMS);
    assert_eq!(vectors[0][0], 1.0);
}

#[tokio::test]
async fn embed_falls_back_after_three_503s() {
    set_test_keys();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&embedding_config(&server.uri())).unwrap();
    let texts = vec![
        "Jenkins pipeline failed".to_string(),
        "Git auth failure".to_string(),
    ];

    // No error escapes; the fallback vectors come back in shape.
    let vectors = client.embed(&texts).await.unwrap();
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0].len(), DIMS);
    assert_eq!(vectors, fallback_embeddings(&texts, DIMS));
}

#[tokio::test]
async fn embed_recovers_after_warming() {
    set_test_keys();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(1)))
        .expect(1)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&embedding_config(&server.uri())).unwrap();
    let vectors = client.embed(&["warming up".to_string()]).await.unwrap();

    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0][0], 1.0);
}

#[tokio::test]
async fn embed_transient_500_retries_then_falls_back() {
    set_test_keys();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&embedding_config(&server.uri())).unwrap();
    let texts = vec!["still works".to_string()];
    let vectors = client.embed(&texts).await.unwrap();
    assert_eq!(vectors, fallback_embeddings(&texts, DIMS));
}

#[tokio::test]
async fn embed_propagates_non_retryable_error() {
    set_test_keys();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .expect(1)
        .mount(&server)
        .await;

    let client = EmbeddingClient::new(&embedding_config(&server.uri())).unwrap();
    let result = client.embed(&["text".to_string()]).await;

    let err = result.unwrap_err().to_string();
    assert!(err.contains("401"), "unexpected error: {}", err);
}

// ---- end-to-end pipeline ----

async fn seed_store(config: &Config) {
    migrate::run_migrations(config).await.unwrap();
    let pool = db::connect(config).await.unwrap();

    let title = "Git auth failure";
    let description =
        "Jenkins pipeline failed after a Git authentication error; the deploy token had expired";
    let record = IncidentRecord {
        id: "inc-1".to_string(),
        title: title.to_string(),
        description: description.to_string(),
        embedding: fallback_embeddings(&[format!("{} {}", title, description)], DIMS).remove(0),
    };
    upsert_incident(&pool, &record, "fallback").await.unwrap();
    pool.close().await;
}

const ANALYSIS_CONTENT: &str = r#"<reasoning>
Both the query and the stored incident point at Git credentials.
</reasoning>

<root_cause_summary>
The CI job's Git credentials are no longer valid.
</root_cause_summary>

<troubleshooting_steps>
1. Rotate the deploy token.
2. Re-run the pipeline.
</troubleshooting_steps>"#;

fn chat_response(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [ { "message": { "role": "assistant", "content": content } } ]
    })
}

#[tokio::test]
async fn analyze_pipeline_end_to_end() {
    set_test_keys();
    let tmp = TempDir::new().unwrap();

    let inference = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(ANALYSIS_CONTENT)))
        .expect(1)
        .mount(&inference)
        .await;

    // Empty embedding endpoint: retrieval uses the deterministic fallback,
    // matching the vectors the store was seeded with.
    let config = write_config(tmp.path(), "", &inference.uri());
    seed_store(&config).await;

    let pool = db::connect(&config).await.unwrap();
    let outcome = analyze_incident(&config, &pool, "Jenkins pipeline failed after Git error", false)
        .await
        .unwrap();

    assert_eq!(outcome.similar_incidents, 1);
    assert!(outcome.document.contains("### Root Cause Summary"));
    assert!(outcome
        .document
        .contains("The CI job's Git credentials are no longer valid."));
    assert!(outcome.document.contains("1. Rotate the deploy token."));
    assert!(outcome.document.contains("2. Re-run the pipeline."));
    // Reasoning stays out of the user-facing document...
    assert!(!outcome.document.contains("point at Git credentials"));
    assert!(outcome.judge.is_none());

    // ...and lands in the diagnostic log with the query prefix.
    let log = std::fs::read_to_string(tmp.path().join("reasoning.log")).unwrap();
    assert!(log.contains("QUERY: Jenkins pipeline failed after Git error"));
    assert!(log.contains("point at Git credentials"));

    pool.close().await;
}

#[tokio::test]
async fn analyze_with_judge_scores_the_answer() {
    set_test_keys();
    let tmp = TempDir::new().unwrap();

    let inference = MockServer::start().await;
    // First call: the analysis. Second call: the judge verdict.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(ANALYSIS_CONTENT)))
        .up_to_n_times(1)
        .mount(&inference)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(
            "4.5</score> <explanation>Grounded in the retrieved incident and actionable.</explanation>",
        )))
        .expect(1)
        .mount(&inference)
        .await;

    let config = write_config(tmp.path(), "", &inference.uri());
    seed_store(&config).await;

    let pool = db::connect(&config).await.unwrap();
    let outcome = analyze_incident(&config, &pool, "Jenkins pipeline failed after Git error", true)
        .await
        .unwrap();

    let judge = outcome.judge.expect("judge verdict requested");
    assert!(judge.starts_with("### Score: 4.5/5"));
    assert!(judge.contains("Grounded in the retrieved incident"));

    pool.close().await;
}

#[tokio::test]
async fn analyze_continues_with_zero_context_on_empty_store() {
    set_test_keys();
    let tmp = TempDir::new().unwrap();

    let inference = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response(
            "Root Cause: Not enough signal to tell.\nTroubleshooting Steps:\n1. Gather logs",
        )))
        .expect(1)
        .mount(&inference)
        .await;

    let config = write_config(tmp.path(), "", &inference.uri());
    migrate::run_migrations(&config).await.unwrap();

    let pool = db::connect(&config).await.unwrap();
    let outcome = analyze_incident(&config, &pool, "Completely novel failure mode", false)
        .await
        .unwrap();

    assert_eq!(outcome.similar_incidents, 0);
    assert!(outcome.document.contains("Not enough signal to tell."));
    assert!(outcome.document.contains("1. Gather logs"));

    pool.close().await;
}

#[tokio::test]
async fn inference_failure_is_terminal_for_the_request() {
    set_test_keys();
    let tmp = TempDir::new().unwrap();

    let inference = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&inference)
        .await;

    let config = write_config(tmp.path(), "", &inference.uri());
    seed_store(&config).await;

    let pool = db::connect(&config).await.unwrap();
    let result = analyze_incident(&config, &pool, "Jenkins pipeline failed", false).await;

    assert!(result.is_err());
    pool.close().await;
}

// ---- retrieval against a seeded store ----

#[tokio::test]
async fn search_ranks_seeded_incident_first() {
    set_test_keys();
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "", "http://localhost:1");
    seed_store(&config).await;

    let pool = db::connect(&config).await.unwrap();
    let client = SimilaritySearchClient::new(pool.clone());

    let query = fallback_embeddings(
        &["Jenkins pipeline failed after Git error".to_string()],
        DIMS,
    )
    .remove(0);
    let results = client.search(&query, 5, 100).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "inc-1");
    assert_eq!(results[0].title, "Git auth failure");
    assert!(results[0].score > 0.0);

    pool.close().await;
}
