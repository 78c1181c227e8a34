//! Inference client for the root-cause analysis and judge calls.
//!
//! Speaks an OpenAI-compatible chat-completions API. The model may answer
//! with a pre-structured JSON object carrying the analysis fields (used
//! directly) or with raw text, which goes through the ordered extraction
//! strategies in [`crate::extract`].
//!
//! A missing API key is a configuration error and fails construction; the
//! pipeline cannot operate without inference, so there is no fallback here.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::InferenceConfig;
use crate::extract::extract_analysis;
use crate::models::RootCauseAnalysis;
use crate::prompt::{build_analysis_prompt, build_judge_prompt};
use crate::reasoning_log::ReasoningLog;

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

pub struct InferenceClient {
    http: reqwest::Client,
    config: InferenceConfig,
    api_key: String,
    reasoning_log: ReasoningLog,
}

impl InferenceClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| {
                format!(
                    "Inference API key not found. Set the {} environment variable.",
                    config.api_key_env
                )
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            config: config.clone(),
            api_key,
            reasoning_log: ReasoningLog::new(&config.reasoning_log),
        })
    }

    /// Analyze an incident against its retrieved context.
    ///
    /// The reasoning section is appended to the diagnostic log and stripped
    /// from the value's user-facing fields downstream; a log write failure
    /// is reported but never fails the analysis.
    pub async fn analyze(
        &self,
        incident_text: &str,
        similar_incident_texts: &[String],
    ) -> Result<RootCauseAnalysis> {
        let prompt = build_analysis_prompt(incident_text, similar_incident_texts);
        let content = self.complete(&prompt).await?;
        let analysis = analysis_from_content(&content);

        if let Err(e) = self.reasoning_log.append(incident_text, &analysis.reasoning) {
            tracing::warn!(error = %e, "failed to append reasoning trace");
        }

        Ok(analysis)
    }

    /// Judge pass: rate a produced answer against the original query.
    /// Returns the raw judge text; scoring happens in the formatter.
    pub async fn evaluate(&self, query: &str, answer: &str) -> Result<String> {
        let prompt = build_judge_prompt(query, answer);
        self.complete(&prompt).await
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Inference request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Inference service error {}: {}", status, body);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse inference response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Inference response contained no content"))
    }
}

/// Turn model output into an analysis: a JSON object with the named fields
/// is used directly; anything else goes through the extraction strategies.
pub fn analysis_from_content(content: &str) -> RootCauseAnalysis {
    if let Ok(analysis) = serde_json::from_str::<RootCauseAnalysis>(content.trim()) {
        return analysis;
    }

    let (analysis, strategy) = extract_analysis(content);
    tracing::debug!(?strategy, "extracted analysis from raw model text");
    analysis
}
