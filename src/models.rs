//! Core data models used throughout Incident Insight.
//!
//! These types represent the incidents, analyses, and evaluations that flow
//! through the retrieval and inference pipeline. Each stage produces its
//! value and hands it to the next by move; there is no shared mutable state
//! between stages.

use serde::{Deserialize, Serialize};

/// A historical incident as stored in the database.
///
/// The embedding length must equal the configured model dimensionality;
/// records are only comparable within one dimensionality.
#[derive(Debug, Clone)]
pub struct IncidentRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub embedding: Vec<f32>,
}

/// Search projection of an incident: id, title, description, and the
/// similarity score against the query vector. The embedding payload is
/// deliberately excluded.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarIncident {
    pub id: String,
    pub title: String,
    pub description: String,
    pub score: f64,
}

impl SimilarIncident {
    /// Flatten to the text representation handed to the inference prompt.
    pub fn context_text(&self) -> String {
        format!("{}\n{}", self.title, self.description)
    }
}

/// Structured root-cause analysis produced by the inference step.
///
/// `reasoning` is captured for the diagnostic log only and is never shown
/// to end users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCauseAnalysis {
    #[serde(default)]
    pub reasoning: String,
    pub root_cause_summary: String,
    #[serde(default)]
    pub troubleshooting_steps: Vec<String>,
}

/// Quality score from the LLM-as-judge pass. Derived from a completed
/// analysis and the original query; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeEvaluation {
    /// 0–5, half-integer granularity.
    pub score: f64,
    pub justification: String,
}

/// Raw incident as read from an import file, before embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct IncidentSeed {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
}

impl IncidentSeed {
    /// Title and description combined into one string so the embedding
    /// captures the full context of the record.
    pub fn combined_content(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}
