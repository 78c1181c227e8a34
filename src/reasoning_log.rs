//! Append-only diagnostic log of model reasoning traces.
//!
//! One entry per analysis call: RFC 3339 timestamp, the query truncated to a
//! short prefix, and the full reasoning text. Reasoning never reaches user
//! output; this file is the only place it lands.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Query prefix length recorded with each entry.
const QUERY_PREFIX_LEN: usize = 100;

pub struct ReasoningLog {
    path: PathBuf,
}

impl ReasoningLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Append one reasoning trace. A missing reasoning section is recorded
    /// as such rather than skipped, so gaps are visible when debugging.
    pub fn append(&self, query: &str, reasoning: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open reasoning log: {}", self.path.display()))?;

        let timestamp = chrono::Utc::now().to_rfc3339();
        let prefix = truncate_chars(query, QUERY_PREFIX_LEN);
        let body = if reasoning.trim().is_empty() {
            "(no reasoning section found)"
        } else {
            reasoning.trim()
        };

        writeln!(
            file,
            "=== {} ===\nQUERY: {}\nREASONING:\n{}\n",
            timestamp, prefix, body
        )?;

        Ok(())
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_creates_and_accumulates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("logs/reasoning.log");
        let log = ReasoningLog::new(&path);

        log.append("first query", "thinking about git").unwrap();
        log.append("second query", "").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("QUERY: first query"));
        assert!(content.contains("thinking about git"));
        assert!(content.contains("(no reasoning section found)"));
        assert_eq!(content.matches("===").count(), 4);
    }

    #[test]
    fn test_long_query_truncated() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("reasoning.log");
        let log = ReasoningLog::new(&path);

        let query = "x".repeat(300);
        log.append(&query, "r").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(&format!("QUERY: {}...", "x".repeat(100))));
        assert!(!content.contains(&"x".repeat(101)));
    }
}
