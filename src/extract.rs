//! Extraction of structured analysis fields from raw model text.
//!
//! Models do not always honor the output contract, so extraction is an
//! ordered list of strategies tried in sequence rather than a chain of
//! string rewrites:
//!
//! 1. [`ExtractionStrategy::TaggedSections`] — the tagged delimiters the
//!    prompt asks for (`<root_cause_summary>`, `<troubleshooting_steps>`,
//!    `<reasoning>`).
//! 2. [`ExtractionStrategy::LinePrefix`] — heuristic matching of lines
//!    beginning `Root Cause` / `Troubleshooting Steps`, case-insensitive.
//! 3. [`ExtractionStrategy::RawText`] — the whole text becomes the summary
//!    with an empty step list. Always succeeds.

use crate::format::strip_list_prefix;
use crate::models::RootCauseAnalysis;

/// Which strategy produced an analysis. Ordered by preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    TaggedSections,
    LinePrefix,
    RawText,
}

/// Extract a [`RootCauseAnalysis`] from raw model output, reporting which
/// strategy matched.
pub fn extract_analysis(raw: &str) -> (RootCauseAnalysis, ExtractionStrategy) {
    if let Some(analysis) = tagged_sections(raw) {
        return (analysis, ExtractionStrategy::TaggedSections);
    }
    if let Some(analysis) = line_prefix_sections(raw) {
        return (analysis, ExtractionStrategy::LinePrefix);
    }

    (
        RootCauseAnalysis {
            reasoning: String::new(),
            root_cause_summary: raw.trim().to_string(),
            troubleshooting_steps: Vec::new(),
        },
        ExtractionStrategy::RawText,
    )
}

/// Content between `<tag>` and `</tag>`, trimmed. `None` when either
/// delimiter is missing.
pub fn tag_section<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim())
}

fn tagged_sections(raw: &str) -> Option<RootCauseAnalysis> {
    let summary = tag_section(raw, "root_cause_summary");
    let steps = tag_section(raw, "troubleshooting_steps");

    // No delimiters at all means this strategy does not apply.
    if summary.is_none() && steps.is_none() {
        return None;
    }

    Some(RootCauseAnalysis {
        reasoning: tag_section(raw, "reasoning").unwrap_or_default().to_string(),
        root_cause_summary: summary.unwrap_or_default().to_string(),
        troubleshooting_steps: parse_step_lines(steps.unwrap_or_default()),
    })
}

#[derive(PartialEq)]
enum PrefixSection {
    None,
    Summary,
    Steps,
}

fn line_prefix_sections(raw: &str) -> Option<RootCauseAnalysis> {
    let mut section = PrefixSection::None;
    let mut summary_lines: Vec<&str> = Vec::new();
    let mut step_lines: Vec<&str> = Vec::new();
    let mut matched = false;

    for line in raw.lines() {
        let lower = line.trim().to_lowercase();
        if lower.starts_with("root cause") {
            section = PrefixSection::Summary;
            matched = true;
            if let Some(rest) = after_colon(line) {
                summary_lines.push(rest);
            }
            continue;
        }
        if lower.starts_with("troubleshooting step") {
            section = PrefixSection::Steps;
            matched = true;
            continue;
        }

        match section {
            PrefixSection::Summary => summary_lines.push(line),
            PrefixSection::Steps => step_lines.push(line),
            PrefixSection::None => {}
        }
    }

    if !matched {
        return None;
    }

    Some(RootCauseAnalysis {
        reasoning: String::new(),
        root_cause_summary: summary_lines.join("\n").trim().to_string(),
        troubleshooting_steps: parse_step_lines(&step_lines.join("\n")),
    })
}

/// Text after the first colon on the line, if any.
fn after_colon(line: &str) -> Option<&str> {
    let rest = line.split_once(':')?.1.trim();
    (!rest.is_empty()).then_some(rest)
}

/// Split a steps block into individual steps, discarding list numbering
/// and bullet tokens. Source numbering is untrusted; the formatter assigns
/// fresh numbers on output.
pub fn parse_step_lines(block: &str) -> Vec<String> {
    block
        .lines()
        .map(|line| strip_list_prefix(line.trim()).to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAGGED: &str = r#"<reasoning>
The incidents all show credential expiry.
</reasoning>

<root_cause_summary>
Expired Git credentials on the CI runner.
</root_cause_summary>

<troubleshooting_steps>
1. Rotate the deploy token.
2. Re-run the pipeline.
</troubleshooting_steps>"#;

    #[test]
    fn test_tagged_sections_preferred() {
        let (analysis, strategy) = extract_analysis(TAGGED);
        assert_eq!(strategy, ExtractionStrategy::TaggedSections);
        assert_eq!(analysis.reasoning, "The incidents all show credential expiry.");
        assert_eq!(
            analysis.root_cause_summary,
            "Expired Git credentials on the CI runner."
        );
        assert_eq!(
            analysis.troubleshooting_steps,
            vec!["Rotate the deploy token.", "Re-run the pipeline."]
        );
    }

    #[test]
    fn test_tagged_beats_prefix_when_both_present() {
        let mixed = format!("Root Cause: not this one\n\n{}", TAGGED);
        let (analysis, strategy) = extract_analysis(&mixed);
        assert_eq!(strategy, ExtractionStrategy::TaggedSections);
        assert!(analysis.root_cause_summary.contains("Expired Git credentials"));
    }

    #[test]
    fn test_line_prefix_fallback() {
        let raw = "Root Cause Summary: The runner ran out of disk.\n\
                   Troubleshooting Steps:\n\
                   1) Clear the workspace\n\
                   2) Add a cleanup cron";
        let (analysis, strategy) = extract_analysis(raw);
        assert_eq!(strategy, ExtractionStrategy::LinePrefix);
        assert_eq!(analysis.root_cause_summary, "The runner ran out of disk.");
        assert_eq!(
            analysis.troubleshooting_steps,
            vec!["Clear the workspace", "Add a cleanup cron"]
        );
    }

    #[test]
    fn test_line_prefix_case_insensitive() {
        let raw = "ROOT CAUSE: flaky DNS\ntroubleshooting steps:\n- check resolv.conf";
        let (analysis, strategy) = extract_analysis(raw);
        assert_eq!(strategy, ExtractionStrategy::LinePrefix);
        assert_eq!(analysis.root_cause_summary, "flaky DNS");
        assert_eq!(analysis.troubleshooting_steps, vec!["check resolv.conf"]);
    }

    #[test]
    fn test_raw_text_last_resort() {
        let raw = "The model produced prose with no recognizable structure.";
        let (analysis, strategy) = extract_analysis(raw);
        assert_eq!(strategy, ExtractionStrategy::RawText);
        assert_eq!(analysis.root_cause_summary, raw);
        assert!(analysis.troubleshooting_steps.is_empty());
        assert!(analysis.reasoning.is_empty());
    }

    #[test]
    fn test_unclosed_tag_does_not_match() {
        let raw = "<root_cause_summary>never closed";
        let (_, strategy) = extract_analysis(raw);
        assert_eq!(strategy, ExtractionStrategy::RawText);
    }

    #[test]
    fn test_summary_spanning_multiple_lines() {
        let raw = "Root Cause:\nToken expired.\nRenewal job was disabled.\n\
                   Troubleshooting Steps:\n1. Re-enable the renewal job";
        let (analysis, _) = extract_analysis(raw);
        assert_eq!(
            analysis.root_cause_summary,
            "Token expired.\nRenewal job was disabled."
        );
    }
}
