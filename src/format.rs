//! Presentation formatting for analyses and judge output.
//!
//! `format_analysis` renders a [`RootCauseAnalysis`] as a markdown document
//! with fixed headings and freshly numbered steps; `format_judge_score`
//! turns raw judge text into a `Score: X/5` block. Document normalization
//! (markup stripping, blank-line collapsing) is idempotent: running
//! [`clean_document`] over an already formatted document changes nothing.

use crate::models::{JudgeEvaluation, RootCauseAnalysis};

const SUMMARY_HEADING: &str = "### Root Cause Summary";
const STEPS_HEADING: &str = "### Troubleshooting Steps";

/// Render an analysis as a presentation-ready markdown document.
///
/// Troubleshooting steps are renumbered `1..k` in their original relative
/// order; any numbering or bullet tokens in the source text are discarded
/// first, since source numbering is untrusted.
pub fn format_analysis(analysis: &RootCauseAnalysis) -> String {
    let mut doc = String::new();

    doc.push_str(SUMMARY_HEADING);
    doc.push_str("\n\n");
    doc.push_str(analysis.root_cause_summary.trim());

    let steps = renumber_steps(&analysis.troubleshooting_steps);
    if !steps.is_empty() {
        doc.push_str("\n\n");
        doc.push_str(STEPS_HEADING);
        doc.push_str("\n\n");
        doc.push_str(&steps.join("\n"));
    }

    clean_document(&doc)
}

/// Discard untrusted numbering and assign fresh `1..k` numbers.
pub fn renumber_steps(steps: &[String]) -> Vec<String> {
    steps
        .iter()
        .map(|s| strip_list_prefix(s.trim()))
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect()
}

/// Strip a leading list token (`3.`, `12)`, `-`, `*`) from a line.
/// Lines that merely start with a number (`3 replicas died`) are left alone.
pub fn strip_list_prefix(line: &str) -> &str {
    let trimmed = line.trim_start();

    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return stripped.trim_start();
        }
        return trimmed;
    }

    if let Some(stripped) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        return stripped.trim_start();
    }

    trimmed
}

/// Normalize a rendered document: strip leftover structural markup, collapse
/// runs of three or more newlines down to one blank line, trim. Idempotent.
pub fn clean_document(text: &str) -> String {
    let stripped = strip_markup(text);
    collapse_blank_lines(&stripped).trim().to_string()
}

/// Remove `<tag>`-shaped spans. Only single-line spans are treated as tags
/// so prose like `a < b and c > d` survives.
pub fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('<') {
        let candidate = &rest[open + 1..];
        let close = candidate.find('>');
        let newline = candidate.find('\n');

        let is_tag = match (close, newline) {
            (Some(c), Some(n)) => c < n && c > 0,
            (Some(c), None) => c > 0,
            _ => false,
        };

        if let (true, Some(c)) = (is_tag, close) {
            out.push_str(&rest[..open]);
            rest = &candidate[c + 1..];
        } else {
            out.push_str(&rest[..open + 1]);
            rest = candidate;
        }
    }

    out.push_str(rest);
    out
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;

    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            continue;
        }
        if newlines > 0 {
            out.push_str(if newlines >= 3 { "\n\n" } else { &"\n\n"[..newlines] });
            newlines = 0;
        }
        out.push(ch);
    }
    if newlines > 0 {
        out.push_str(if newlines >= 3 { "\n\n" } else { &"\n\n"[..newlines] });
    }

    out
}

// ============ Judge score formatting ============

/// Format raw judge output as `### Score: X/5` plus a justification block.
///
/// Extraction priority:
/// 1. `<number> </score> <explanation>…</explanation>` delimited pair,
/// 2. a number at the very start of the text, rest as justification,
/// 3. a `score: <number>` token anywhere, justification = text with the
///    token removed,
/// 4. otherwise the cleaned raw text, unscored.
pub fn format_judge_score(raw: &str) -> String {
    match parse_judge(raw) {
        Some(evaluation) => render_score(&evaluation),
        None => clean_document(raw),
    }
}

/// Parse raw judge text into a [`JudgeEvaluation`] using the extraction
/// priority above. The score is clamped to 0–5 with one decimal of
/// precision. `None` when no score pattern matches.
pub fn parse_judge(raw: &str) -> Option<JudgeEvaluation> {
    let (score, justification) = if let Some((score, justification)) = delimited_score(raw) {
        (score, justification)
    } else {
        let cleaned = clean_document(raw);
        if let Some((score, rest)) = leading_score(&cleaned) {
            (score, rest.trim().to_string())
        } else {
            labeled_score(&cleaned)?
        }
    };

    Some(JudgeEvaluation {
        score: (score.clamp(0.0, 5.0) * 10.0).round() / 10.0,
        justification,
    })
}

fn render_score(evaluation: &JudgeEvaluation) -> String {
    let score = evaluation.score;
    let rendered = if (score - score.trunc()).abs() < f64::EPSILON {
        format!("{}", score.trunc() as i64)
    } else {
        format!("{:.1}", score)
    };

    format!(
        "### Score: {}/5\n\n### Justification:\n{}",
        rendered,
        evaluation.justification.trim()
    )
}

/// Priority 1: `<number> </score> <explanation>…</explanation>`.
fn delimited_score(raw: &str) -> Option<(f64, String)> {
    let close = raw.find("</score>")?;
    let score = trailing_number(&raw[..close])?;

    let after = &raw[close + "</score>".len()..];
    let start = after.find("<explanation>")? + "<explanation>".len();
    let end = after[start..].find("</explanation>")? + start;

    Some((score, after[start..end].trim().to_string()))
}

/// Priority 2: a number at the very start, separators skipped, remainder
/// is the justification.
fn leading_score(text: &str) -> Option<(f64, &str)> {
    let trimmed = text.trim_start();
    let (score, len) = parse_number(trimmed)?;

    let rest = trimmed[len..]
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '.' | '-' | ':'));
    Some((score, rest))
}

/// Priority 3: `score: <number>` anywhere, case-insensitive.
fn labeled_score(text: &str) -> Option<(f64, String)> {
    let token_start = find_ignore_ascii_case(text, "score")?;
    let mut cursor = token_start + "score".len();

    let after = &text[cursor..];
    let skipped = after.len() - after.trim_start_matches([':', ' ', '\t']).len();
    cursor += skipped;

    let (score, len) = parse_number(&text[cursor..])?;

    // Justification is the text with the score token spliced out.
    let mut justification = String::with_capacity(text.len());
    justification.push_str(&text[..token_start]);
    justification.push_str(&text[cursor + len..]);

    Some((score, justification.trim().to_string()))
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    for (i, _) in haystack.char_indices() {
        if haystack.len() - i < needle.len() {
            break;
        }
        if haystack.is_char_boundary(i + needle.len())
            && haystack[i..i + needle.len()].eq_ignore_ascii_case(needle)
        {
            return Some(i);
        }
    }
    None
}

/// Parse a decimal number at the start of `s`, returning the value and the
/// number of bytes consumed.
fn parse_number(s: &str) -> Option<(f64, usize)> {
    let int_len = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if int_len == 0 {
        return None;
    }

    let mut len = int_len;
    let rest = &s[int_len..];
    if let Some(frac) = rest.strip_prefix('.') {
        let frac_len = frac.chars().take_while(|c| c.is_ascii_digit()).count();
        if frac_len > 0 {
            len += 1 + frac_len;
        }
    }

    s[..len].parse::<f64>().ok().map(|v| (v, len))
}

fn trailing_number(s: &str) -> Option<f64> {
    let trimmed = s.trim_end();
    let start = trimmed
        .rfind(|c: char| !c.is_ascii_digit() && c != '.')
        .map(|i| i + 1)
        .unwrap_or(0);
    let token = trimmed[start..].trim_start_matches('.');
    if token.is_empty() {
        return None;
    }
    token.parse::<f64>().ok()
}
