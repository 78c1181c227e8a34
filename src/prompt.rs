//! Prompt templates for the inference and judge calls.

/// Template for the root-cause analysis call. The model is instructed to
/// think in a `<reasoning>` section (captured for diagnostics, never shown
/// to users) and deliver its recommendation in tagged sections the
/// extraction layer knows how to locate.
const ROOT_CAUSE_TEMPLATE: &str = r#"<task>
You are an expert SRE assistant. Given a new incident and a list of similar past incidents, analyze the patterns to identify common root causes and suggest the next best troubleshooting steps.

Think step-by-step through your analysis, but structure your output properly.
</task>

<new_incident>
{query}
</new_incident>

<similar_incidents>
{similar_incidents}
</similar_incidents>

<instructions>
First, think through your analysis step-by-step in a reasoning section. Then provide your final recommendations.

Output using EXACTLY these XML tags:

<reasoning>
[Your step-by-step analysis:
1. What patterns do you see in the similar incidents?
2. What are the common themes or root causes?
3. How does this relate to the new incident?
4. What troubleshooting approach makes most sense?]
</reasoning>

<root_cause_summary>
[Provide a concise summary of the most likely root causes]
</root_cause_summary>

<troubleshooting_steps>
[List the recommended troubleshooting steps in order of priority, using numbered list format]
</troubleshooting_steps>
</instructions>"#;

/// Template for the LLM-as-judge pass: rate a produced answer against the
/// original incident on a 0–5 scale.
const JUDGE_TEMPLATE: &str = r#"<task>
You are evaluating the quality of a root-cause analysis produced for an incident report. Rate how relevant, specific, and actionable the response is for the given incident.
</task>

<incident>
{query}
</incident>

<response>
{response}
</response>

<instructions>
Give a score from 0 to 5 (half points allowed), where 5 means the response identifies a plausible root cause and gives concrete, correctly ordered troubleshooting steps, and 0 means the response is irrelevant or misleading.

Output the score followed by </score>, then your justification wrapped in <explanation></explanation> tags.
</instructions>"#;

/// Build the analysis prompt, wrapping each retrieved incident in
/// `<incident>` tags so the model sees them as discrete context items.
pub fn build_analysis_prompt(query: &str, similar_incidents: &[String]) -> String {
    let similar_block = similar_incidents
        .iter()
        .map(|text| format!("<incident>{}</incident>", text))
        .collect::<Vec<_>>()
        .join("\n\n");

    ROOT_CAUSE_TEMPLATE
        .replace("{query}", query)
        .replace("{similar_incidents}", &similar_block)
        .trim()
        .to_string()
}

pub fn build_judge_prompt(query: &str, response: &str) -> String {
    JUDGE_TEMPLATE
        .replace("{query}", query)
        .replace("{response}", response)
        .trim()
        .to_string()
}
