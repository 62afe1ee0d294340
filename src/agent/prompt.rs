//! Prompt templates for the research and synthesis calls.

use crate::types::{RawBatch, RawResearchResult, ResearchRole, ResearchTarget};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// A `{name}` placeholder in a template
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Placeholder for targets without a description
const NO_DESCRIPTION: &str = "No additional description provided.";

/// Research prompt for a main event: broad background and catalysts.
pub const MAIN_EVENT_RESEARCH_TEMPLATE: &str = r#"You are an expert prediction-market researcher. Produce a thorough, well-sourced research report on the following event.

EVENT TITLE: {title}
DESCRIPTION: {description}

<instructions>
1. Search for the LATEST news, analysis, and developments related to this event. Prioritise the last 30 days.
2. Cover:
   - Current state of affairs and background context
   - Recent major developments or turning points
   - Key factors and variables that could change the outcome
   - Expert opinions, polls, forecasts, or official statements
   - Upcoming catalysts, deadlines, or scheduled events
3. Aim for roughly 1-2 pages of substantive research.
4. Cite every factual claim with its source URL inline.
5. Do NOT give trading advice or recommendations.
</instructions>
"#;

/// Research prompt for a sub-event: narrow, direct evidence.
pub const SUB_EVENT_RESEARCH_TEMPLATE: &str = r#"You are an expert prediction-market researcher. Produce a thorough, well-sourced research report on the following specific question.

QUESTION: {title}
DESCRIPTION: {description}

<instructions>
1. Search for the LATEST news and data specifically relevant to this question. Prioritise the last 30 days.
2. Cover:
   - Direct evidence for and against each possible outcome
   - Recent developments that shift the probabilities
   - Quantitative data where available (polls, statistics, forecasts)
   - Expert or official positions on this specific question
   - Upcoming events or deadlines that could be decisive
3. Aim for roughly 1-2 pages of substantive research.
4. Cite every factual claim with its source URL inline.
5. Do NOT give trading advice or recommendations.
</instructions>
"#;

/// System prompt for the synthesis call
pub const SYNTHESIS_SYSTEM: &str = "You are a JSON-only response bot. Return ONLY valid JSON, \
no markdown fences, no explanation outside the JSON object.";

/// Synthesis prompt when a main event exists.
pub const SYNTHESIS_TEMPLATE: &str = r#"You are an expert prediction-market analyst. Below is research on a main event and its related sub-events. Synthesise everything into a structured JSON analysis.

MAIN EVENT: {main_title}
{main_description}

=== MAIN EVENT RESEARCH ===
{main_research}

=== SUB-EVENTS RESEARCH ===
{sub_research}

Return ONLY valid JSON matching this exact schema:

{
  "main_event_research": {
    "summary": "<2-4 paragraph synthesis of the main event>",
    "key_findings": ["<finding>", "..."],
    "sentiment": "<very_bearish|bearish|neutral|bullish|very_bullish>",
    "sentiment_rationale": "<1-2 sentence explanation>"
  },
  "sub_event_analyses": [
    {
      "sub_event_id": "<id>",
      "sub_event_title": "<title>",
      "summary": "<2-4 paragraph summary>",
      "key_findings": ["<finding>", "..."],
      "sentiment": "<very_bearish|bearish|neutral|bullish|very_bullish>",
      "sentiment_rationale": "<explanation>"
    }
  ],
  "relationships": [
    {
      "sub_event_id": "<id>",
      "sub_event_title": "<title>",
      "relationship_summary": "<how this sub-event connects to the main event>",
      "influencing_news": "<which developments around this sub-event could move the main event, and how>"
    }
  ],
  "synthesis": "<3-5 paragraph overall narrative>"
}

<rules>
- Be analytical and evidence-based, never speculative
- Base sentiment on concrete evidence from the research
- Acknowledge uncertainty where evidence is mixed or limited
- Do NOT provide trading advice or recommendations
- Every sub-event id from the input MUST appear in both sub_event_analyses and relationships
</rules>
"#;

/// Synthesis prompt for independent sub-events.
pub const SYNTHESIS_NO_MAIN_TEMPLATE: &str = r#"You are an expert prediction-market analyst. Below is research on several prediction-market questions. Synthesise everything into a structured JSON analysis.

=== MARKETS RESEARCH ===
{sub_research}

Return ONLY valid JSON matching this exact schema:

{
  "sub_event_analyses": [
    {
      "sub_event_id": "<id>",
      "sub_event_title": "<title>",
      "summary": "<2-4 paragraph summary>",
      "key_findings": ["<finding>", "..."],
      "sentiment": "<very_bearish|bearish|neutral|bullish|very_bullish>",
      "sentiment_rationale": "<explanation>"
    }
  ],
  "synthesis": "<2-4 paragraph overall narrative connecting the markets>"
}

<rules>
- Be analytical and evidence-based
- Base sentiment on concrete evidence
- Acknowledge uncertainty where evidence is mixed
- Do NOT provide trading advice
- Every sub-event id from the input MUST appear in sub_event_analyses
</rules>
"#;

/// Build the research prompt for a target.
pub fn research_prompt(target: &ResearchTarget, role: ResearchRole) -> String {
    let template = match role {
        ResearchRole::Main => MAIN_EVENT_RESEARCH_TEMPLATE,
        ResearchRole::Sub => SUB_EVENT_RESEARCH_TEMPLATE,
    };
    fill(
        template,
        &[
            ("title", target.title.as_str()),
            ("description", description_or_default(target)),
        ],
    )
}

/// Build the synthesis prompt over every raw result.
pub fn synthesis_prompt(
    main: Option<&ResearchTarget>,
    subs: &[ResearchTarget],
    raw: &RawBatch,
) -> String {
    let sub_research = sub_research_block(subs, raw);

    match main {
        Some(main) => fill(
            SYNTHESIS_TEMPLATE,
            &[
                ("main_title", main.title.as_str()),
                ("main_description", main.description.as_deref().unwrap_or("")),
                ("main_research", research_body(raw.main.as_ref()).as_str()),
                ("sub_research", sub_research.as_str()),
            ],
        ),
        None => fill(SYNTHESIS_NO_MAIN_TEMPLATE, &[("sub_research", sub_research.as_str())]),
    }
}

/// Substitute every placeholder in one pass.
///
/// Inserted values are never scanned again, so braces inside titles or
/// research text come through verbatim. Unknown placeholders are left as is.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn description_or_default(target: &ResearchTarget) -> &str {
    target
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(NO_DESCRIPTION)
}

/// One delimited block per sub-event, in submission order.
fn sub_research_block(subs: &[ResearchTarget], raw: &RawBatch) -> String {
    subs.iter()
        .enumerate()
        .map(|(i, target)| {
            format!(
                "\n--- SUB-EVENT: {} ---\nID: {}\nDESCRIPTION: {}\n{}\n",
                target.title,
                target.id,
                description_or_default(target),
                research_body(raw.sub(i))
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn research_body(result: Option<&RawResearchResult>) -> String {
    match result {
        Some(r) if r.succeeded => format!("Research Findings:\n{}", r.raw_text),
        Some(r) => format!("Research Error: {}", r.error_message()),
        None => "No research available.".to_string(),
    }
}
