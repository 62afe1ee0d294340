//! Deterministic synthesis used when the model-backed synthesizer fails.
//!
//! Everything here is a pure function of its inputs: no I/O and no clock, so
//! two calls over the same raw results produce identical analyses.

use super::config::ResearchConfig;
use crate::types::{
    EventAnalysis, RawBatch, RawResearchResult, Relationship, ResearchTarget, Sentiment,
    StructuredAnalysis,
};

/// Key finding attached to every target in degraded mode.
pub const DEGRADED_FINDING: &str =
    "Automated synthesis was unavailable; the summary is unprocessed research text.";

const DEGRADED_RATIONALE: &str =
    "Sentiment defaults to neutral because no automated analysis was performed.";

const UNAVAILABLE_RATIONALE: &str =
    "Sentiment defaults to neutral because research for this event failed.";

/// Build a minimal, valid analysis straight from the raw research.
///
/// `reason` names why the synthesizer was skipped and is quoted in the
/// overall narrative.
pub fn fallback_synthesize(
    main: Option<&ResearchTarget>,
    subs: &[ResearchTarget],
    raw: &RawBatch,
    reason: &str,
    config: &ResearchConfig,
) -> StructuredAnalysis {
    StructuredAnalysis {
        main_event: main.map(|target| degraded_analysis(target, raw.main.as_ref(), config)),
        sub_events: subs
            .iter()
            .enumerate()
            .map(|(i, target)| degraded_analysis(target, raw.sub(i), config))
            .collect(),
        relationships: main.map(|main| {
            subs.iter()
                .map(|sub| templated_relationship(main, sub))
                .collect()
        }),
        synthesis: fallback_narrative(main, subs, raw, reason),
    }
}

fn degraded_analysis(
    target: &ResearchTarget,
    raw: Option<&RawResearchResult>,
    config: &ResearchConfig,
) -> EventAnalysis {
    match raw.and_then(RawResearchResult::usable_text) {
        Some(text) => EventAnalysis {
            target_id: target.id.clone(),
            title: target.title.clone(),
            summary: truncate_chars(text.trim(), config.summary_char_limit),
            key_findings: vec![DEGRADED_FINDING.to_string()],
            sentiment: Sentiment::Neutral,
            sentiment_rationale: DEGRADED_RATIONALE.to_string(),
        },
        None => {
            let mut analysis = unavailable_analysis(target, raw);
            analysis.key_findings.push(DEGRADED_FINDING.to_string());
            analysis
        }
    }
}

/// Neutral placeholder for a target whose research failed.
pub(crate) fn unavailable_analysis(
    target: &ResearchTarget,
    raw: Option<&RawResearchResult>,
) -> EventAnalysis {
    let error = match raw {
        Some(result) if result.succeeded => "research returned no text",
        Some(result) => result.error_message(),
        None => "no research result",
    };
    EventAnalysis {
        target_id: target.id.clone(),
        title: target.title.clone(),
        summary: format!("Research unavailable: {}", error),
        key_findings: Vec::new(),
        sentiment: Sentiment::Neutral,
        sentiment_rationale: UNAVAILABLE_RATIONALE.to_string(),
    }
}

/// Generic relationship entry for one sub-event.
pub(crate) fn templated_relationship(main: &ResearchTarget, sub: &ResearchTarget) -> Relationship {
    Relationship {
        sub_event_id: sub.id.clone(),
        sub_event_title: sub.title.clone(),
        relationship_summary: format!(
            "\"{}\" is a related question to \"{}\"; no automated analysis of how they connect is available.",
            sub.title, main.title
        ),
        influencing_news: "Not assessed. Review the raw research for each event directly."
            .to_string(),
    }
}

fn fallback_narrative(
    main: Option<&ResearchTarget>,
    subs: &[ResearchTarget],
    raw: &RawBatch,
    reason: &str,
) -> String {
    let mut usable = Vec::new();
    let mut unusable = Vec::new();

    let main_entry = main.map(|target| (target, raw.main.as_ref()));
    let sub_entries = subs.iter().enumerate().map(|(i, target)| (target, raw.sub(i)));
    for (target, result) in main_entry.into_iter().chain(sub_entries) {
        if result.and_then(RawResearchResult::usable_text).is_some() {
            usable.push(target.title.as_str());
        } else {
            unusable.push(target.title.as_str());
        }
    }

    format!(
        "Automated synthesis was unavailable ({}). Usable raw research was collected for: {}. \
No usable research for: {}. Each summary below is unprocessed research text and every \
sentiment is neutral.",
        reason,
        list_or_none(&usable),
        list_or_none(&unusable)
    )
}

fn list_or_none(titles: &[&str]) -> String {
    if titles.is_empty() {
        "none".to_string()
    } else {
        titles.join("; ")
    }
}

/// Truncate to at most `limit` characters, marking the cut with `...`.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit).collect();
    format!("{}...", kept.trim_end())
}
