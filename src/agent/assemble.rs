//! Final merge of links and analysis into the report.

use crate::types::{
    EventAnalysis, EventResearch, RawBatch, RawResearchResult, ResearchOutput, StructuredAnalysis,
    DISCLAIMER,
};
use chrono::{DateTime, SecondsFormat, Utc};

/// Build the report, stamped with the current time.
pub fn assemble(raw: &RawBatch, analysis: StructuredAnalysis) -> ResearchOutput {
    assemble_at(raw, analysis, Utc::now())
}

/// Build the report with an explicit timestamp.
///
/// Each entry receives only the links from its own raw result, paired by
/// submission position; nothing is recomputed from the analysis.
pub fn assemble_at(
    raw: &RawBatch,
    analysis: StructuredAnalysis,
    now: DateTime<Utc>,
) -> ResearchOutput {
    let main_event_research = analysis
        .main_event
        .map(|a| with_links(a, raw.main.as_ref()));
    let sub_event_research = analysis
        .sub_events
        .into_iter()
        .enumerate()
        .map(|(i, a)| with_links(a, raw.sub(i)))
        .collect();

    // relationships only accompany a main event
    let relationships = match main_event_research {
        Some(_) => Some(analysis.relationships.unwrap_or_default()),
        None => None,
    };

    ResearchOutput {
        main_event_research,
        sub_event_research,
        relationships,
        synthesis: analysis.synthesis,
        research_timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        disclaimer: DISCLAIMER.to_string(),
    }
}

fn with_links(analysis: EventAnalysis, raw: Option<&RawResearchResult>) -> EventResearch {
    let links = raw.map(|r| r.links.clone()).unwrap_or_default();
    EventResearch::from_analysis(analysis, links)
}
