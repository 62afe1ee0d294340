//! Data model shared by every pipeline stage.
//!
//! Input types ([`ResearchInput`], [`MainEvent`], [`SubEvent`]) mirror the JSON
//! a caller submits. Output types ([`ResearchOutput`] and friends) mirror the
//! JSON report handed back. Everything in between ([`ResearchTarget`],
//! [`RawResearchResult`], [`StructuredAnalysis`]) lives for a single run.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Id given to the main event's research target.
pub const MAIN_EVENT_ID: &str = "main";

/// Maximum length of an id derived from a title.
const SLUG_MAX_LEN: usize = 60;

/// Static disclaimer stamped on every report.
pub const DISCLAIMER: &str = "This research is for informational purposes only and does not \
constitute financial advice. Prediction markets carry risk. \
Always do your own research before making any decisions.";

// =============================================================================
// Input
// =============================================================================

/// The parent event that groups related sub-events together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainEvent {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single sub-event / market question to research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubEvent {
    /// Derived from the title when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Top-level input: an optional main event plus one or more sub-events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_event: Option<MainEvent>,
    #[serde(default)]
    pub sub_events: Vec<SubEvent>,
}

impl ResearchInput {
    /// Convert the input into research targets (main, subs).
    pub fn targets(&self) -> (Option<ResearchTarget>, Vec<ResearchTarget>) {
        let main = self.main_event.as_ref().map(ResearchTarget::from);
        let subs = self.sub_events.iter().map(ResearchTarget::from).collect();
        (main, subs)
    }
}

// =============================================================================
// Targets
// =============================================================================

/// Which prompt framing a research call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchRole {
    Main,
    Sub,
}

/// One question to research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchTarget {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ResearchTarget {
    /// Create a target with an id derived from its title.
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: slugify(&title),
            title,
            description: None,
        }
    }

    /// Create the main-event target.
    pub fn main(title: impl Into<String>) -> Self {
        Self {
            id: MAIN_EVENT_ID.to_string(),
            title: title.into(),
            description: None,
        }
    }

    /// Override the id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl From<&MainEvent> for ResearchTarget {
    fn from(event: &MainEvent) -> Self {
        Self {
            id: MAIN_EVENT_ID.to_string(),
            title: event.title.clone(),
            description: event.description.clone(),
        }
    }
}

impl From<&SubEvent> for ResearchTarget {
    fn from(event: &SubEvent) -> Self {
        Self {
            id: event.id.clone().unwrap_or_else(|| slugify(&event.title)),
            title: event.title.clone(),
            description: event.description.clone(),
        }
    }
}

/// Derive a stable id from a title: lowercase ASCII alphanumerics joined by `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.len() > SLUG_MAX_LEN {
        slug.truncate(SLUG_MAX_LEN);
        slug.truncate(slug.trim_end_matches('-').len());
    }
    slug
}

// =============================================================================
// Raw research
// =============================================================================

/// A single news source discovered during research.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsLink {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

/// Output of one research call for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResearchResult {
    pub target_id: String,
    pub title: String,
    pub role: ResearchRole,
    pub raw_text: String,
    pub links: Vec<NewsLink>,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RawResearchResult {
    /// A successful research result.
    pub fn success(
        target: &ResearchTarget,
        role: ResearchRole,
        raw_text: String,
        links: Vec<NewsLink>,
    ) -> Self {
        Self {
            target_id: target.id.clone(),
            title: target.title.clone(),
            role,
            raw_text,
            links,
            succeeded: true,
            error: None,
        }
    }

    /// A failed research result carrying the error message.
    pub fn failure(target: &ResearchTarget, role: ResearchRole, error: impl Into<String>) -> Self {
        Self {
            target_id: target.id.clone(),
            title: target.title.clone(),
            role,
            raw_text: String::new(),
            links: Vec::new(),
            succeeded: false,
            error: Some(error.into()),
        }
    }

    /// The research text when the call succeeded and produced any.
    pub fn usable_text(&self) -> Option<&str> {
        if self.succeeded && !self.raw_text.trim().is_empty() {
            Some(&self.raw_text)
        } else {
            None
        }
    }

    /// Error message, or a generic one when none was recorded.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

/// Raw results for a whole batch, `subs` in submission order.
///
/// Sub-events are paired with their results by position, never by id:
/// derived ids can collide.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawBatch {
    pub main: Option<RawResearchResult>,
    pub subs: Vec<RawResearchResult>,
}

impl RawBatch {
    /// Raw result for the sub-event submitted at `index`, if one exists.
    pub fn sub(&self, index: usize) -> Option<&RawResearchResult> {
        self.subs.get(index)
    }

    /// Whether the main event produced research text worth analysing.
    pub fn main_usable(&self) -> bool {
        self.main
            .as_ref()
            .and_then(RawResearchResult::usable_text)
            .is_some()
    }
}

// =============================================================================
// Analysis
// =============================================================================

/// Five-point ordinal sentiment scale.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    VeryBearish,
    Bearish,
    #[default]
    Neutral,
    Bullish,
    VeryBullish,
}

impl Sentiment {
    /// All values, most bearish first.
    pub const ALL: [Sentiment; 5] = [
        Sentiment::VeryBearish,
        Sentiment::Bearish,
        Sentiment::Neutral,
        Sentiment::Bullish,
        Sentiment::VeryBullish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::VeryBearish => "very_bearish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
            Sentiment::Bullish => "bullish",
            Sentiment::VeryBullish => "very_bullish",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured analysis of one target, before its links are attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAnalysis {
    pub target_id: String,
    pub title: String,
    pub summary: String,
    pub key_findings: Vec<String>,
    pub sentiment: Sentiment,
    pub sentiment_rationale: String,
}

/// How a sub-event relates to and could influence the main event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub sub_event_id: String,
    pub sub_event_title: String,
    pub relationship_summary: String,
    pub influencing_news: String,
}

/// Output of the synthesis stage (model-backed or fallback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_event: Option<EventAnalysis>,
    /// One entry per submitted sub-event, in submission order.
    pub sub_events: Vec<EventAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<Relationship>>,
    pub synthesis: String,
}

// =============================================================================
// Output
// =============================================================================

/// Research results for one event (main or sub).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResearch {
    pub target_id: String,
    pub title: String,
    pub summary: String,
    pub key_findings: Vec<String>,
    pub news_links: Vec<NewsLink>,
    pub sentiment: Sentiment,
    pub sentiment_rationale: String,
}

impl EventResearch {
    /// Combine an analysis with the links found for the same target.
    pub fn from_analysis(analysis: EventAnalysis, news_links: Vec<NewsLink>) -> Self {
        Self {
            target_id: analysis.target_id,
            title: analysis.title,
            summary: analysis.summary,
            key_findings: analysis.key_findings,
            news_links,
            sentiment: analysis.sentiment,
            sentiment_rationale: analysis.sentiment_rationale,
        }
    }
}

/// The complete research report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_event_research: Option<EventResearch>,
    pub sub_event_research: Vec<EventResearch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<Relationship>>,
    pub synthesis: String,
    pub research_timestamp: String,
    pub disclaimer: String,
}

impl ResearchOutput {
    /// Every link in the report, de-duplicated by URL (main event first).
    pub fn all_sources(&self) -> Vec<&NewsLink> {
        let mut seen = HashSet::new();
        self.main_event_research
            .iter()
            .chain(self.sub_event_research.iter())
            .flat_map(|event| event.news_links.iter())
            .filter(|link| seen.insert(link.url.as_str()))
            .collect()
    }
}
