//! Augur - parallel event research pipeline
//!
//! Augur turns a prediction-market question (an optional main event plus
//! related sub-events) into a structured research report. Every question is
//! researched concurrently with a search-augmented model call, the raw
//! findings are reconciled by one synthesis call, and the result is a
//! well-formed [`ResearchOutput`] even when individual calls fail or the run
//! exceeds its time budget.
//!
//! # Quick Start
//!
//! ```ignore
//! use augur::{ResearchAgent, ResearchInput};
//!
//! #[tokio::main]
//! async fn main() -> augur::Result<()> {
//!     let agent = ResearchAgent::from_env()?.verbose(true);
//!
//!     let input: ResearchInput = serde_json::from_str(r#"{
//!         "main_event": {"title": "US strikes Iran by...?"},
//!         "sub_events": [{"title": "Khamenei out by 2026?"}]
//!     }"#)?;
//!
//!     let report = agent.run(&input).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

mod agent;
mod backend;
mod error;
mod types;

#[cfg(test)]
mod testing;

pub use agent::{
    assemble, assemble_at, extract_news_links, fallback_synthesize, research, run_research,
    synthesize, with_retry, ConcurrencyLimiter, EventCallback, FanOutContext, LimiterPermit,
    PipelineCallbacks, PipelineEvent, PipelineStage, ResearchAgent, ResearchConfig,
    ResearchSlots, RetryPolicy, Slot,
};
pub use backend::{
    Annotation, OpenAiBackend, ReasoningRequest, ResearchBackend, ResponseSegment,
    SearchContextSize, SearchRequest, SearchResponse,
};
pub use error::{Error, Result};
pub use types::{
    slugify, EventAnalysis, EventResearch, MainEvent, NewsLink, RawBatch, RawResearchResult,
    Relationship, ResearchInput, ResearchOutput, ResearchRole, ResearchTarget, Sentiment,
    StructuredAnalysis, SubEvent, DISCLAIMER, MAIN_EVENT_ID,
};
