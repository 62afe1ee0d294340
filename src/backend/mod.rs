//! Backend capabilities the pipeline depends on.
//!
//! The pipeline only needs two things from the outside world:
//!
//! - **search**: send a prompt with a web-search tool enabled, get back text
//!   plus the segments of that text that carry source citations;
//! - **reason**: send a system + user prompt with no tools, get back text
//!   (expected to be JSON).
//!
//! [`OpenAiBackend`] implements both over the OpenAI Responses API. Tests
//! substitute their own implementation.

mod openai;

pub use openai::OpenAiBackend;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How much web context the search tool should pull in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchContextSize {
    Low,
    Medium,
    #[default]
    High,
}

impl SearchContextSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchContextSize::Low => "low",
            SearchContextSize::Medium => "medium",
            SearchContextSize::High => "high",
        }
    }

    /// Parse a context size name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(SearchContextSize::Low),
            "medium" => Some(SearchContextSize::Medium),
            "high" => Some(SearchContextSize::High),
            _ => None,
        }
    }
}

impl fmt::Display for SearchContextSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A search-augmented research request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub model: String,
    pub prompt: String,
    pub search_context_size: SearchContextSize,
}

/// A citation attached to a span of a response segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
    pub url: Option<String>,
    pub title: Option<String>,
    /// Character offsets into the owning segment's text.
    pub start_index: Option<usize>,
    pub end_index: Option<usize>,
}

/// One block of response text together with its citations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseSegment {
    pub text: String,
    pub annotations: Vec<Annotation>,
}

/// Response to a [`SearchRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Full response text.
    pub output_text: String,
    pub segments: Vec<ResponseSegment>,
}

impl SearchResponse {
    /// Build a response whose whole text is a single uncited segment.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            segments: vec![ResponseSegment {
                text: text.clone(),
                annotations: Vec::new(),
            }],
            output_text: text,
        }
    }
}

/// A tool-less reasoning request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
}

/// External services the pipeline calls.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run a search-augmented research prompt.
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse>;

    /// Run a plain reasoning prompt and return the raw response text.
    async fn reason(&self, request: ReasoningRequest) -> Result<String>;
}
