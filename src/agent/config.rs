//! Research pipeline configuration.

use crate::backend::SearchContextSize;
use crate::error::{Error, Result};
use std::time::Duration;

/// Configuration for the research pipeline.
///
/// Constructed by the caller and passed by value; nothing here is global, so
/// concurrent runs with different configs are independent.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchConfig {
    /// The model to use for both research and synthesis
    pub model: String,
    /// How much web context the search tool pulls in
    pub search_context_size: SearchContextSize,
    /// Timeout for a single research attempt
    pub research_timeout: Duration,
    /// Timeout for the synthesis call
    pub synthesis_timeout: Duration,
    /// Hard ceiling for the whole pipeline
    pub total_timeout: Duration,
    /// Maximum research calls in flight at once
    pub max_concurrent_research: usize,
    /// Additional attempts after a failed research call
    pub max_retries: u32,
    /// Fixed delay between research attempts
    pub retry_delay: Duration,
    /// Links kept per target
    pub max_news_links_per_event: usize,
    /// Key findings kept per target
    pub max_key_findings_per_event: usize,
    /// Characters of raw text used when it stands in for a summary
    pub summary_char_limit: usize,
    /// Research responses longer than this are treated as failures
    pub max_response_chars: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5.1".to_string(),
            search_context_size: SearchContextSize::High,
            research_timeout: Duration::from_secs(90),
            synthesis_timeout: Duration::from_secs(60),
            total_timeout: Duration::from_secs(180),
            max_concurrent_research: 10,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            max_news_links_per_event: 8,
            max_key_findings_per_event: 7,
            summary_char_limit: 3000,
            max_response_chars: 200_000,
        }
    }
}

impl ResearchConfig {
    /// Create a new config with the specified model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Defaults overlaid with `AUGUR_*` environment variables.
    ///
    /// Recognized: `AUGUR_MODEL`, `AUGUR_SEARCH_CONTEXT_SIZE`,
    /// `AUGUR_RESEARCH_TIMEOUT_SECS`, `AUGUR_SYNTHESIS_TIMEOUT_SECS`,
    /// `AUGUR_TOTAL_TIMEOUT_SECS`, `AUGUR_MAX_CONCURRENT`, `AUGUR_MAX_RETRIES`,
    /// `AUGUR_RETRY_DELAY_MS`. A `.env` file in the working directory is honored.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary key lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(model) = lookup("AUGUR_MODEL") {
            config.model = model;
        }
        if let Some(size) = lookup("AUGUR_SEARCH_CONTEXT_SIZE") {
            config.search_context_size = SearchContextSize::parse(&size).ok_or_else(|| {
                Error::Config(format!("AUGUR_SEARCH_CONTEXT_SIZE: unknown size '{}'", size))
            })?;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AUGUR_RESEARCH_TIMEOUT_SECS")? {
            config.research_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AUGUR_SYNTHESIS_TIMEOUT_SECS")? {
            config.synthesis_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AUGUR_TOTAL_TIMEOUT_SECS")? {
            config.total_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var(&lookup, "AUGUR_MAX_CONCURRENT")? {
            config.max_concurrent_research = n;
        }
        if let Some(n) = parse_var(&lookup, "AUGUR_MAX_RETRIES")? {
            config.max_retries = n;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "AUGUR_RETRY_DELAY_MS")? {
            config.retry_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Set the search context size.
    pub fn search_context_size(mut self, size: SearchContextSize) -> Self {
        self.search_context_size = size;
        self
    }

    /// Set the per-attempt research timeout.
    pub fn research_timeout(mut self, timeout: Duration) -> Self {
        self.research_timeout = timeout;
        self
    }

    /// Set the synthesis timeout.
    pub fn synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.synthesis_timeout = timeout;
        self
    }

    /// Set the total pipeline timeout.
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = timeout;
        self
    }

    /// Set the maximum number of concurrent research calls.
    pub fn max_concurrent_research(mut self, n: usize) -> Self {
        self.max_concurrent_research = n;
        self
    }

    /// Set the number of retries per research call.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set the delay between retries.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the number of links kept per target.
    pub fn max_news_links_per_event(mut self, n: usize) -> Self {
        self.max_news_links_per_event = n;
        self
    }

    /// Set the number of key findings kept per target.
    pub fn max_key_findings_per_event(mut self, n: usize) -> Self {
        self.max_key_findings_per_event = n;
        self
    }

    /// Set how much raw text may stand in for a summary.
    pub fn summary_char_limit(mut self, n: usize) -> Self {
        self.summary_char_limit = n;
        self
    }

    /// Set the maximum accepted research response size.
    pub fn max_response_chars(mut self, n: usize) -> Self {
        self.max_response_chars = n;
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", key, e))),
        None => Ok(None),
    }
}
