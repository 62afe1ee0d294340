//! Scripted backend used by the unit tests.

use crate::backend::{ReasoningRequest, ResearchBackend, SearchRequest, SearchResponse};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a scripted search call does.
#[derive(Debug, Clone)]
pub(crate) enum SearchBehavior {
    Respond(SearchResponse),
    Fail(String),
    /// Fail the first `n` calls, then respond
    FailTimes(usize, SearchResponse),
    Delay(Duration, Box<SearchBehavior>),
    /// Never complete
    Hang,
}

impl SearchBehavior {
    pub(crate) fn text(text: &str) -> Self {
        SearchBehavior::Respond(SearchResponse::from_text(text))
    }

    pub(crate) fn delayed(delay: Duration, then: SearchBehavior) -> Self {
        SearchBehavior::Delay(delay, Box::new(then))
    }
}

/// What the scripted reasoning call does.
#[derive(Debug, Clone)]
pub(crate) enum ReasonBehavior {
    Respond(String),
    Fail(String),
    Delay(Duration, Box<ReasonBehavior>),
}

struct SearchRule {
    pattern: String,
    behavior: SearchBehavior,
    calls: AtomicUsize,
}

/// Backend that answers from a script and counts calls.
///
/// Search prompts are matched against rule patterns by substring, first match
/// wins; unmatched prompts fail.
pub(crate) struct MockBackend {
    search_rules: Vec<SearchRule>,
    reason_behavior: ReasonBehavior,
    search_calls: AtomicUsize,
    reason_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            search_rules: Vec::new(),
            reason_behavior: ReasonBehavior::Fail("no reasoning scripted".to_string()),
            search_calls: AtomicUsize::new(0),
            reason_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn on_search(mut self, pattern: &str, behavior: SearchBehavior) -> Self {
        self.search_rules.push(SearchRule {
            pattern: pattern.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
        });
        self
    }

    pub(crate) fn on_reason(mut self, behavior: ReasonBehavior) -> Self {
        self.reason_behavior = behavior;
        self
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Search calls whose prompt matched `pattern`'s rule.
    pub(crate) fn calls_matching(&self, pattern: &str) -> usize {
        self.search_rules
            .iter()
            .find(|r| r.pattern == pattern)
            .map(|r| r.calls.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub(crate) fn reason_calls(&self) -> usize {
        self.reason_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }
}

#[async_trait]
impl ResearchBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter();

        let Some(rule) = self
            .search_rules
            .iter()
            .find(|r| request.prompt.contains(&r.pattern))
        else {
            return Err(Error::MalformedResponse("no scripted search response".to_string()));
        };
        let call_index = rule.calls.fetch_add(1, Ordering::SeqCst);

        let mut behavior = &rule.behavior;
        loop {
            match behavior {
                SearchBehavior::Respond(response) => return Ok(response.clone()),
                SearchBehavior::Fail(message) => {
                    return Err(Error::Api {
                        status: 500,
                        body: message.clone(),
                    });
                }
                SearchBehavior::FailTimes(n, response) => {
                    if call_index < *n {
                        return Err(Error::Api {
                            status: 500,
                            body: format!("scripted failure {}", call_index + 1),
                        });
                    }
                    return Ok(response.clone());
                }
                SearchBehavior::Delay(delay, next) => {
                    tokio::time::sleep(*delay).await;
                    behavior = next.as_ref();
                }
                SearchBehavior::Hang => std::future::pending::<()>().await,
            }
        }
    }

    async fn reason(&self, _request: ReasoningRequest) -> Result<String> {
        self.reason_calls.fetch_add(1, Ordering::SeqCst);

        let mut behavior = &self.reason_behavior;
        loop {
            match behavior {
                ReasonBehavior::Respond(text) => return Ok(text.clone()),
                ReasonBehavior::Fail(message) => {
                    return Err(Error::Api {
                        status: 500,
                        body: message.clone(),
                    });
                }
                ReasonBehavior::Delay(delay, next) => {
                    tokio::time::sleep(*delay).await;
                    behavior = next.as_ref();
                }
            }
        }
    }
}

/// Route `tracing` output to the test harness; safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
