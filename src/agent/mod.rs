//! Research pipeline orchestration.
//!
//! A run fans a research call out to every target, reconciles the raw results
//! in one synthesis call (or the deterministic fallback), and assembles the
//! report. The whole run is bounded by a total timeout; when it fires, the
//! report is built from whatever research had finished.

mod assemble;
mod citations;
mod config;
mod events;
mod fallback;
mod fanout;
mod limiter;
mod prompt;
mod researcher;
mod retry;
mod synthesizer;

pub use assemble::{assemble, assemble_at};
pub use citations::extract_news_links;
pub use config::ResearchConfig;
pub use events::{EventCallback, PipelineCallbacks, PipelineEvent, PipelineStage};
pub use fallback::fallback_synthesize;
pub use fanout::{run_research, FanOutContext, ResearchSlots, Slot};
pub use limiter::{ConcurrencyLimiter, LimiterPermit};
pub use researcher::research;
pub use retry::{with_retry, RetryPolicy};
pub use synthesizer::synthesize;

use crate::backend::{OpenAiBackend, ResearchBackend};
use crate::error::{Error, Result};
use crate::types::{RawBatch, ResearchInput, ResearchOutput, ResearchTarget, StructuredAnalysis};
use events::verbose_callbacks;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{info, warn};

/// Runs the research pipeline against a backend.
///
/// The agent itself is immutable during a run, so one agent can serve many
/// concurrent runs; each run gets its own limiter unless a shared one is set.
pub struct ResearchAgent {
    backend: Arc<dyn ResearchBackend>,
    config: ResearchConfig,
    /// Callbacks for observability
    callbacks: PipelineCallbacks,
    shared_limiter: Option<ConcurrencyLimiter>,
}

impl ResearchAgent {
    /// Create a new agent over the given backend.
    pub fn new(backend: Arc<dyn ResearchBackend>, config: ResearchConfig) -> Self {
        Self {
            backend,
            config,
            callbacks: PipelineCallbacks::default(),
            shared_limiter: None,
        }
    }

    /// Create an agent over the OpenAI backend, configured from the environment.
    pub fn from_env() -> Result<Self> {
        let backend = OpenAiBackend::from_env()?;
        Ok(Self::new(Arc::new(backend), ResearchConfig::from_env()?))
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Draw research slots from `limiter` instead of a per-run limiter.
    ///
    /// Runs sharing a limiter compete for the same slots.
    pub fn with_shared_limiter(mut self, limiter: ConcurrencyLimiter) -> Self {
        self.shared_limiter = Some(limiter);
        self
    }

    // =========================================================================
    // Builder methods for callbacks
    // =========================================================================

    /// Log every pipeline event through `tracing`.
    pub fn verbose(mut self, enabled: bool) -> Self {
        if enabled {
            self.callbacks = verbose_callbacks();
        }
        self
    }

    /// Set a callback for stage transitions.
    pub fn on_stage_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_stage_change = Some(Arc::new(f));
        self
    }

    /// Set a callback for targets reaching a terminal state.
    pub fn on_research_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_research_complete = Some(Arc::new(f));
        self
    }

    /// Set a callback for synthesis fallbacks.
    pub fn on_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_fallback = Some(Arc::new(f));
        self
    }

    /// Set a catch-all callback for any event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_event = Some(Arc::new(f));
        self
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Research a batch and return the report.
    ///
    /// Fails only on invalid input, before any backend call. Every other
    /// failure is folded into a degraded but complete report.
    pub async fn run(&self, input: &ResearchInput) -> Result<ResearchOutput> {
        let (main, subs) = input.targets();
        self.run_targets(main.as_ref(), &subs).await
    }

    /// Research pre-built targets and return the report.
    pub async fn run_targets(
        &self,
        main: Option<&ResearchTarget>,
        subs: &[ResearchTarget],
    ) -> Result<ResearchOutput> {
        validate_targets(main, subs)?;

        let started = Instant::now();
        let stage = StageTracker::new(&self.callbacks);
        let limiter = self
            .shared_limiter
            .clone()
            .unwrap_or_else(|| ConcurrencyLimiter::new(self.config.max_concurrent_research));
        let slots = ResearchSlots::new(subs.len());
        let ctx = FanOutContext {
            backend: self.backend.as_ref(),
            config: &self.config,
            limiter: &limiter,
            slots: &slots,
            callbacks: &self.callbacks,
        };

        info!(
            main = main.is_some(),
            sub_events = subs.len(),
            backend = self.backend.name(),
            "starting research pipeline"
        );

        let pipeline = async {
            stage.advance(PipelineStage::FanningOut);
            let raw = run_research(ctx, main, subs).await;
            stage.advance(PipelineStage::Synthesizing);
            let analysis = self.synthesize_or_fallback(main, subs, &raw).await;
            (raw, analysis)
        };

        let (raw, analysis) = match tokio::time::timeout(self.config.total_timeout, pipeline).await
        {
            Ok(finished) => finished,
            Err(_) => {
                let during = stage.current();
                let elapsed = started.elapsed();
                warn!(stage = %during, ?elapsed, "research pipeline timed out");
                self.callbacks.emit(&PipelineEvent::TimedOut {
                    stage: during,
                    elapsed,
                });
                stage.advance(PipelineStage::TimedOut);

                let raw = slots.snapshot(main, subs);
                let mut analysis =
                    fallback_synthesize(main, subs, &raw, "pipeline timeout", &self.config);
                analysis.synthesis = format!(
                    "Research pipeline timed out after {:?} during {}; results may be incomplete. {}",
                    self.config.total_timeout, during, analysis.synthesis
                );
                (raw, analysis)
            }
        };

        stage.advance(PipelineStage::Assembling);
        let output = assemble(&raw, analysis);
        stage.advance(PipelineStage::Done);

        info!(
            elapsed = ?started.elapsed(),
            succeeded = raw.subs.iter().filter(|r| r.succeeded).count(),
            sub_events = raw.subs.len(),
            "research pipeline finished"
        );
        Ok(output)
    }

    async fn synthesize_or_fallback(
        &self,
        main: Option<&ResearchTarget>,
        subs: &[ResearchTarget],
        raw: &RawBatch,
    ) -> StructuredAnalysis {
        let call = synthesize(self.backend.as_ref(), main, subs, raw, &self.config);
        let result = match tokio::time::timeout(self.config.synthesis_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.config.synthesis_timeout)),
        };

        match result {
            Ok(analysis) => analysis,
            Err(e) => {
                let reason = e.to_string();
                warn!(error = %reason, "synthesis failed, using fallback");
                self.callbacks.emit(&PipelineEvent::SynthesisFallback {
                    reason: reason.clone(),
                });
                fallback_synthesize(main, subs, raw, &reason, &self.config)
            }
        }
    }
}

/// Reject batches that cannot be researched at all.
fn validate_targets(main: Option<&ResearchTarget>, subs: &[ResearchTarget]) -> Result<()> {
    if subs.is_empty() {
        return Err(Error::InvalidInput(
            "at least one sub-event is required".to_string(),
        ));
    }
    if let Some(main) = main
        && main.title.trim().is_empty()
    {
        return Err(Error::InvalidInput("main event title is empty".to_string()));
    }
    if let Some(index) = subs.iter().position(|s| s.title.trim().is_empty()) {
        return Err(Error::InvalidInput(format!(
            "sub-event {} has an empty title",
            index
        )));
    }
    Ok(())
}

/// Current stage of one run; every transition is emitted as an event.
struct StageTracker<'a> {
    current: Mutex<PipelineStage>,
    callbacks: &'a PipelineCallbacks,
}

impl<'a> StageTracker<'a> {
    fn new(callbacks: &'a PipelineCallbacks) -> Self {
        Self {
            current: Mutex::new(PipelineStage::Idle),
            callbacks,
        }
    }

    fn current(&self) -> PipelineStage {
        match self.current.lock() {
            Ok(stage) => *stage,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn advance(&self, to: PipelineStage) {
        let from = match self.current.lock() {
            Ok(mut stage) => std::mem::replace(&mut *stage, to),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), to),
        };
        self.callbacks
            .emit(&PipelineEvent::StageChanged { from, to });
    }
}
