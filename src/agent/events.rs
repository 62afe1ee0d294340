//! Pipeline events and callbacks for observability.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Stage of a single pipeline run.
///
/// `Idle → FanningOut → Synthesizing → Assembling → Done`, with `TimedOut`
/// reachable from `FanningOut` or `Synthesizing`, after which the run goes
/// straight to a degraded `Assembling → Done`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineStage {
    #[default]
    Idle,
    FanningOut,
    Synthesizing,
    Assembling,
    Done,
    TimedOut,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::FanningOut => "fanning_out",
            PipelineStage::Synthesizing => "synthesizing",
            PipelineStage::Assembling => "assembling",
            PipelineStage::Done => "done",
            PipelineStage::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted during a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The run moved to a new stage
    StageChanged {
        from: PipelineStage,
        to: PipelineStage,
    },
    /// A research attempt is starting
    ResearchAttempt {
        target_id: String,
        attempt: u32,
        max_attempts: u32,
    },
    /// A research attempt failed and will be retried
    ResearchRetry {
        target_id: String,
        attempt: u32,
        error: String,
    },
    /// A target reached a terminal state
    ResearchCompleted {
        target_id: String,
        succeeded: bool,
        links: usize,
    },
    /// Model synthesis failed; the deterministic fallback is used instead
    SynthesisFallback { reason: String },
    /// The total timeout fired
    TimedOut {
        stage: PipelineStage,
        elapsed: Duration,
    },
}

/// Type alias for event callbacks
pub type EventCallback = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Storage for pipeline callbacks
#[derive(Default, Clone)]
pub struct PipelineCallbacks {
    pub on_stage_change: Option<EventCallback>,
    pub on_research_complete: Option<EventCallback>,
    pub on_fallback: Option<EventCallback>,
    /// Catch-all callback for any event
    pub on_event: Option<EventCallback>,
}

impl PipelineCallbacks {
    /// Emit an event to the appropriate callback(s)
    pub fn emit(&self, event: &PipelineEvent) {
        let specific = match event {
            PipelineEvent::StageChanged { .. } => self.on_stage_change.as_ref(),
            PipelineEvent::ResearchCompleted { .. } => self.on_research_complete.as_ref(),
            PipelineEvent::SynthesisFallback { .. } => self.on_fallback.as_ref(),
            PipelineEvent::ResearchAttempt { .. }
            | PipelineEvent::ResearchRetry { .. }
            | PipelineEvent::TimedOut { .. } => None,
        };

        if let Some(cb) = specific {
            cb(event);
        }

        if let Some(cb) = &self.on_event {
            cb(event);
        }
    }
}

/// Callbacks that log every event through `tracing` at info/warn level.
pub fn verbose_callbacks() -> PipelineCallbacks {
    PipelineCallbacks {
        on_event: Some(Arc::new(|e| match e {
            PipelineEvent::StageChanged { from, to } => {
                info!(%from, %to, "pipeline stage");
            }
            PipelineEvent::ResearchAttempt {
                target_id,
                attempt,
                max_attempts,
            } => {
                info!(target = %target_id, attempt, max_attempts, "research attempt");
            }
            PipelineEvent::ResearchRetry {
                target_id,
                attempt,
                error,
            } => {
                warn!(target = %target_id, attempt, %error, "research retry");
            }
            PipelineEvent::ResearchCompleted {
                target_id,
                succeeded,
                links,
            } => {
                info!(target = %target_id, succeeded, links, "research complete");
            }
            PipelineEvent::SynthesisFallback { reason } => {
                warn!(%reason, "synthesis fallback");
            }
            PipelineEvent::TimedOut { stage, elapsed } => {
                warn!(%stage, ?elapsed, "pipeline timed out");
            }
        })),
        ..Default::default()
    }
}
