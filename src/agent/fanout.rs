//! Fan-out/fan-in over every research target.

use super::config::ResearchConfig;
use super::events::{PipelineCallbacks, PipelineEvent};
use super::limiter::ConcurrencyLimiter;
use super::researcher::research;
use super::retry::{with_retry, RetryPolicy};
use crate::backend::ResearchBackend;
use crate::types::{RawBatch, RawResearchResult, ResearchRole, ResearchTarget};
use futures::future::{join, join_all, OptionFuture};
use std::sync::Mutex;
use tracing::info;

/// Message recorded for targets that never reached a terminal state.
pub const INCOMPLETE_RESEARCH: &str = "research did not complete before the pipeline timeout";

/// Which slot a task owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Main,
    Sub(usize),
}

/// Write-once result cells, one per target.
///
/// Each fan-out task writes only its own slot, so a caller that gives up
/// early (the total timeout) can still read whatever finished.
#[derive(Debug)]
pub struct ResearchSlots {
    main: Mutex<Option<RawResearchResult>>,
    subs: Vec<Mutex<Option<RawResearchResult>>>,
}

impl ResearchSlots {
    pub fn new(sub_count: usize) -> Self {
        Self {
            main: Mutex::new(None),
            subs: (0..sub_count).map(|_| Mutex::new(None)).collect(),
        }
    }

    fn cell(&self, slot: Slot) -> Option<&Mutex<Option<RawResearchResult>>> {
        match slot {
            Slot::Main => Some(&self.main),
            Slot::Sub(index) => self.subs.get(index),
        }
    }

    /// Store a terminal result; a slot keeps its first value.
    pub fn store(&self, slot: Slot, result: RawResearchResult) {
        if let Some(cell) = self.cell(slot)
            && let Ok(mut value) = cell.lock()
            && value.is_none()
        {
            *value = Some(result);
        }
    }

    fn read(&self, slot: Slot) -> Option<RawResearchResult> {
        let cell = self.cell(slot)?;
        match cell.lock() {
            Ok(value) => value.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Completed results, with failures standing in for unfinished targets.
    pub fn snapshot(&self, main: Option<&ResearchTarget>, subs: &[ResearchTarget]) -> RawBatch {
        RawBatch {
            main: main.map(|target| {
                self.read(Slot::Main).unwrap_or_else(|| {
                    RawResearchResult::failure(target, ResearchRole::Main, INCOMPLETE_RESEARCH)
                })
            }),
            subs: subs
                .iter()
                .enumerate()
                .map(|(index, target)| {
                    self.read(Slot::Sub(index)).unwrap_or_else(|| {
                        RawResearchResult::failure(target, ResearchRole::Sub, INCOMPLETE_RESEARCH)
                    })
                })
                .collect(),
        }
    }
}

/// Shared, read-only inputs of every fan-out task.
#[derive(Clone, Copy)]
pub struct FanOutContext<'a> {
    pub backend: &'a dyn ResearchBackend,
    pub config: &'a ResearchConfig,
    pub limiter: &'a ConcurrencyLimiter,
    pub slots: &'a ResearchSlots,
    pub callbacks: &'a PipelineCallbacks,
}

/// Research the main event (if any) and every sub-event concurrently.
///
/// Waits for every target to reach a terminal state; `subs` come back in
/// input order regardless of completion order.
pub async fn run_research(
    ctx: FanOutContext<'_>,
    main: Option<&ResearchTarget>,
    subs: &[ResearchTarget],
) -> RawBatch {
    let policy = RetryPolicy::from_config(ctx.config);

    let main_task: OptionFuture<_> = main
        .map(|target| research_target(ctx, &policy, target, ResearchRole::Main, Slot::Main))
        .into();
    let sub_tasks = subs.iter().enumerate().map(|(index, target)| {
        research_target(ctx, &policy, target, ResearchRole::Sub, Slot::Sub(index))
    });

    let (main, subs) = join(main_task, join_all(sub_tasks)).await;
    RawBatch { main, subs }
}

async fn research_target(
    ctx: FanOutContext<'_>,
    policy: &RetryPolicy,
    target: &ResearchTarget,
    role: ResearchRole,
    slot: Slot,
) -> RawResearchResult {
    let result = match ctx.limiter.acquire().await {
        Ok(_permit) => {
            with_retry(target, role, policy, ctx.callbacks, || {
                research(ctx.backend, target, role, ctx.config)
            })
            .await
        }
        Err(_) => RawResearchResult::failure(target, role, "concurrency limiter closed"),
    };

    info!(
        target = %target.id,
        succeeded = result.succeeded,
        links = result.links.len(),
        "research target finished"
    );
    ctx.callbacks.emit(&PipelineEvent::ResearchCompleted {
        target_id: target.id.clone(),
        succeeded: result.succeeded,
        links: result.links.len(),
    });
    ctx.slots.store(slot, result.clone());
    result
}
