//! Bounded retry with a fixed delay and a per-attempt timeout.

use super::config::ResearchConfig;
use super::events::{PipelineCallbacks, PipelineEvent};
use crate::types::{RawResearchResult, ResearchRole, ResearchTarget};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy for one research call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Bound on each individual attempt
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            timeout: config.research_timeout,
        }
    }

    /// Total attempts the policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Run a research call until it succeeds or the policy is exhausted.
///
/// `call_factory` is invoked once per attempt so no state leaks from a
/// timed-out attempt into the next one. Failures never propagate: the last
/// failed result is returned with `succeeded = false`.
pub async fn with_retry<F, Fut>(
    target: &ResearchTarget,
    role: ResearchRole,
    policy: &RetryPolicy,
    callbacks: &PipelineCallbacks,
    mut call_factory: F,
) -> RawResearchResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RawResearchResult>,
{
    let max_attempts = policy.max_attempts();
    let mut last_failure = None;

    for attempt in 1..=max_attempts {
        callbacks.emit(&PipelineEvent::ResearchAttempt {
            target_id: target.id.clone(),
            attempt,
            max_attempts,
        });

        let result = match tokio::time::timeout(policy.timeout, call_factory()).await {
            Ok(result) => result,
            Err(_) => RawResearchResult::failure(
                target,
                role,
                format!("Research timed out after {:?}", policy.timeout),
            ),
        };

        if result.succeeded {
            return result;
        }

        if attempt < max_attempts {
            warn!(
                target = %target.id,
                attempt,
                max_attempts,
                error = result.error_message(),
                "research attempt failed, retrying"
            );
            callbacks.emit(&PipelineEvent::ResearchRetry {
                target_id: target.id.clone(),
                attempt,
                error: result.error_message().to_string(),
            });
            tokio::time::sleep(policy.retry_delay).await;
        }
        last_failure = Some(result);
    }

    last_failure.unwrap_or_else(|| RawResearchResult::failure(target, role, "no research attempts made"))
}
