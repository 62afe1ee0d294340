//! A single research call for a single target.

use super::citations::extract_news_links;
use super::config::ResearchConfig;
use super::prompt::research_prompt;
use crate::backend::{ResearchBackend, SearchRequest};
use crate::error::{Error, Result};
use crate::types::{RawResearchResult, ResearchRole, ResearchTarget};
use tracing::{debug, warn};

/// Research one target with the search-augmented backend.
///
/// Always returns a result: every failure is recorded as `succeeded = false`
/// with the error message. The per-attempt timeout is applied by the caller
/// (see [`super::retry::with_retry`]).
pub async fn research(
    backend: &dyn ResearchBackend,
    target: &ResearchTarget,
    role: ResearchRole,
    config: &ResearchConfig,
) -> RawResearchResult {
    match try_research(backend, target, role, config).await {
        Ok(result) => result,
        Err(e) => {
            warn!(target = %target.id, error = %e, "research call failed");
            RawResearchResult::failure(target, role, format!("Research failed: {}", e))
        }
    }
}

async fn try_research(
    backend: &dyn ResearchBackend,
    target: &ResearchTarget,
    role: ResearchRole,
    config: &ResearchConfig,
) -> Result<RawResearchResult> {
    if target.title.trim().is_empty() {
        return Err(Error::InvalidInput(format!(
            "target '{}' has an empty title",
            target.id
        )));
    }

    let request = SearchRequest {
        model: config.model.clone(),
        prompt: research_prompt(target, role),
        search_context_size: config.search_context_size,
    };

    let response = backend.search(request).await?;

    let size = response.output_text.chars().count();
    if size > config.max_response_chars {
        return Err(Error::ResponseTooLarge {
            size,
            limit: config.max_response_chars,
        });
    }
    if response.output_text.trim().is_empty() {
        return Err(Error::MalformedResponse(
            "search response contained no text".to_string(),
        ));
    }

    let links = extract_news_links(&response, config.max_news_links_per_event);
    debug!(
        target = %target.id,
        backend = backend.name(),
        chars = size,
        links = links.len(),
        "research call complete"
    );

    Ok(RawResearchResult::success(
        target,
        role,
        response.output_text,
        links,
    ))
}
