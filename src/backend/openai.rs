//! OpenAI Responses API backend.

use super::{
    Annotation, ReasoningRequest, ResearchBackend, ResponseSegment, SearchRequest, SearchResponse,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Default API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Web search tool type understood by the Responses API
const WEB_SEARCH_TOOL: &str = "web_search_preview";

/// Backend that talks to an OpenAI-compatible Responses endpoint.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiBackend {
    /// Create a backend with the given API key and the default base URL.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Create a backend from `OPENAI_API_KEY` and optional `OPENAI_BASE_URL`.
    ///
    /// A `.env` file in the working directory is honored.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let api_key = dotenvy::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".to_string()))?;

        let mut backend = Self::new(api_key);
        if let Ok(base_url) = dotenvy::var("OPENAI_BASE_URL") {
            backend = backend.with_base_url(base_url);
        }
        Ok(backend)
    }

    /// Point the backend at a different OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Use a preconfigured HTTP client (proxies, client-level timeouts, ...).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Resolve the responses endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/responses") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/responses", base)
        } else {
            format!("{}/v1/responses", base)
        }
    }

    async fn post(&self, body: serde_json::Value) -> Result<ResponsesBody> {
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(bytes = text.len(), "responses API call complete");
        parse_responses_body(&text)
    }
}

#[async_trait]
impl ResearchBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let body = serde_json::json!({
            "model": request.model,
            "tools": [{
                "type": WEB_SEARCH_TOOL,
                "search_context_size": request.search_context_size.as_str(),
            }],
            "input": request.prompt,
        });

        Ok(self.post(body).await?.into_search_response())
    }

    async fn reason(&self, request: ReasoningRequest) -> Result<String> {
        let body = serde_json::json!({
            "model": request.model,
            "input": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
        });

        let response = self.post(body).await?.into_search_response();
        if response.output_text.trim().is_empty() {
            return Err(Error::MalformedResponse(
                "reasoning response contained no text".to_string(),
            ));
        }
        Ok(response.output_text)
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    annotations: Vec<WireAnnotation>,
}

#[derive(Debug, Deserialize)]
struct WireAnnotation {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    start_index: Option<usize>,
    #[serde(default)]
    end_index: Option<usize>,
}

impl ResponsesBody {
    /// Flatten `message` items into text segments.
    fn into_search_response(self) -> SearchResponse {
        let segments: Vec<ResponseSegment> = self
            .output
            .into_iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content)
            .filter(|block| block.kind == "output_text")
            .map(|block| ResponseSegment {
                text: block.text,
                annotations: block
                    .annotations
                    .into_iter()
                    .map(|a| Annotation {
                        url: a.url,
                        title: a.title,
                        start_index: a.start_index,
                        end_index: a.end_index,
                    })
                    .collect(),
            })
            .collect();

        let output_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        SearchResponse {
            output_text,
            segments,
        }
    }
}

fn parse_responses_body(text: &str) -> Result<ResponsesBody> {
    serde_json::from_str(text)
        .map_err(|e| Error::MalformedResponse(format!("unexpected responses payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_resolution() {
        let backend = OpenAiBackend::new("k");
        assert_eq!(backend.endpoint(), "https://api.openai.com/v1/responses");

        let backend = OpenAiBackend::new("k").with_base_url("http://localhost:8080/");
        assert_eq!(backend.endpoint(), "http://localhost:8080/v1/responses");

        let backend = OpenAiBackend::new("k").with_base_url("http://proxy/v1/responses");
        assert_eq!(backend.endpoint(), "http://proxy/v1/responses");
    }

    #[test]
    fn test_parse_message_with_citations() {
        let body = r#"{
            "output": [
                {"type": "web_search_call", "id": "ws_1", "status": "completed"},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Talks stalled [Reuters].", "annotations": [
                        {"type": "url_citation", "start_index": 0, "end_index": 13,
                         "url": "https://reuters.com/a", "title": "Talks stall"}
                    ]}
                ]}
            ]
        }"#;

        let response = parse_responses_body(body).unwrap().into_search_response();
        assert_eq!(response.output_text, "Talks stalled [Reuters].");
        assert_eq!(response.segments.len(), 1);

        let annotation = &response.segments[0].annotations[0];
        assert_eq!(annotation.url.as_deref(), Some("https://reuters.com/a"));
        assert_eq!(annotation.end_index, Some(13));
    }

    #[test]
    fn test_parse_skips_non_message_items() {
        let body = r#"{"output": [{"type": "reasoning", "summary": []}]}"#;
        let response = parse_responses_body(body).unwrap().into_search_response();
        assert!(response.output_text.is_empty());
        assert!(response.segments.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_responses_body("<html>502</html>").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }
}
