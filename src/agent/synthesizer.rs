//! Model-backed synthesis of the raw research into a structured analysis.

use super::config::ResearchConfig;
use super::fallback::{templated_relationship, unavailable_analysis};
use super::prompt::{synthesis_prompt, SYNTHESIS_SYSTEM};
use crate::backend::{ReasoningRequest, ResearchBackend};
use crate::error::{Error, Result};
use crate::types::{
    EventAnalysis, RawBatch, Relationship, ResearchTarget, Sentiment, StructuredAnalysis,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::LazyLock;
use tracing::debug;

/// A whole response wrapped in a markdown code fence
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[a-zA-Z]*\s*\n?([\s\S]*?)\n?\s*```$").unwrap());

#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    #[serde(default)]
    main_event_research: Option<AnalysisBody>,
    sub_event_analyses: Vec<SubAnalysis>,
    #[serde(default)]
    relationships: Option<Vec<RelationshipBody>>,
    synthesis: String,
}

#[derive(Debug, Deserialize)]
struct AnalysisBody {
    summary: String,
    key_findings: Vec<String>,
    sentiment: Sentiment,
    sentiment_rationale: String,
}

#[derive(Debug, Deserialize)]
struct SubAnalysis {
    sub_event_id: String,
    #[serde(flatten)]
    body: AnalysisBody,
}

#[derive(Debug, Deserialize)]
struct RelationshipBody {
    sub_event_id: String,
    relationship_summary: String,
    influencing_news: String,
}

/// Run the synthesis call and validate what comes back.
///
/// Any problem with the response (unparseable JSON, a schema violation, a
/// sub-event left out) is an error; callers fall back rather than coerce.
pub async fn synthesize(
    backend: &dyn ResearchBackend,
    main: Option<&ResearchTarget>,
    subs: &[ResearchTarget],
    raw: &RawBatch,
    config: &ResearchConfig,
) -> Result<StructuredAnalysis> {
    let request = ReasoningRequest {
        model: config.model.clone(),
        system: SYNTHESIS_SYSTEM.to_string(),
        prompt: synthesis_prompt(main, subs, raw),
    };

    let text = backend.reason(request).await?;
    debug!(backend = backend.name(), chars = text.len(), "synthesis response received");

    let analysis = parse_analysis(&text, main, subs, config)?;
    Ok(degrade_failed_targets(analysis, main, subs, raw))
}

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    CODE_FENCE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed)
}

fn response_schema(with_main: bool) -> Value {
    let sentiments: Vec<&str> = Sentiment::ALL.iter().map(Sentiment::as_str).collect();
    let analysis = json!({
        "type": "object",
        "required": ["summary", "key_findings", "sentiment", "sentiment_rationale"],
        "properties": {
            "summary": {"type": "string"},
            "key_findings": {"type": "array", "items": {"type": "string"}},
            "sentiment": {"enum": sentiments},
            "sentiment_rationale": {"type": "string"}
        }
    });
    let mut sub_analysis = analysis.clone();
    sub_analysis["required"] = json!([
        "sub_event_id",
        "summary",
        "key_findings",
        "sentiment",
        "sentiment_rationale"
    ]);
    sub_analysis["properties"]["sub_event_id"] = json!({"type": "string"});

    let mut schema = json!({
        "type": "object",
        "required": ["sub_event_analyses", "synthesis"],
        "properties": {
            "sub_event_analyses": {"type": "array", "items": sub_analysis},
            "synthesis": {"type": "string"}
        }
    });

    if with_main {
        schema["required"] = json!([
            "main_event_research",
            "sub_event_analyses",
            "relationships",
            "synthesis"
        ]);
        schema["properties"]["main_event_research"] = analysis;
        schema["properties"]["relationships"] = json!({
            "type": "array",
            "items": {
                "type": "object",
                "required": ["sub_event_id", "relationship_summary", "influencing_news"],
                "properties": {
                    "sub_event_id": {"type": "string"},
                    "relationship_summary": {"type": "string"},
                    "influencing_news": {"type": "string"}
                }
            }
        });
    }
    schema
}

fn validate(instance: &Value, with_main: bool) -> Result<()> {
    let schema = response_schema(with_main);
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| Error::Schema(format!("invalid synthesis schema: {}", e)))?;

    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Schema(errors.join("; ")))
    }
}

/// Parse and validate a raw synthesis response.
///
/// The result follows submission order and uses the submitted titles, not
/// whatever order or wording the model chose. Entries sharing an id are
/// matched in the order the model returned them.
fn parse_analysis(
    text: &str,
    main: Option<&ResearchTarget>,
    subs: &[ResearchTarget],
    config: &ResearchConfig,
) -> Result<StructuredAnalysis> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| Error::MalformedResponse(format!("synthesis is not valid JSON: {}", e)))?;
    validate(&value, main.is_some())?;
    let mut response: SynthesisResponse = serde_json::from_value(value)?;

    let cap = config.max_key_findings_per_event;
    let into_analysis = |target: &ResearchTarget, mut body: AnalysisBody| {
        body.key_findings.truncate(cap);
        EventAnalysis {
            target_id: target.id.clone(),
            title: target.title.clone(),
            summary: body.summary,
            key_findings: body.key_findings,
            sentiment: body.sentiment,
            sentiment_rationale: body.sentiment_rationale,
        }
    };

    let mut sub_events = Vec::with_capacity(subs.len());
    for target in subs {
        let position = response
            .sub_event_analyses
            .iter()
            .position(|a| a.sub_event_id == target.id)
            .ok_or_else(|| {
                Error::Schema(format!("no analysis for sub-event '{}'", target.id))
            })?;
        let analysis = response.sub_event_analyses.remove(position);
        sub_events.push(into_analysis(target, analysis.body));
    }

    let (main_event, relationships) = match main {
        Some(main) => {
            let body = response.main_event_research.take().ok_or_else(|| {
                Error::Schema("missing main_event_research".to_string())
            })?;
            let mut returned = response.relationships.take().unwrap_or_default();
            let mut relationships = Vec::with_capacity(subs.len());
            for target in subs {
                let position = returned
                    .iter()
                    .position(|r| r.sub_event_id == target.id)
                    .ok_or_else(|| {
                        Error::Schema(format!("no relationship for sub-event '{}'", target.id))
                    })?;
                let body = returned.remove(position);
                relationships.push(Relationship {
                    sub_event_id: target.id.clone(),
                    sub_event_title: target.title.clone(),
                    relationship_summary: body.relationship_summary,
                    influencing_news: body.influencing_news,
                });
            }
            (Some(into_analysis(main, body)), Some(relationships))
        }
        None => (None, None),
    };

    Ok(StructuredAnalysis {
        main_event,
        sub_events,
        relationships,
        synthesis: response.synthesis,
    })
}

/// Replace model text for targets whose own research failed.
///
/// Relationships degrade per sub-event: a failed sub-event or a failed main
/// event leaves nothing to relate.
fn degrade_failed_targets(
    mut analysis: StructuredAnalysis,
    main: Option<&ResearchTarget>,
    subs: &[ResearchTarget],
    raw: &RawBatch,
) -> StructuredAnalysis {
    let main_failed = main.is_some() && !raw.main_usable();

    if let (Some(target), true) = (main, main_failed) {
        analysis.main_event = Some(unavailable_analysis(target, raw.main.as_ref()));
    }

    for (i, (target, entry)) in subs.iter().zip(analysis.sub_events.iter_mut()).enumerate() {
        let result = raw.sub(i);
        let sub_failed = result.and_then(|r| r.usable_text()).is_none();
        if sub_failed {
            *entry = unavailable_analysis(target, result);
        }

        if let (Some(main), Some(relationships)) = (main, analysis.relationships.as_mut())
            && (sub_failed || main_failed)
            && let Some(relationship) = relationships.get_mut(i)
        {
            *relationship = templated_relationship(main, target);
        }
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBackend, ReasonBehavior};
    use crate::types::{RawResearchResult, ResearchRole};

    fn targets() -> (ResearchTarget, Vec<ResearchTarget>) {
        (
            ResearchTarget::main("US strikes Iran by...?"),
            vec![ResearchTarget::new("Khamenei out by 2026?")],
        )
    }

    fn all_succeeded(main: &ResearchTarget, subs: &[ResearchTarget]) -> RawBatch {
        RawBatch {
            main: Some(RawResearchResult::success(main, ResearchRole::Main, "main text".into(), vec![])),
            subs: subs
                .iter()
                .map(|t| RawResearchResult::success(t, ResearchRole::Sub, "sub text".into(), vec![]))
                .collect(),
        }
    }

    fn main_response(findings: usize) -> String {
        let findings: Vec<String> = (1..=findings).map(|i| format!("finding {}", i)).collect();
        json!({
            "main_event_research": {
                "summary": "Escalation risk is elevated.",
                "key_findings": findings,
                "sentiment": "bullish",
                "sentiment_rationale": "Recent strikes."
            },
            "sub_event_analyses": [{
                "sub_event_id": "khamenei-out-by-2026",
                "sub_event_title": "whatever the model says",
                "summary": "Leadership appears stable.",
                "key_findings": ["No succession signals"],
                "sentiment": "bearish",
                "sentiment_rationale": "No evidence of change."
            }],
            "relationships": [{
                "sub_event_id": "khamenei-out-by-2026",
                "sub_event_title": "x",
                "relationship_summary": "Leadership change would reshape escalation.",
                "influencing_news": "Succession rumours."
            }],
            "synthesis": "Overall, tension is high."
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_synthesize_happy_path() {
        let (main, subs) = targets();
        let backend = MockBackend::new()
            .on_reason(ReasonBehavior::Respond(format!("```json\n{}\n```", main_response(2))));

        let analysis = synthesize(
            &backend,
            Some(&main),
            &subs,
            &all_succeeded(&main, &subs),
            &ResearchConfig::default(),
        )
        .await
        .unwrap();

        let main_analysis = analysis.main_event.unwrap();
        assert_eq!(main_analysis.sentiment, Sentiment::Bullish);
        assert_eq!(main_analysis.target_id, "main");
        assert_eq!(analysis.sub_events[0].title, "Khamenei out by 2026?");
        assert_eq!(analysis.sub_events[0].sentiment, Sentiment::Bearish);
        let relationships = analysis.relationships.unwrap();
        assert_eq!(relationships[0].sub_event_title, "Khamenei out by 2026?");
        assert_eq!(backend.reason_calls(), 1);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_findings_capped() {
        let (main, subs) = targets();
        let config = ResearchConfig::default().max_key_findings_per_event(3);

        let analysis = parse_analysis(&main_response(10), Some(&main), &subs, &config).unwrap();

        assert_eq!(analysis.main_event.unwrap().key_findings.len(), 3);
    }

    #[test]
    fn test_unknown_sentiment_rejected() {
        let (main, subs) = targets();
        let text = main_response(1).replace("\"bullish\"", "\"sideways\"");

        let err = parse_analysis(&text, Some(&main), &subs, &ResearchConfig::default()).unwrap_err();

        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_missing_relationships_rejected() {
        let (main, subs) = targets();
        let mut value: Value = serde_json::from_str(&main_response(1)).unwrap();
        value.as_object_mut().unwrap().remove("relationships");

        let err = parse_analysis(&value.to_string(), Some(&main), &subs, &ResearchConfig::default())
            .unwrap_err();

        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_missing_sub_event_rejected() {
        let (main, mut subs) = targets();
        subs.push(ResearchTarget::new("Oil above $100?"));

        let err = parse_analysis(&main_response(1), Some(&main), &subs, &ResearchConfig::default())
            .unwrap_err();

        assert!(err.to_string().contains("oil-above-100"));
    }

    #[test]
    fn test_not_json_rejected() {
        let (_, subs) = targets();
        let err = parse_analysis("I cannot help with that.", None, &subs, &ResearchConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn test_without_main_event() {
        let (_, subs) = targets();
        let text = json!({
            "sub_event_analyses": [{
                "sub_event_id": "khamenei-out-by-2026",
                "summary": "s",
                "key_findings": [],
                "sentiment": "neutral",
                "sentiment_rationale": "r"
            }],
            "synthesis": "overall"
        })
        .to_string();

        let analysis = parse_analysis(&text, None, &subs, &ResearchConfig::default()).unwrap();

        assert!(analysis.main_event.is_none());
        assert!(analysis.relationships.is_none());
        assert_eq!(analysis.sub_events.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_sub_event_degraded() {
        let (main, subs) = targets();
        let mut raw = all_succeeded(&main, &subs);
        raw.subs[0] = RawResearchResult::failure(&subs[0], ResearchRole::Sub, "Research failed: 503");
        let backend = MockBackend::new().on_reason(ReasonBehavior::Respond(main_response(1)));

        let analysis = synthesize(&backend, Some(&main), &subs, &raw, &ResearchConfig::default())
            .await
            .unwrap();

        assert_eq!(analysis.main_event.unwrap().sentiment, Sentiment::Bullish);
        assert_eq!(analysis.sub_events[0].sentiment, Sentiment::Neutral);
        assert_eq!(analysis.sub_events[0].summary, "Research unavailable: Research failed: 503");
        let relationship = &analysis.relationships.unwrap()[0];
        assert!(relationship.relationship_summary.contains("no automated analysis"));
    }

    #[tokio::test]
    async fn test_failed_main_event_degrades_relationships() {
        let (main, subs) = targets();
        let mut raw = all_succeeded(&main, &subs);
        raw.main = Some(RawResearchResult::failure(&main, ResearchRole::Main, "boom"));
        let backend = MockBackend::new().on_reason(ReasonBehavior::Respond(main_response(1)));

        let analysis = synthesize(&backend, Some(&main), &subs, &raw, &ResearchConfig::default())
            .await
            .unwrap();

        assert_eq!(analysis.main_event.unwrap().summary, "Research unavailable: boom");
        assert_eq!(analysis.sub_events[0].sentiment, Sentiment::Bearish);
        let relationships = analysis.relationships.unwrap();
        assert_eq!(relationships.len(), 1);
        assert!(relationships[0].relationship_summary.contains("no automated analysis"));
    }

    #[tokio::test]
    async fn test_colliding_ids_degrade_by_position() {
        let main = ResearchTarget::main("Election outcome");
        let subs = vec![ResearchTarget::new("Trump wins?"), ResearchTarget::new("Trump wins!")];
        let mut raw = all_succeeded(&main, &subs);
        raw.subs[1] = RawResearchResult::failure(&subs[1], ResearchRole::Sub, "Research failed: 503");
        let analysis_entry = |summary: &str| {
            json!({
                "sub_event_id": "trump-wins",
                "summary": summary,
                "key_findings": [],
                "sentiment": "bullish",
                "sentiment_rationale": "r"
            })
        };
        let relationship_entry = |summary: &str| {
            json!({
                "sub_event_id": "trump-wins",
                "relationship_summary": summary,
                "influencing_news": "n"
            })
        };
        let response = json!({
            "main_event_research": {
                "summary": "m",
                "key_findings": [],
                "sentiment": "neutral",
                "sentiment_rationale": "r"
            },
            "sub_event_analyses": [analysis_entry("first"), analysis_entry("second")],
            "relationships": [relationship_entry("first link"), relationship_entry("second link")],
            "synthesis": "s"
        });
        let backend = MockBackend::new().on_reason(ReasonBehavior::Respond(response.to_string()));

        let analysis = synthesize(&backend, Some(&main), &subs, &raw, &ResearchConfig::default())
            .await
            .unwrap();

        assert_eq!(analysis.sub_events[0].summary, "first");
        assert_eq!(analysis.sub_events[0].title, "Trump wins?");
        assert_eq!(analysis.sub_events[1].summary, "Research unavailable: Research failed: 503");
        assert_eq!(analysis.sub_events[1].title, "Trump wins!");
        let relationships = analysis.relationships.unwrap();
        assert_eq!(relationships[0].relationship_summary, "first link");
        assert!(relationships[1].relationship_summary.contains("no automated analysis"));
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let (main, subs) = targets();
        let backend = MockBackend::new().on_reason(ReasonBehavior::Fail("overloaded".into()));

        let result = synthesize(
            &backend,
            Some(&main),
            &subs,
            &all_succeeded(&main, &subs),
            &ResearchConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(Error::Api { status: 500, .. })));
    }
}
