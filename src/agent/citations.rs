//! Citation extraction from search responses.
//!
//! Best effort: anything that does not yield a URL is dropped as a citation
//! candidate (the text itself stays in the raw research), and nothing here
//! can fail. No citations simply means an empty list.

use crate::backend::{Annotation, ResponseSegment, SearchResponse};
use crate::types::NewsLink;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Longest snippet kept for a link
const SNIPPET_MAX_CHARS: usize = 300;

/// Markdown links with an http(s) target: `[title](https://...)`
static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\((https?://[^\s)]+)\)").unwrap());

/// Extract de-duplicated news links from a search response.
///
/// Annotation citations are preferred; when the response carries none, inline
/// markdown links in the text are used instead.
pub fn extract_news_links(response: &SearchResponse, max_links: usize) -> Vec<NewsLink> {
    let mut seen = HashSet::new();
    let mut links: Vec<NewsLink> = response
        .segments
        .iter()
        .flat_map(|segment| {
            segment
                .annotations
                .iter()
                .filter_map(move |a| link_from_annotation(segment, a))
        })
        .filter(|link| seen.insert(link.url.clone()))
        .collect();

    if links.is_empty() {
        links = MARKDOWN_LINK
            .captures_iter(&response.output_text)
            .map(|cap| {
                let url = cap[2].to_string();
                NewsLink {
                    title: cap[1].trim().to_string(),
                    source_name: source_name(&url),
                    url,
                    snippet: None,
                    published_date: None,
                }
            })
            .filter(|link| seen.insert(link.url.clone()))
            .collect();
    }

    links.truncate(max_links);
    links
}

fn link_from_annotation(segment: &ResponseSegment, annotation: &Annotation) -> Option<NewsLink> {
    let url = annotation.url.as_deref()?.trim();
    if url.is_empty() {
        return None;
    }

    let source_name = source_name(url);
    let title = annotation
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| source_name.clone())
        .unwrap_or_else(|| url.to_string());

    Some(NewsLink {
        title,
        url: url.to_string(),
        snippet: annotation
            .start_index
            .and_then(|start| snippet_before(&segment.text, start)),
        published_date: None,
        source_name,
    })
}

/// Host of a URL without a leading `www.`.
fn source_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// The sentence leading up to a citation marker at character `start`.
fn snippet_before(text: &str, start: usize) -> Option<String> {
    let prefix: String = text.chars().take(start).collect();
    let body = prefix.trim_end_matches(|c: char| c.is_whitespace() || c == '(');

    // Skip the sentence's own terminator when looking for the previous one
    let search_end = body.char_indices().last().map(|(i, _)| i).unwrap_or(0);
    let sentence_start = body[..search_end]
        .rfind(['\n', '.', '!', '?'])
        .map(|i| i + 1)
        .unwrap_or(0);

    let sentence = body[sentence_start..].trim();
    if sentence.is_empty() {
        return None;
    }
    Some(sentence.chars().take(SNIPPET_MAX_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(url: Option<&str>, title: Option<&str>, start: Option<usize>) -> Annotation {
        Annotation {
            url: url.map(str::to_string),
            title: title.map(str::to_string),
            start_index: start,
            end_index: None,
        }
    }

    fn response(text: &str, annotations: Vec<Annotation>) -> SearchResponse {
        SearchResponse {
            output_text: text.to_string(),
            segments: vec![ResponseSegment {
                text: text.to_string(),
                annotations,
            }],
        }
    }

    #[test]
    fn test_extracts_annotation_links() {
        let text = "Oil rose sharply. Talks stalled in Vienna. ([reuters.com](https://www.reuters.com/a))";
        let start = text.find('(').unwrap();
        let resp = response(
            text,
            vec![annotation(
                Some("https://www.reuters.com/a"),
                Some("Talks stall"),
                Some(start),
            )],
        );

        let links = extract_news_links(&resp, 8);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Talks stall");
        assert_eq!(links[0].url, "https://www.reuters.com/a");
        assert_eq!(links[0].source_name.as_deref(), Some("reuters.com"));
        assert_eq!(links[0].snippet.as_deref(), Some("Talks stalled in Vienna."));
    }

    #[test]
    fn test_drops_annotations_without_url() {
        let resp = response(
            "Some text",
            vec![
                annotation(None, Some("orphan"), None),
                annotation(Some("  "), Some("blank"), None),
                annotation(Some("https://apnews.com/x"), None, None),
            ],
        );

        let links = extract_news_links(&resp, 8);
        assert_eq!(links.len(), 1);
        // title falls back to the host
        assert_eq!(links[0].title, "apnews.com");
        assert_eq!(links[0].snippet, None);
    }

    #[test]
    fn test_deduplicates_and_caps() {
        let resp = response(
            "text",
            vec![
                annotation(Some("https://a.com/1"), Some("first"), None),
                annotation(Some("https://a.com/1"), Some("dup"), None),
                annotation(Some("https://b.com/2"), None, None),
                annotation(Some("https://c.com/3"), None, None),
            ],
        );

        let links = extract_news_links(&resp, 2);
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/1", "https://b.com/2"]);
        assert_eq!(links[0].title, "first");
    }

    #[test]
    fn test_markdown_fallback() {
        let resp = SearchResponse::from_text(
            "Per [Reuters](https://reuters.com/x) and [AP](https://apnews.com/y), also [Reuters](https://reuters.com/x).",
        );

        let links = extract_news_links(&resp, 8);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].title, "Reuters");
        assert_eq!(links[1].source_name.as_deref(), Some("apnews.com"));
    }

    #[test]
    fn test_no_citations_is_empty() {
        let resp = SearchResponse::from_text("Nothing cited here [not a link].");
        assert!(extract_news_links(&resp, 8).is_empty());
    }

    #[test]
    fn test_snippet_handles_multibyte_text() {
        let text = "Preis stieg um 5 €. Verhandlungen gestoppt ";
        let start = text.chars().count();
        assert_eq!(
            snippet_before(text, start).as_deref(),
            Some("Verhandlungen gestoppt")
        );
        assert_eq!(snippet_before("", 0), None);
    }
}
