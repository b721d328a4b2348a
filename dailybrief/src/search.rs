use anyhow::Context;
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::ProviderError;
use crate::news::USER_AGENT;

pub const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";
pub const NO_RESULTS: &str = "No search results found.";

const PROVIDER: &str = "search";

/// Web search returning raw evidence text for a query
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, ProviderError>;
}

/// One parsed search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

impl SearchHit {
    fn render(&self) -> String {
        format!("{}\n{}\n{}", self.title, self.snippet, self.url)
    }
}

/// DuckDuckGo's JavaScript-free HTML endpoint
pub struct DuckDuckGoSearch {
    endpoint: String,
    max_results: usize,
    timeout_secs: u64,
    client: Client,
}

impl DuckDuckGoSearch {
    pub fn new(endpoint: impl Into<String>, max_results: usize, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            max_results,
            timeout_secs,
            client,
        })
    }
}

#[async_trait::async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e, self.timeout_secs))?;

        let status = response.status();
        // DuckDuckGo answers throttled clients with 202 and a challenge page
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::ACCEPTED {
            return Err(ProviderError::rate_limited(PROVIDER));
        }
        if !status.is_success() {
            return Err(ProviderError::unavailable(PROVIDER, format!("search failed with status: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e, self.timeout_secs))?;

        let hits = parse_results(&body, self.max_results).map_err(|e| ProviderError::unavailable(PROVIDER, e))?;
        debug!(query, hits = hits.len(), "search completed");

        Ok(render_hits(&hits))
    }
}

/// Join hits into the evidence blob handed to the verifier
pub fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }
    hits.iter().map(SearchHit::render).collect::<Vec<_>>().join("\n\n")
}

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector {}: {:?}", css, e))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract up to `max_results` hits from a DuckDuckGo HTML results page.
pub fn parse_results(html: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
    let document = Html::parse_document(html);
    let result_sel = selector("div.result")?;
    let title_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut hits = Vec::new();
    for result in document.select(&result_sel) {
        if hits.len() >= max_results {
            break;
        }
        let Some(link) = result.select(&title_sel).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(resolve_result_url) else {
            continue;
        };
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();

        hits.push(SearchHit {
            title: element_text(link),
            snippet,
            url,
        });
    }

    Ok(hits)
}

/// Unwrap DuckDuckGo redirect links (`//duckduckgo.com/l/?uddg=...`) to their target.
fn resolve_result_url(href: &str) -> Option<String> {
    let base = Url::parse("https://duckduckgo.com/").ok()?;
    let parsed = base.join(href).ok()?;

    if parsed.path() == "/l/" {
        let target = parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())?;
        return Url::parse(&target).ok().map(String::from);
    }

    match parsed.scheme() {
        "http" | "https" => Some(parsed.into()),
        _ => None,
    }
}
