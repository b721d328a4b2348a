use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ProviderError;

pub const USER_AGENT: &str = concat!("dailybrief/", env!("CARGO_PKG_VERSION"));
pub const NEWSAPI_TOP_HEADLINES_URL: &str = "https://newsapi.org/v2/top-headlines";

/// Source of today's top headlines
#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    /// Return up to `count` headline titles for `region`, in source order.
    async fn fetch_top_headlines(&self, region: &str, count: usize) -> Result<Vec<String>, ProviderError>;
}

/// NewsAPI.org `top-headlines` endpoint
pub struct NewsApiSource {
    api_url: String,
    api_key: String,
    timeout_secs: u64,
    client: Client,
}

impl NewsApiSource {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            timeout_secs,
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
}

/// NewsAPI takes ISO 3166-1 alpha-2 country codes
fn is_country_code(region: &str) -> bool {
    region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic())
}

#[async_trait::async_trait]
impl NewsSource for NewsApiSource {
    async fn fetch_top_headlines(&self, region: &str, count: usize) -> Result<Vec<String>, ProviderError> {
        if !is_country_code(region) {
            return Err(ProviderError::InvalidRegion(region.to_string()));
        }

        let page_size = count.to_string();
        let country = region.to_ascii_lowercase();
        let response = self
            .client
            .get(&self.api_url)
            .header("X-Api-Key", &self.api_key)
            .query(&[("country", country.as_str()), ("pageSize", page_size.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("newsapi", e, self.timeout_secs))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::rate_limited("newsapi"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest("newsapi", e, self.timeout_secs))?;

        let parsed: NewsApiResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::unavailable("newsapi", format!("unexpected response ({}): {}", status, e))
        })?;

        if parsed.status != "ok" || !status.is_success() {
            let code = parsed.code.unwrap_or_default();
            let message = parsed.message.unwrap_or_default();
            return Err(match code.as_str() {
                "rateLimited" => ProviderError::rate_limited("newsapi"),
                "parameterInvalid" => ProviderError::InvalidRegion(region.to_string()),
                _ => ProviderError::unavailable("newsapi", format!("{} {}: {}", status, code, message)),
            });
        }

        let headlines: Vec<String> = parsed
            .articles
            .into_iter()
            .filter_map(|a| a.title)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .take(count)
            .collect();

        info!(region, count = headlines.len(), "fetched top headlines from NewsAPI");
        Ok(headlines)
    }
}

/// RSS/Atom feeds keyed by region
pub struct FeedNewsSource {
    feeds: BTreeMap<String, String>,
    timeout_secs: u64,
    client: Client,
}

impl FeedNewsSource {
    pub fn new(feeds: BTreeMap<String, String>, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            feeds,
            timeout_secs,
            client,
        })
    }
}

#[async_trait::async_trait]
impl NewsSource for FeedNewsSource {
    async fn fetch_top_headlines(&self, region: &str, count: usize) -> Result<Vec<String>, ProviderError> {
        let url = self
            .feeds
            .get(region)
            .ok_or_else(|| ProviderError::InvalidRegion(region.to_string()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("feed", e, self.timeout_secs))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::rate_limited("feed"));
        }
        if !status.is_success() {
            return Err(ProviderError::unavailable("feed", format!("feed fetch failed with status: {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest("feed", e, self.timeout_secs))?;
        let feed = feed_rs::parser::parse(bytes.as_ref())
            .map_err(|e| ProviderError::unavailable("feed", format!("failed to parse feed: {}", e)))?;

        let headlines: Vec<String> = feed
            .entries
            .into_iter()
            .filter_map(|entry| entry.title.map(|t| t.content.trim().to_string()))
            .filter(|t| !t.is_empty())
            .take(count)
            .collect();

        debug!(url = %url, count = headlines.len(), "parsed feed headlines");
        Ok(headlines)
    }
}
