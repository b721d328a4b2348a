use std::collections::BTreeMap;

use dailybrief::news::{FeedNewsSource, NewsApiSource, NewsSource};
use dailybrief::search::{DuckDuckGoSearch, SearchProvider, NO_RESULTS};
use dailybrief::ProviderError;
use mockito::Matcher;

#[tokio::test]
async fn test_newsapi_top_headlines() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/v2/top-headlines")
        .match_header("x-api-key", "news-key")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("country".into(), "us".into()),
            Matcher::UrlEncoded("pageSize".into(), "3".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "status": "ok",
                "totalResults": 4,
                "articles": [
                    {"title": "  Alpha rises  "},
                    {"title": null},
                    {"title": "Beta falls"},
                    {"title": "Gamma steady"},
                    {"title": "Delta extra"}
                ]
            }"#,
        )
        .create_async()
        .await;

    let source = NewsApiSource::new(format!("{}/v2/top-headlines", server.url()), "news-key", 5).expect("client");
    let headlines = source.fetch_top_headlines("US", 3).await.expect("headlines");

    assert_eq!(headlines, vec!["Alpha rises", "Beta falls", "Gamma steady"]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_newsapi_invalid_parameter_maps_to_invalid_region() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Any)
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status": "error", "code": "parameterInvalid", "message": "bad country"}"#)
        .create_async()
        .await;

    let source = NewsApiSource::new(server.url(), "news-key", 5).expect("client");
    let err = source.fetch_top_headlines("zz", 5).await.unwrap_err();

    assert_eq!(err, ProviderError::InvalidRegion("zz".to_string()));
}

#[tokio::test]
async fn test_newsapi_rate_limited() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Any)
        .with_status(429)
        .with_body(r#"{"status": "error", "code": "rateLimited"}"#)
        .create_async()
        .await;

    let source = NewsApiSource::new(server.url(), "news-key", 5).expect("client");
    let err = source.fetch_top_headlines("us", 5).await.unwrap_err();

    assert_eq!(err, ProviderError::rate_limited("newsapi"));
}

#[tokio::test]
async fn test_newsapi_bad_key_is_unavailable() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Any)
        .with_status(401)
        .with_body(r#"{"status": "error", "code": "apiKeyInvalid", "message": "Your API key is invalid"}"#)
        .create_async()
        .await;

    let source = NewsApiSource::new(server.url(), "wrong", 5).expect("client");
    let err = source.fetch_top_headlines("us", 5).await.unwrap_err();

    assert!(matches!(err, ProviderError::Unavailable { .. }));
    assert!(err.to_string().contains("apiKeyInvalid"));
}

const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Top Stories</title>
    <link>https://news.example.com</link>
    <description>Top stories</description>
    <item><title>Parliament passes budget</title><link>https://news.example.com/1</link></item>
    <item><title>Storm hits coast</title><link>https://news.example.com/2</link></item>
    <item><title>Team wins final</title><link>https://news.example.com/3</link></item>
  </channel>
</rss>"#;

#[tokio::test]
async fn test_feed_source_reads_region_feed() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/uk.xml")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(RSS)
        .create_async()
        .await;

    let mut feeds = BTreeMap::new();
    feeds.insert("gb".to_string(), format!("{}/uk.xml", server.url()));
    let source = FeedNewsSource::new(feeds, 5).expect("client");

    let headlines = source.fetch_top_headlines("gb", 2).await.expect("headlines");
    assert_eq!(headlines, vec!["Parliament passes budget", "Storm hits coast"]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_feed_source_server_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("GET", "/feed.xml")
        .with_status(503)
        .create_async()
        .await;

    let mut feeds = BTreeMap::new();
    feeds.insert("us".to_string(), format!("{}/feed.xml", server.url()));
    let source = FeedNewsSource::new(feeds, 5).expect("client");

    let err = source.fetch_top_headlines("us", 5).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable { .. }));
}

const RESULTS_PAGE: &str = r#"
<html><body>
<div class="result">
  <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fbudget">Budget passed</a>
  <a class="result__snippet">Parliament approved the budget on Tuesday.</a>
</div>
<div class="result">
  <a class="result__a" href="https://other.example.org/report">Budget report</a>
  <div class="result__snippet">Full coverage of the vote.</div>
</div>
</body></html>
"#;

#[tokio::test]
async fn test_duckduckgo_search_renders_evidence() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/html/")
        .match_query(Matcher::UrlEncoded("q".into(), "Parliament passes budget".into()))
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(RESULTS_PAGE)
        .create_async()
        .await;

    let search = DuckDuckGoSearch::new(format!("{}/html/", server.url()), 5, 5).expect("client");
    let evidence = search.search("Parliament passes budget").await.expect("evidence");

    assert_eq!(
        evidence,
        "Budget passed\nParliament approved the budget on Tuesday.\nhttps://example.com/budget\n\n\
         Budget report\nFull coverage of the vote.\nhttps://other.example.org/report"
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_duckduckgo_no_results() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Any)
        .with_status(200)
        .with_body("<html><body><div class=\"no-results\">No results.</div></body></html>")
        .create_async()
        .await;

    let search = DuckDuckGoSearch::new(server.url(), 5, 5).expect("client");
    assert_eq!(search.search("obscure claim").await.expect("evidence"), NO_RESULTS);
}

#[tokio::test]
async fn test_duckduckgo_throttling_is_rate_limited() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Any)
        .with_status(202)
        .with_body("challenge")
        .create_async()
        .await;

    let search = DuckDuckGoSearch::new(server.url(), 5, 5).expect("client");
    let err = search.search("anything").await.unwrap_err();
    assert_eq!(err, ProviderError::rate_limited("search"));
}
