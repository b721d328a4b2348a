use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use super::ChatWebhook;
use crate::error::DeliveryError;

/// Slack-compatible incoming webhook
pub struct SlackWebhook {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackWebhook {
    pub fn new(webhook_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            webhook_url: webhook_url.into(),
            http,
        })
    }
}

#[async_trait]
impl ChatWebhook for SlackWebhook {
    async fn post(&self, text: &str) -> Result<(), DeliveryError> {
        let payload = json!({
            "text": text,
            "unfurl_links": false,
        });

        let resp = self.http.post(&self.webhook_url).json(&payload).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Chat webhook returned non-success");
            return Err(DeliveryError::Webhook(format!("webhook returned {status}")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn posts_text_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::Json(json!({
                "text": "Daily Briefing",
                "unfurl_links": false,
            })))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let hook = SlackWebhook::new(format!("{}/hook", server.url())).expect("client");
        hook.post("Daily Briefing").await.expect("post");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(404)
            .with_body("no_service")
            .create_async()
            .await;

        let hook = SlackWebhook::new(format!("{}/hook", server.url())).expect("client");
        let err = hook.post("text").await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
