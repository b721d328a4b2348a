//! Best-effort delivery of the finished report.
//!
//! Every configured channel is attempted; failures are logged and counted, never returned.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::DeliveryError;

pub mod smtp;
pub mod webhook;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait ChatWebhook: Send + Sync {
    async fn post(&self, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed
    }
}

struct EmailTarget {
    mailer: Box<dyn Mailer>,
    to: String,
}

/// Fan-out over the configured channels
#[derive(Default)]
pub struct Delivery {
    email: Option<EmailTarget>,
    webhook: Option<Box<dyn ChatWebhook>>,
}

impl Delivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, mailer: Box<dyn Mailer>, to: impl Into<String>) -> Self {
        self.email = Some(EmailTarget {
            mailer,
            to: to.into(),
        });
        self
    }

    pub fn with_webhook(mut self, webhook: Box<dyn ChatWebhook>) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.webhook.is_none()
    }

    pub async fn deliver(&self, subject: &str, body: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        if let Some(target) = &self.email {
            report.attempted += 1;
            match target.mailer.send(&target.to, subject, body).await {
                Ok(()) => info!(to = %target.to, "briefing emailed"),
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, to = %target.to, "Failed to send briefing email");
                }
            }
        }

        if let Some(webhook) = &self.webhook {
            report.attempted += 1;
            match webhook.post(body).await {
                Ok(()) => info!("briefing posted to chat webhook"),
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, "Failed to post briefing to chat webhook");
                }
            }
        }

        report
    }
}
