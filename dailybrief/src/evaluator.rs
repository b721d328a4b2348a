//! Fire-and-forget quality scoring.
//!
//! The pipeline submits records through an `EvalSink`; a background task hands them to
//! an `Evaluator`. Submission never waits and evaluator errors are logged and dropped.

use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const SUMMARY_RELEVANCE: &str = "summary_relevance";
pub const VERDICT_FAITHFULNESS: &str = "verdict_faithfulness";
pub const DEFAULT_QUEUE_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvalRecord {
    pub scorer: String,
    pub input: String,
    pub output: String,
}

/// Scoring backend
#[async_trait::async_trait]
pub trait Evaluator: Send + Sync {
    async fn record(&self, record: &EvalRecord) -> anyhow::Result<()>;
}

/// Writes records to the log
pub struct LogEvaluator;

#[async_trait::async_trait]
impl Evaluator for LogEvaluator {
    async fn record(&self, record: &EvalRecord) -> anyhow::Result<()> {
        info!(
            scorer = %record.scorer,
            input_chars = record.input.len(),
            output = %record.output,
            "evaluation record"
        );
        Ok(())
    }
}

/// POSTs each record as JSON to a scoring service
pub struct HttpEvaluator {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpEvaluator {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }
}

#[async_trait::async_trait]
impl Evaluator for HttpEvaluator {
    async fn record(&self, record: &EvalRecord) -> anyhow::Result<()> {
        let resp = self.http.post(&self.endpoint).json(record).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("evaluator endpoint returned {status}");
        }
        Ok(())
    }
}

/// Non-blocking handle for submitting evaluation records
#[derive(Clone, Default)]
pub struct EvalSink {
    tx: Option<mpsc::Sender<EvalRecord>>,
}

impl EvalSink {
    /// Sink that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Start the background worker. It exits once every clone of the sink is dropped.
    pub fn spawn(evaluator: Arc<dyn Evaluator>, queue_size: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<EvalRecord>(queue_size.max(1));
        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = evaluator.record(&record).await {
                    warn!(error = %e, scorer = %record.scorer, "evaluator failed; record dropped");
                }
            }
            debug!("evaluator worker stopped");
        });
        (Self { tx: Some(tx) }, handle)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue a record without waiting. Dropped if the queue is full or the worker is gone.
    pub fn record_async(&self, scorer: &str, input: impl Into<String>, output: impl Into<String>) {
        let Some(tx) = &self.tx else {
            return;
        };
        let record = EvalRecord {
            scorer: scorer.to_string(),
            input: input.into(),
            output: output.into(),
        };
        if let Err(e) = tx.try_send(record) {
            debug!(scorer, error = %e, "evaluation record dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collecting {
        records: Mutex<Vec<EvalRecord>>,
    }

    #[async_trait::async_trait]
    impl Evaluator for Collecting {
        async fn record(&self, record: &EvalRecord) -> anyhow::Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl Evaluator for Failing {
        async fn record(&self, _record: &EvalRecord) -> anyhow::Result<()> {
            anyhow::bail!("scoring service down")
        }
    }

    #[tokio::test]
    async fn records_reach_evaluator_in_order() {
        let collecting = Arc::new(Collecting::default());
        let (sink, handle) = EvalSink::spawn(collecting.clone(), 8);

        sink.record_async(SUMMARY_RELEVANCE, "headlines", "summary");
        sink.record_async(VERDICT_FAITHFULNESS, "claim", "True");
        drop(sink);
        handle.await.expect("worker join");

        let records = collecting.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].scorer, SUMMARY_RELEVANCE);
        assert_eq!(records[1].output, "True");
    }

    #[tokio::test]
    async fn evaluator_errors_are_swallowed() {
        let (sink, handle) = EvalSink::spawn(Arc::new(Failing), 8);
        sink.record_async(SUMMARY_RELEVANCE, "in", "out");
        drop(sink);
        handle.await.expect("worker exits cleanly");
    }

    #[test]
    fn disabled_sink_accepts_records() {
        let sink = EvalSink::disabled();
        assert!(!sink.is_enabled());
        sink.record_async(SUMMARY_RELEVANCE, "in", "out");
    }
}
