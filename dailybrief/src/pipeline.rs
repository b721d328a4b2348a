//! Fetch → summarize → fact-check over a per-run `PipelineState`.
//!
//! Stages run in fixed order and fail fast: a news or model error while fetching or
//! summarizing ends the run with a `PipelineError`. Verification failures are isolated per
//! claim and surface as `Unverified` verdicts. Every collaborator call is bounded by
//! `call_timeout` and raced against the run's `CancellationToken`.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::claims;
use crate::deadline;
use crate::error::{PipelineError, PipelineFailure, ProviderError, Stage, StateError};
use crate::evaluator::{EvalSink, SUMMARY_RELEVANCE, VERDICT_FAITHFULNESS};
use crate::llm::{LlmProvider, LlmRequest};
use crate::news::NewsSource;
use crate::search::SearchProvider;
use crate::verify::{Verdict, Verifier, DEFAULT_EVIDENCE_CHARS};

/// One verified claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimVerdict {
    pub claim: String,
    pub verdict: Verdict,
}

/// Everything one run produces. Each field is written once, by its own stage;
/// `None` means the stage has not recorded it yet.
#[derive(Debug, Clone)]
pub struct PipelineState {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    stage: Stage,
    headlines: Option<Vec<String>>,
    summary: Option<String>,
    fact_checks: Option<(Vec<String>, Vec<ClaimVerdict>)>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            stage: Stage::Fetching,
            headlines: None,
            summary: None,
            fact_checks: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Stage the run is in (or `Done` once finished)
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn headlines(&self) -> &[String] {
        self.headlines.as_deref().unwrap_or_default()
    }

    pub fn summary(&self) -> &str {
        self.summary.as_deref().unwrap_or_default()
    }

    pub fn claims(&self) -> &[String] {
        self.fact_checks.as_ref().map(|(claims, _)| claims.as_slice()).unwrap_or_default()
    }

    pub fn verdicts(&self) -> &[ClaimVerdict] {
        self.fact_checks.as_ref().map(|(_, verdicts)| verdicts.as_slice()).unwrap_or_default()
    }

    pub(crate) fn record_headlines(&mut self, headlines: Vec<String>) -> Result<(), StateError> {
        self.check_write("headlines", Stage::Fetching, self.headlines.is_some())?;
        self.headlines = Some(headlines);
        Ok(())
    }

    pub(crate) fn record_summary(&mut self, summary: String) -> Result<(), StateError> {
        self.check_write("summary", Stage::Summarizing, self.summary.is_some())?;
        self.summary = Some(summary);
        Ok(())
    }

    pub(crate) fn record_fact_checks(
        &mut self,
        claims: Vec<String>,
        verdicts: Vec<ClaimVerdict>,
    ) -> Result<(), StateError> {
        self.check_write("verdicts", Stage::FactChecking, self.fact_checks.is_some())?;
        debug_assert_eq!(claims.len(), verdicts.len());
        self.fact_checks = Some((claims, verdicts));
        Ok(())
    }

    fn check_write(&self, field: &'static str, owner: Stage, written: bool) -> Result<(), StateError> {
        if written {
            return Err(StateError::AlreadyRecorded { field });
        }
        if self.stage != owner {
            return Err(StateError::WrongStage {
                field,
                stage: self.stage,
            });
        }
        Ok(())
    }

    pub(crate) fn advance(&mut self) {
        self.stage = self.stage.next();
    }

    pub(crate) fn fail(&mut self) {
        self.stage = Stage::Failed;
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub region: String,
    pub headline_count: usize,
    /// Claims verified at once; 1 means sequential
    pub verify_concurrency: usize,
    /// Deadline for every single collaborator call
    pub call_timeout: Duration,
    pub evidence_chars: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            region: common::DEFAULT_REGION.to_string(),
            headline_count: common::DEFAULT_HEADLINE_COUNT,
            verify_concurrency: common::DEFAULT_VERIFY_CONCURRENCY,
            call_timeout: Duration::from_secs(common::DEFAULT_CALL_TIMEOUT_SECONDS),
            evidence_chars: DEFAULT_EVIDENCE_CHARS,
        }
    }
}

pub struct Pipeline {
    news: Arc<dyn NewsSource>,
    llm: Arc<dyn LlmProvider>,
    verifier: Verifier,
    options: PipelineOptions,
    eval: EvalSink,
}

impl Pipeline {
    pub fn new(
        news: Arc<dyn NewsSource>,
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LlmProvider>,
        options: PipelineOptions,
    ) -> Self {
        let verifier = Verifier::new(search, llm.clone(), options.call_timeout)
            .with_evidence_chars(options.evidence_chars);
        Self {
            news,
            llm,
            verifier,
            options,
            eval: EvalSink::disabled(),
        }
    }

    pub fn with_eval_sink(mut self, eval: EvalSink) -> Self {
        self.eval = eval;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run all stages on a fresh state.
    ///
    /// Returns the finished state (`Stage::Done`) or the error that moved the run to `Failed`.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<PipelineState, PipelineError> {
        let mut state = PipelineState::new();
        let span = info_span!("pipeline", run_id = %state.run_id());

        async move {
            info!(region = %self.options.region, count = self.options.headline_count, "pipeline run started");

            while !state.stage().is_terminal() {
                let stage = state.stage();
                let result = if cancel.is_cancelled() {
                    Err(PipelineFailure::Cancelled)
                } else {
                    self.run_stage(stage, &mut state, cancel)
                        .instrument(info_span!("stage", stage = %stage))
                        .await
                };

                match result {
                    Ok(()) => {
                        info!(stage = %stage, "stage completed");
                        state.advance();
                    }
                    Err(failure) => {
                        state.fail();
                        let err = PipelineError::new(stage, failure);
                        if err.is_cancelled() {
                            warn!(stage = %stage, "pipeline run cancelled");
                        } else {
                            error!(stage = %stage, error = %err.failure, "pipeline run failed");
                        }
                        return Err(err);
                    }
                }
            }

            info!(
                headlines = state.headlines().len(),
                claims = state.claims().len(),
                "pipeline run done"
            );
            Ok(state)
        }
        .instrument(span)
        .await
    }

    async fn run_stage(
        &self,
        stage: Stage,
        state: &mut PipelineState,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineFailure> {
        match stage {
            Stage::Fetching => {
                let headlines = self.fetch(cancel).await?;
                state.record_headlines(headlines)?;
            }
            Stage::Summarizing => {
                let summary = self.summarize(state.headlines(), cancel).await?;
                self.eval
                    .record_async(SUMMARY_RELEVANCE, state.headlines().join("\n"), summary.clone());
                state.record_summary(summary)?;
            }
            Stage::FactChecking => {
                let claims: Vec<String> = claims::extract(state.summary())
                    .into_iter()
                    .filter(|c| !c.is_empty())
                    .collect();
                let verdicts = self.fact_check(&claims, cancel).await?;
                state.record_fact_checks(claims, verdicts)?;
            }
            Stage::Done | Stage::Failed => {}
        }
        Ok(())
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<String>, PipelineFailure> {
        let call = self
            .news
            .fetch_top_headlines(&self.options.region, self.options.headline_count);
        let headlines = guarded(cancel, deadline::within("news", self.options.call_timeout, call)).await?;
        info!(count = headlines.len(), "headlines fetched");
        Ok(headlines)
    }

    async fn summarize(&self, headlines: &[String], cancel: &CancellationToken) -> Result<String, PipelineFailure> {
        let request = LlmRequest {
            prompt: summary_prompt(headlines),
            max_tokens: None,
            temperature: Some(0.5),
            timeout_seconds: None,
        };
        let call = self.llm.generate(request);
        let response = guarded(cancel, deadline::within("llm", self.options.call_timeout, call)).await?;
        info!(
            chars = response.content.len(),
            total_tokens = response.usage.total_tokens,
            "summary generated"
        );
        Ok(response.content.trim().to_string())
    }

    /// Verify every claim, at most `verify_concurrency` at a time, keeping claim order.
    async fn fact_check(
        &self,
        claims: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<ClaimVerdict>, PipelineFailure> {
        let verifier = &self.verifier;
        let results = stream::iter(claims.to_vec().into_iter().enumerate().map(|(index, claim)| async move {
            let outcome = verifier.verify(&claim).await;
            (index, claim, outcome)
        }))
        .buffered(self.options.verify_concurrency.max(1));
        let mut results = std::pin::pin!(results);

        let mut verdicts = Vec::with_capacity(claims.len());
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineFailure::Cancelled),
                next = results.next() => next,
            };
            let Some((index, claim, outcome)) = next else {
                break;
            };

            let verdict = match outcome {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(claim_index = index, error = %e, "claim verification failed; marking unverified");
                    Verdict::unverified()
                }
            };
            info!(claim_index = index, verdict = %verdict.category, "claim checked");
            self.eval
                .record_async(VERDICT_FAITHFULNESS, claim.clone(), verdict.to_string());
            verdicts.push(ClaimVerdict { claim, verdict });
        }

        Ok(verdicts)
    }
}

/// Await `call` unless the run is cancelled first.
async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> Result<T, PipelineFailure>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineFailure::Cancelled),
        result = call => result.map_err(PipelineFailure::from),
    }
}

/// Single summarization prompt over the numbered headline list.
pub fn summary_prompt(headlines: &[String]) -> String {
    let n = headlines.len();
    let numbered: String = headlines
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}. {}\n", i + 1, h))
        .collect();
    let placeholders: String = (0..n).map(|_| "- …\n").collect();

    format!(
        "Here are today's top {n} headlines:\n\n\
         {numbered}\n\
         TASK:\n\
         Write a concise, {n}-bullet summary of the main points.\n\
         Each bullet must start with \"- \" and state one factual claim.\n\
         Do not add headings, numbering or commentary.\n\n\
         FORMAT:\n\
         {placeholders}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prompt_numbers_headlines() {
        let prompt = summary_prompt(&["Alpha rises".to_string(), "Beta falls".to_string()]);
        assert!(prompt.starts_with("Here are today's top 2 headlines:"));
        assert!(prompt.contains("1. Alpha rises\n2. Beta falls\n"));
        assert!(prompt.contains("2-bullet summary"));
        assert!(prompt.ends_with("- …\n- …\n"));
    }

    #[test]
    fn summary_prompt_for_no_headlines_is_still_built() {
        let prompt = summary_prompt(&[]);
        assert!(prompt.contains("top 0 headlines"));
        assert!(prompt.contains("0-bullet summary"));
    }

    #[test]
    fn fresh_states_are_distinct() {
        let a = PipelineState::new();
        let b = PipelineState::new();
        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(a.stage(), Stage::Fetching);
        assert!(a.headlines().is_empty());
        assert!(a.summary().is_empty());
        assert!(a.verdicts().is_empty());
    }

    #[test]
    fn recorded_fields_cannot_be_overwritten() {
        let mut state = PipelineState::new();
        state.record_headlines(vec!["Alpha rises".to_string()]).expect("first write");

        let err = state.record_headlines(Vec::new()).unwrap_err();
        assert_eq!(err, StateError::AlreadyRecorded { field: "headlines" });
        assert_eq!(state.headlines(), &["Alpha rises"]);

        state.advance();
        state.record_summary("- Alpha rises".to_string()).expect("first write");
        let err = state.record_summary("- rewritten".to_string()).unwrap_err();
        assert_eq!(err, StateError::AlreadyRecorded { field: "summary" });
        assert_eq!(state.summary(), "- Alpha rises");

        state.advance();
        let verdict = ClaimVerdict {
            claim: "Alpha rises".to_string(),
            verdict: Verdict::unverified(),
        };
        state
            .record_fact_checks(vec!["Alpha rises".to_string()], vec![verdict.clone()])
            .expect("first write");
        let err = state.record_fact_checks(Vec::new(), Vec::new()).unwrap_err();
        assert_eq!(err, StateError::AlreadyRecorded { field: "verdicts" });
        assert_eq!(state.verdicts(), &[verdict]);
    }

    #[test]
    fn fields_are_only_written_by_their_own_stage() {
        let mut state = PipelineState::new();
        let err = state.record_summary("- too early".to_string()).unwrap_err();
        assert_eq!(
            err,
            StateError::WrongStage {
                field: "summary",
                stage: Stage::Fetching
            }
        );
        assert!(state.summary().is_empty());

        state.advance();
        let err = state.record_headlines(vec!["late".to_string()]).unwrap_err();
        assert_eq!(
            err,
            StateError::WrongStage {
                field: "headlines",
                stage: Stage::Summarizing
            }
        );
        assert!(state.headlines().is_empty());
    }
}
