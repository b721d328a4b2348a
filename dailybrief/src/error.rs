//! Typed errors for collaborator calls, pipeline runs and delivery.

use std::fmt;
use thiserror::Error;

/// Failure of an external collaborator (news source, search provider, language model).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Service unreachable or returned an unusable response
    #[error("{provider} unavailable: {message}")]
    Unavailable { provider: String, message: String },

    /// Service refused the call because of rate limiting
    #[error("{provider} rate limited")]
    RateLimited { provider: String },

    /// News source does not know the requested region
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// Model refused to produce content for the prompt
    #[error("{provider} filtered the response content")]
    ContentFiltered { provider: String },

    /// Call exceeded its deadline
    #[error("{provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },
}

impl ProviderError {
    pub fn unavailable(provider: impl Into<String>, message: impl fmt::Display) -> Self {
        ProviderError::Unavailable {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn rate_limited(provider: impl Into<String>) -> Self {
        ProviderError::RateLimited {
            provider: provider.into(),
        }
    }

    /// Map a reqwest transport error, keeping timeouts distinguishable.
    pub fn from_reqwest(provider: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: provider.to_string(),
                seconds: timeout_secs,
            }
        } else {
            ProviderError::unavailable(provider, err)
        }
    }
}

/// Pipeline stage. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetching,
    Summarizing,
    FactChecking,
    Done,
    Failed,
}

impl Stage {
    /// Successor on success. Terminal stages map to themselves.
    pub fn next(self) -> Stage {
        match self {
            Stage::Fetching => Stage::Summarizing,
            Stage::Summarizing => Stage::FactChecking,
            Stage::FactChecking => Stage::Done,
            Stage::Done => Stage::Done,
            Stage::Failed => Stage::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Summarizing => "summarizing",
            Stage::FactChecking => "fact_checking",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected write to a `PipelineState` field
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("{field} already recorded")]
    AlreadyRecorded { field: &'static str },

    #[error("{field} cannot be recorded during {stage}")]
    WrongStage { field: &'static str, stage: Stage },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineFailure {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("run cancelled")]
    Cancelled,
}

/// A run that ended in the `Failed` state. `stage` is the stage that was executing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("pipeline failed during {stage}: {failure}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub failure: PipelineFailure,
}

impl PipelineError {
    pub fn new(stage: Stage, failure: impl Into<PipelineFailure>) -> Self {
        Self {
            stage,
            failure: failure.into(),
        }
    }

    pub fn cancelled(stage: Stage) -> Self {
        Self::new(stage, PipelineFailure::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.failure, PipelineFailure::Cancelled)
    }
}

/// Delivery failures. Logged by the caller, never fatal to the report.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("email delivery failed: {0}")]
    Email(String),

    #[error("webhook delivery failed: {0}")]
    Webhook(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Webhook(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_in_fixed_order() {
        let mut stage = Stage::Fetching;
        let mut seen = vec![stage];
        while !stage.is_terminal() {
            stage = stage.next();
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![Stage::Fetching, Stage::Summarizing, Stage::FactChecking, Stage::Done]
        );
        assert_eq!(Stage::Failed.next(), Stage::Failed);
    }

    #[test]
    fn pipeline_error_message_names_stage() {
        let err = PipelineError::new(
            Stage::Fetching,
            ProviderError::unavailable("newsapi", "connection refused"),
        );
        assert_eq!(
            err.to_string(),
            "pipeline failed during fetching: newsapi unavailable: connection refused"
        );
        assert!(!err.is_cancelled());
        assert!(PipelineError::cancelled(Stage::Summarizing).is_cancelled());
    }
}
