// Library interface for dailybrief modules
// This allows tests and the binary to import modules

pub mod briefing;
pub mod claims;
pub mod deadline;
pub mod delivery;
pub mod error;
pub mod evaluator;
pub mod llm;
pub mod news;
pub mod pipeline;
pub mod report;
pub mod search;
pub mod verify;

pub use briefing::{run_briefing, Briefing};
pub use error::{DeliveryError, PipelineError, PipelineFailure, ProviderError, Stage, StateError};
pub use pipeline::{ClaimVerdict, Pipeline, PipelineOptions, PipelineState};
pub use verify::{Verdict, VerdictCategory};
