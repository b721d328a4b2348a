use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::delivery::{Delivery, DeliveryReport};
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, PipelineState};
use crate::report;

/// A completed run together with what was delivered
#[derive(Debug)]
pub struct Briefing {
    pub state: PipelineState,
    pub report: String,
    pub delivery: DeliveryReport,
}

/// Run the pipeline and, only if it reaches `Done`, deliver the assembled report.
///
/// A failed or cancelled run returns its error and nothing is delivered. Delivery
/// problems are reflected in `Briefing::delivery` but never fail the call.
pub async fn run_briefing(
    pipeline: &Pipeline,
    delivery: &Delivery,
    subject_prefix: &str,
    cancel: &CancellationToken,
) -> Result<Briefing, PipelineError> {
    let state = pipeline.run(cancel).await?;
    let body = report::assemble(&state);

    let delivered = if delivery.is_empty() {
        DeliveryReport::default()
    } else {
        let result = delivery
            .deliver(&report::subject(subject_prefix, &state), &body)
            .await;
        info!(attempted = result.attempted, failed = result.failed, "delivery finished");
        result
    };

    Ok(Briefing {
        state,
        report: body,
        delivery: delivered,
    })
}
