use std::fmt::Write;

use crate::pipeline::PipelineState;

pub const TITLE: &str = "Daily Briefing";

/// Render a finished run as the plain-text message body.
///
/// Pure: the output depends only on `state`, and verdicts are taken from
/// `state.verdicts()` as computed by the pipeline.
pub fn assemble(state: &PipelineState) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{} ({})", TITLE, state.started_at().format("%Y-%m-%d"));
    out.push('\n');

    out.push_str("Summary:\n");
    if state.claims().is_empty() {
        out.push_str("(none)\n");
    }
    for claim in state.claims() {
        let _ = writeln!(out, "- {}", claim);
    }
    out.push('\n');

    out.push_str("Fact-Check:\n");
    if state.verdicts().is_empty() {
        out.push_str("(none)\n");
    }
    for (i, entry) in state.verdicts().iter().enumerate() {
        let _ = writeln!(out, "{}. {}: {}", i + 1, entry.claim, entry.verdict);
    }

    out
}

/// Email subject line for a finished run
pub fn subject(prefix: &str, state: &PipelineState) -> String {
    format!("{} {}", prefix, state.started_at().format("%Y-%m-%d"))
}
