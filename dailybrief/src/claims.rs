//! Claim extraction from model-written bullet summaries.
//!
//! A claim starts at a line whose left-trimmed text begins with `"- "` or `"* "`.
//! Following non-bullet lines are soft-wrap continuations and are joined with a
//! single space. Whitespace-only lines add nothing and leave the claim open.
//! Text before the first bullet is ignored.

const BULLET_MARKERS: [&str; 2] = ["- ", "* "];
const EMPHASIS_MARKERS: [&str; 2] = ["**", "__"];

/// Split `summary_text` into claims, in order of appearance.
///
/// A bare marker line yields an empty claim; callers decide whether to drop it.
pub fn extract(summary_text: &str) -> Vec<String> {
    let mut claims = Vec::new();
    let mut current: Option<String> = None;

    for line in summary_text.lines() {
        let trimmed = line.trim_start();

        if let Some(rest) = bullet_text(trimmed) {
            if let Some(open) = current.take() {
                claims.push(close_claim(&open));
            }
            current = Some(rest.to_string());
            continue;
        }

        let content = trimmed.trim_end();
        if content.is_empty() {
            continue;
        }
        if let Some(open) = current.as_mut() {
            open.push(' ');
            open.push_str(content);
        }
    }

    if let Some(open) = current {
        claims.push(close_claim(&open));
    }

    claims
}

/// Text after the bullet marker, or `None` if the line is not a bullet.
fn bullet_text(trimmed: &str) -> Option<&str> {
    // "- " with its trailing space already stripped by an editor
    if trimmed == "-" || trimmed == "*" {
        return Some("");
    }
    BULLET_MARKERS
        .iter()
        .find_map(|marker| trimmed.strip_prefix(marker))
}

fn close_claim(raw: &str) -> String {
    strip_emphasis(raw).trim().to_string()
}

/// Remove doubled emphasis markers, balanced or not.
fn strip_emphasis(text: &str) -> String {
    EMPHASIS_MARKERS
        .iter()
        .fold(text.to_string(), |acc, marker| acc.replace(marker, ""))
}
