use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::deadline;
use crate::error::ProviderError;
use crate::llm::{LlmProvider, LlmRequest};
use crate::search::SearchProvider;

/// Default cap on evidence characters embedded in the verification prompt
pub const DEFAULT_EVIDENCE_CHARS: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerdictCategory {
    True,
    False,
    Unverified,
}

impl VerdictCategory {
    /// Case-insensitive label lookup
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "true" => Some(VerdictCategory::True),
            "false" => Some(VerdictCategory::False),
            "unverified" => Some(VerdictCategory::Unverified),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerdictCategory::True => "True",
            VerdictCategory::False => "False",
            VerdictCategory::Unverified => "Unverified",
        }
    }
}

impl fmt::Display for VerdictCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of checking one claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub category: VerdictCategory,
    pub evidence_urls: Vec<String>,
}

impl Verdict {
    pub fn unverified() -> Self {
        Self {
            category: VerdictCategory::Unverified,
            evidence_urls: Vec::new(),
        }
    }
}

impl fmt::Display for Verdict {
    /// `True (https://a, https://b)`, or just the category when there is no evidence
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.category)?;
        if !self.evidence_urls.is_empty() {
            write!(f, " ({})", self.evidence_urls.join(", "))?;
        }
        Ok(())
    }
}

/// Checks single claims against web search evidence with one model call each.
pub struct Verifier {
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn LlmProvider>,
    call_timeout: Duration,
    evidence_chars: usize,
}

impl Verifier {
    pub fn new(search: Arc<dyn SearchProvider>, llm: Arc<dyn LlmProvider>, call_timeout: Duration) -> Self {
        Self {
            search,
            llm,
            call_timeout,
            evidence_chars: DEFAULT_EVIDENCE_CHARS,
        }
    }

    pub fn with_evidence_chars(mut self, evidence_chars: usize) -> Self {
        self.evidence_chars = evidence_chars;
        self
    }

    /// Search for evidence, ask the model for a verdict and parse it.
    ///
    /// Provider failures propagate. Malformed model output never does; it becomes `Unverified`.
    pub async fn verify(&self, claim: &str) -> Result<Verdict, ProviderError> {
        let evidence = deadline::within("search", self.call_timeout, self.search.search(claim)).await?;

        let request = LlmRequest {
            prompt: verification_prompt(claim, &evidence, self.evidence_chars),
            max_tokens: Some(200),
            temperature: Some(0.0),
            timeout_seconds: None,
        };
        let response = deadline::within("llm", self.call_timeout, self.llm.generate(request)).await?;

        let verdict = parse_verdict(&response.content);
        debug!(claim, verdict = %verdict, "claim verified");
        Ok(verdict)
    }
}

pub fn verification_prompt(claim: &str, evidence: &str, evidence_chars: usize) -> String {
    let evidence: String = evidence.chars().take(evidence_chars).collect();
    format!(
        r#"You are a fact-checker. Decide whether the CLAIM is supported by the EVIDENCE gathered from a web search.

CLAIM:
{claim}

EVIDENCE:
{evidence}

Answer with exactly one line in this format:
<True|False|Unverified> (<url>)

Use True if the evidence supports the claim, False if it contradicts the claim, and Unverified if the evidence is insufficient.
Cite the URL(s) of the evidence you relied on inside the parentheses, separated by commas."#
    )
}

/// Map a free-text model answer onto a `Verdict`.
///
/// The leading word (after markdown, numbering and a `Verdict:`-style label) must be one of
/// `True`, `False`, `Unverified`; anything else gives `Unverified` with no evidence.
pub fn parse_verdict(response: &str) -> Verdict {
    match leading_category(response) {
        Some(category) => Verdict {
            category,
            evidence_urls: extract_urls(response),
        },
        None => Verdict::unverified(),
    }
}

const ANSWER_LABELS: [&str; 4] = ["verdict", "answer", "result", "status"];

fn leading_category(response: &str) -> Option<VerdictCategory> {
    let mut rest = response.lines().map(str::trim).find(|l| !l.is_empty())?;

    loop {
        let before = rest;
        rest = rest.trim_start_matches(|c: char| !c.is_alphanumeric());
        rest = strip_numbering(rest);
        rest = strip_label(rest);
        if rest == before {
            break;
        }
    }

    let word: String = rest.chars().take_while(|c| c.is_alphabetic()).collect();
    VerdictCategory::from_label(&word)
}

/// "1." / "2)" list numbering
fn strip_numbering(text: &str) -> &str {
    let digits = text.len() - text.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return text;
    }
    match text[digits..].chars().next() {
        Some('.') | Some(')') => &text[digits + 1..],
        _ => text,
    }
}

fn strip_label(text: &str) -> &str {
    for label in ANSWER_LABELS {
        let n = label.len();
        let matches = text.get(..n).is_some_and(|p| p.eq_ignore_ascii_case(label));
        if matches && text[n..].starts_with(':') {
            return &text[n + 1..];
        }
    }
    text
}

/// Every well-formed http(s) URL in `text`, in order, without duplicates.
fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut consumed = 0;

    for (start, _) in text.match_indices("http") {
        if start < consumed {
            continue;
        }
        let candidate = &text[start..];
        if !(candidate.starts_with("http://") || candidate.starts_with("https://")) {
            continue;
        }
        let end = candidate
            .find(|c: char| c.is_whitespace() || matches!(c, ')' | ']' | '>' | '<' | '"' | '\'' | ',' | '`'))
            .unwrap_or(candidate.len());
        consumed = start + end;

        let raw = candidate[..end].trim_end_matches(['.', ';', ':', '*']);
        let valid = Url::parse(raw).map(|u| u.host_str().is_some()).unwrap_or(false);
        if valid && !urls.iter().any(|u| u == raw) {
            urls.push(raw.to_string());
        }
    }

    urls
}
