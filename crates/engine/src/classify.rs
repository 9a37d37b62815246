//! Response relevance classification with a heuristic fallback.
//!
//! The resume controller scores whether an incoming message actually
//! answers a pending interaction. When an AI classifier adapter is
//! configured it decides; otherwise this keyword heuristic does.

use weft_runner::{Classification, Verdict};

const APPROVE_WORDS: &[&str] = &[
    "approve", "approved", "yes", "lgtm", "ship", "confirm", "accept", "ok", "okay",
];
const REJECT_WORDS: &[&str] = &[
    "reject", "rejected", "no", "deny", "denied", "decline", "cancel", "stop",
];

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_owned)
        .collect()
}

/// Score `response_text` against `prompt` without a model.
///
/// Decision-word hits (approve/reject vocabulary) score high on their own;
/// otherwise relevance is the share of prompt words echoed in the response.
/// Deterministic: the same pair always produces the same score.
#[must_use]
pub fn heuristic_classify(prompt: &str, response_text: &str) -> Classification {
    let response_lower = response_text.to_lowercase();
    let decision_hit = APPROVE_WORDS
        .iter()
        .chain(REJECT_WORDS)
        .any(|word| response_lower.split_whitespace().any(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric()) == *word
        }));

    if decision_hit {
        return Classification {
            relevance: 0.9,
            verdict: Verdict::Relevant,
        };
    }

    let prompt_words = tokenize(prompt);
    if prompt_words.is_empty() {
        return Classification {
            relevance: 0.5,
            verdict: Verdict::Uncertain,
        };
    }
    let response_words = tokenize(response_text);
    let shared = prompt_words
        .iter()
        .filter(|w| response_words.contains(w))
        .count();
    let relevance = shared as f64 / prompt_words.len() as f64;

    let verdict = if relevance >= 0.5 {
        Verdict::Relevant
    } else if relevance > 0.0 {
        Verdict::Uncertain
    } else {
        Verdict::Filtered
    };
    Classification { relevance, verdict }
}

/// Extract the text to classify from a free-form response payload.
#[must_use]
pub fn response_text(response: &serde_json::Value) -> String {
    match response {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => map
            .get("text")
            .or_else(|| map.get("message"))
            .or_else(|| map.get("response"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| response.to_string()),
        other => other.to_string(),
    }
}
