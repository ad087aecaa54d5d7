//! Natural-language capabilities: response classification, the
//! relevance pre-filter, confirmation prompts, and outreach message
//! crafting.
//!
//! Classification is fuzzy and probabilistic; confirmation is literal
//! and deterministic. Keeping those separate bounds the blast radius
//! of a misclassification to one extra round-trip, so everything in
//! this module only ever produces *provisional* decisions.

pub mod classifier;
pub mod crafting;

pub use classifier::ResponseClassifier;
pub use crafting::{LlmCrafter, FALLBACK_OUTREACH};

use async_trait::async_trait;

use crate::roster::Decision;

/// Maps free text to a decision label plus a confidence score in
/// [0, 1]. Infallible by contract: any internal failure degrades to
/// `(Unclear, 0.0)` instead of propagating an error.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> (Decision, f64);
}

/// Derives the user-facing outreach text from the administrator's
/// free-text task. Infallible: falls back to a stock template.
#[async_trait]
pub trait MessageCrafter: Send + Sync {
    async fn craft(&self, prompt: &str) -> String;
}

/// Cheap keyword check: does this DM look like an answer to the
/// license question at all? Small talk that fails the filter is
/// silently ignored so we don't spam the user with prompts.
pub fn is_likely_response(text: &str) -> bool {
    const KEYWORDS: [&str; 7] = ["yes", "no", "keep", "need", "license", "using", "remove"];
    let lower = text.to_lowercase();
    KEYWORDS.iter().any(|word| lower.contains(word))
}

/// Confirmation prompt paraphrasing the provisional decision back to
/// the user. Below 0.5 confidence (including classifier failure at
/// 0.0) we don't paraphrase a guess -- we ask for a plain yes/no.
pub fn confirmation_prompt(decision: Decision, confidence: f64) -> String {
    if confidence < 0.5 {
        return "Could you please clarify with a simple yes or no if you still need the license?"
            .to_string();
    }
    match decision {
        Decision::Yes => {
            "You want to keep the license, correct? Please confirm with yes or no.".to_string()
        }
        Decision::No => {
            "You don't need the license anymore, correct? Please confirm with yes or no."
                .to_string()
        }
        Decision::Unclear => "Could you please clarify with a simple yes or no?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_filter_accepts_answers() {
        assert!(is_likely_response("yes"));
        assert!(is_likely_response("I don't NEED it anymore"));
        assert!(is_likely_response("please remove my access"));
        assert!(is_likely_response("still using it daily"));
    }

    #[test]
    fn relevance_filter_ignores_small_talk() {
        assert!(!is_likely_response("thanks!"));
        assert!(!is_likely_response("good morning"));
        assert!(!is_likely_response("who is this?"));
    }

    #[test]
    fn prompt_paraphrases_confident_decisions() {
        let prompt = confirmation_prompt(Decision::Yes, 0.9);
        assert!(prompt.contains("keep the license"));
        let prompt = confirmation_prompt(Decision::No, 0.9);
        assert!(prompt.contains("don't need the license"));
    }

    #[test]
    fn prompt_asks_for_clarification_on_low_confidence() {
        // A classifier failure arrives here as (Unclear, 0.0): the
        // dialogue recovers conversationally instead of guessing.
        for decision in [Decision::Yes, Decision::No, Decision::Unclear] {
            let prompt = confirmation_prompt(decision, 0.0);
            assert!(prompt.contains("clarify"));
        }
    }
}
