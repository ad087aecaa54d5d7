//! Response classifier: regex heuristics with an LLM fallback.
//!
//! The heuristic pass handles the overwhelmingly common phrasings
//! ("don't need it", "yep, still using it") without a network call.
//! Only ambiguous text goes to the chat-completions API, and any
//! failure there degrades to `(Unclear, 0.0)` -- the confirmation
//! dialogue turns that into a clarification question.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::json;

use super::Classifier;
use crate::roster::Decision;

static NEGATIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"don'?t\s+need",
        r"don'?t\s+want",
        r"no\s+longer\s+need",
        r"not\s+(?:needed|using|required)",
        r"^no\b",
        r"\bno\s+thanks?\b",
        r"remove\s+(?:it|access|license|my)",
        r"cancel\s+(?:it|access|license|my)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static POSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\byes\b",
        r"\byeah\b",
        r"\byep\b",
        r"(?:still|do)\s+need",
        r"want\s+to\s+keep",
        r"keeping\s+it",
        r"using\s+it",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

/// Pattern pre-pass. Negatives are checked first: "no, I don't need
/// it" must not match the positive list's bare "yes" cousins.
pub(crate) fn heuristic_classify(text: &str) -> Option<(Decision, f64)> {
    let lower = text.to_lowercase();
    let lower = lower.trim();
    if NEGATIVE_PATTERNS.iter().any(|p| p.is_match(lower)) {
        return Some((Decision::No, 0.9));
    }
    if POSITIVE_PATTERNS.iter().any(|p| p.is_match(lower)) {
        return Some((Decision::Yes, 0.9));
    }
    None
}

/// Production classifier: heuristics, then chat completions when an
/// API key is configured.
pub struct ResponseClassifier {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl ResponseClassifier {
    pub fn new(api_key: Option<String>, model: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Override the API base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn llm_classify(&self, text: &str, api_key: &str) -> Result<(Decision, f64), reqwest::Error> {
        let body = json!({
            "model": self.model,
            "temperature": 0.0,
            "max_tokens": 4,
            "messages": [
                {
                    "role": "system",
                    "content": "Determine whether the user wants to keep their software license. \
                                'don't need' and 'no longer need' mean they do NOT want to keep it. \
                                Respond with exactly one word: yes, no, or unclear."
                },
                { "role": "user", "content": text }
            ]
        });

        let resp: serde_json::Value = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let answer = resp["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        Ok(if answer.contains("yes") {
            (Decision::Yes, 0.9)
        } else if answer.contains("no") {
            (Decision::No, 0.9)
        } else {
            (Decision::Unclear, 0.5)
        })
    }
}

#[async_trait]
impl Classifier for ResponseClassifier {
    async fn classify(&self, text: &str) -> (Decision, f64) {
        if let Some(hit) = heuristic_classify(text) {
            return hit;
        }
        let Some(api_key) = self.api_key.as_deref() else {
            return (Decision::Unclear, 0.0);
        };
        match self.llm_classify(text, api_key).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "classifier call failed, degrading to unclear");
                (Decision::Unclear, 0.0)
            }
        }
    }
}
