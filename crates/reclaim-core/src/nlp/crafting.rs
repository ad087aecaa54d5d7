//! Outreach message crafting.
//!
//! The administrator writes a free-text task ("reclaim unused Figma
//! seats, 90 days idle"); the crafter turns it into the short,
//! friendly DM the members actually receive. LLM-backed when a key is
//! configured, stock template otherwise or on any failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::MessageCrafter;

/// Stock outreach text used when crafting is unavailable or fails.
pub const FALLBACK_OUTREACH: &str = "Hi! We're reviewing license usage and noticed yours may be \
     inactive. Could you let us know if you still need access? Releasing unused licenses helps \
     us optimize costs.";

/// Chat-completions-backed crafter with a deterministic fallback.
pub struct LlmCrafter {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl LlmCrafter {
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

    async fn llm_craft(&self, prompt: &str, api_key: &str) -> Result<String, reqwest::Error> {
        let body = json!({
            "model": self.model,
            "temperature": 0.7,
            "max_tokens": 200,
            "messages": [
                {
                    "role": "system",
                    "content": "You craft direct messages to users about software licenses. \
                                Write a brief, friendly message (max 2 sentences) asking whether \
                                the user still needs access. No greetings like 'Dear user', no \
                                signatures, no meta-text."
                },
                {
                    "role": "user",
                    "content": format!("Task from admin: {prompt}")
                }
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

        Ok(resp["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string())
    }
}

#[async_trait]
impl MessageCrafter for LlmCrafter {
    async fn craft(&self, prompt: &str) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            return FALLBACK_OUTREACH.to_string();
        };
        match self.llm_craft(prompt, api_key).await {
            // A usable message mentions something; reject empty or
            // suspiciously short generations.
            Ok(message) if message.len() >= 20 => message,
            Ok(_) => FALLBACK_OUTREACH.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "message crafting failed, using fallback");
                FALLBACK_OUTREACH.to_string()
            }
        }
    }
}
