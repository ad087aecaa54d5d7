//! Slack Web API implementation of the [`Messenger`] capability.
//!
//! Slack wraps every response in an `{"ok": bool, ...}` envelope and
//! reports failures as `ok: false` with an `error` string even on
//! HTTP 200, so both layers are checked here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{Messenger, MessengerError};

const USERS_NOT_FOUND: &str = "users_not_found";

pub struct SlackMessenger {
    client: Client,
    token: String,
    base_url: String,
}

impl SlackMessenger {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            token: token.into(),
            base_url: "https://slack.com/api".to_string(),
        }
    }

    /// Override the API base URL (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// POST a Web API method and unwrap the `ok` envelope.
    async fn call(&self, method: &str, body: Value) -> Result<Value, MessengerError> {
        let resp = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = resp.json().await?;
        if payload["ok"].as_bool() != Some(true) {
            let reason = payload["error"].as_str().unwrap_or("unknown error");
            return Err(MessengerError::Api(format!("{method}: {reason}")));
        }
        Ok(payload)
    }
}

#[async_trait]
impl Messenger for SlackMessenger {
    async fn send_message(&self, channel: &str, text: &str) -> Result<(), MessengerError> {
        self.call(
            "chat.postMessage",
            json!({ "channel": channel, "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn open_direct_channel(&self, identity: &str) -> Result<String, MessengerError> {
        let payload = self
            .call("conversations.open", json!({ "users": identity }))
            .await?;
        payload["channel"]["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                MessengerError::MalformedResponse("conversations.open: missing channel.id".into())
            })
    }

    async fn resolve_identity_by_email(
        &self,
        email: &str,
    ) -> Result<Option<String>, MessengerError> {
        match self
            .call("users.lookupByEmail", json!({ "email": email }))
            .await
        {
            Ok(payload) => payload["user"]["id"]
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| {
                    MessengerError::MalformedResponse("users.lookupByEmail: missing user.id".into())
                }),
            Err(MessengerError::Api(reason)) if reason.contains(USERS_NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn profile_title(&self, identity: &str) -> Result<String, MessengerError> {
        let payload = self.call("users.info", json!({ "user": identity })).await?;
        Ok(payload["user"]["profile"]["title"]
            .as_str()
            .unwrap_or("")
            .to_string())
    }
}
