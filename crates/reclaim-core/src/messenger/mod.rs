//! Messaging transport capability.
//!
//! Everything that talks to the chat service goes through the
//! [`Messenger`] trait so components can be wired with fakes in
//! tests. All call sites treat failures as soft: logged, counted,
//! never fatal to other members' processing.

pub mod slack;

pub use slack::SlackMessenger;

use async_trait::async_trait;

/// Messenger transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed API response: {0}")]
    MalformedResponse(String),
}

/// Chat transport: send text, open direct channels, resolve users.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message to a channel.
    async fn send_message(&self, channel: &str, text: &str) -> Result<(), MessengerError>;

    /// Open (or fetch the existing) direct-message channel with a
    /// user, returning its channel id.
    async fn open_direct_channel(&self, identity: &str) -> Result<String, MessengerError>;

    /// Look up a user's messaging identity by email. `Ok(None)` means
    /// the email matched nobody -- that is routine, not an error.
    async fn resolve_identity_by_email(
        &self,
        email: &str,
    ) -> Result<Option<String>, MessengerError>;

    /// The user's profile title, used for role verification.
    async fn profile_title(&self, identity: &str) -> Result<String, MessengerError>;
}
