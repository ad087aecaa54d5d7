//! Inbound event intake and routing.
//!
//! Chat webhooks demand a fast acknowledgement, so events are queued
//! and processed by a single worker task. The queue preserves arrival
//! order: two replies from the same member are applied in the order
//! they arrived, whatever the classifier or transports do in between.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{CoreError, Result};
use crate::lifecycle::CampaignLifecycle;
use crate::messenger::Messenger;
use crate::outreach::Outreach;
use crate::protocol::{ProtocolOutcome, ResponseProtocol};
use crate::roster::{Campaign, CampaignState, RosterRow};
use crate::storage::{lock, SharedDb};

const START_COMMAND: &str = "start campaign";
const ROSTER_HINT: &str = "I couldn't find any email addresses in that message. Send the \
     roster as one email per line (or comma-separated).";
const PROMPT_HINT: &str = "Roster is in. Now describe the task and name the ledger sheet, \
     like: task: reclaim unused Figma licenses ledger: <sheet id or URL>";

/// One normalized inbound chat event.
#[derive(Debug, Clone, Default)]
pub struct InboundEvent {
    /// Raw event type from the chat platform; only "message" routes.
    pub event_type: String,
    pub source_identity: Option<String>,
    pub channel_identity: Option<String>,
    pub text: Option<String>,
    /// Set when the sender is a bot. Bot traffic (including our own
    /// echoes) never routes.
    pub bot_id: Option<String>,
    /// Edits, joins, and other non-plain messages carry a subtype and
    /// are dropped.
    pub subtype: Option<String>,
}

impl InboundEvent {
    /// A plain user DM.
    pub fn message(source: &str, channel: &str, text: &str) -> Self {
        Self {
            event_type: "message".to_string(),
            source_identity: Some(source.to_string()),
            channel_identity: Some(channel.to_string()),
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

/// Pull every email-looking token out of a roster message. Lines and
/// commas both separate entries; anything without an '@' is ignored
/// (headers, stray prose).
pub fn parse_roster(text: &str) -> Vec<RosterRow> {
    text.lines()
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|token| token.contains('@') && !token.contains(char::is_whitespace))
        .map(|token| RosterRow {
            email: token.to_string(),
        })
        .collect()
}

/// Byte offsets of every case-insensitive occurrence of an ASCII
/// marker. Offsets index `text` directly, so they stay valid for
/// slicing even when the surrounding message is non-ASCII.
fn marker_offsets<'a>(text: &'a str, marker: &'a str) -> impl Iterator<Item = usize> + 'a {
    text.char_indices().filter_map(move |(at, _)| {
        text.get(at..at + marker.len())
            .filter(|candidate| candidate.eq_ignore_ascii_case(marker))
            .map(|_| at)
    })
}

/// Parse a finalization message of the form
/// `task: <free text> ledger: <reference>`.
pub fn parse_task_and_ledger(text: &str) -> Option<(String, String)> {
    let task_at = marker_offsets(text, "task:").next()?;
    let ledger_at = marker_offsets(text, "ledger:").last()?;
    if ledger_at <= task_at {
        return None;
    }
    let prompt = text[task_at + "task:".len()..ledger_at].trim();
    let reference = text[ledger_at + "ledger:".len()..].trim();
    if prompt.is_empty() || reference.is_empty() {
        return None;
    }
    Some((prompt.to_string(), reference.to_string()))
}

/// Decides what an inbound event means: a manager driving their
/// campaign, a roster member answering, or noise.
pub struct EventRouter {
    db: SharedDb,
    messenger: Arc<dyn Messenger>,
    lifecycle: Arc<CampaignLifecycle>,
    outreach: Arc<Outreach>,
    protocol: Arc<ResponseProtocol>,
}

impl EventRouter {
    pub fn new(
        db: SharedDb,
        messenger: Arc<dyn Messenger>,
        lifecycle: Arc<CampaignLifecycle>,
        outreach: Arc<Outreach>,
        protocol: Arc<ResponseProtocol>,
    ) -> Self {
        Self {
            db,
            messenger,
            lifecycle,
            outreach,
            protocol,
        }
    }

    pub async fn route(&self, event: InboundEvent) -> Result<()> {
        if event.bot_id.is_some() || event.subtype.is_some() || event.event_type != "message" {
            return Ok(());
        }
        let Some(source) = event.source_identity else {
            return Ok(());
        };
        let text = event.text.unwrap_or_default();
        if text.trim().is_empty() {
            return Ok(());
        }
        let channel = event.channel_identity.unwrap_or_default();

        if text.trim().to_lowercase().starts_with(START_COMMAND) {
            return self.start_campaign(&source, &channel).await;
        }

        let active = {
            let db = lock(&self.db);
            db.active_campaign_for_manager(&source)?
        };
        if let Some(campaign) = active {
            return self.manager_message(&campaign, &channel, &text).await;
        }

        let member = {
            let db = lock(&self.db);
            db.member_for_identity_in_ongoing(&source)?
        };
        match member {
            Some(member) => {
                let reply_channel = if channel.is_empty() {
                    member.dm_channel.clone().unwrap_or_default()
                } else {
                    channel
                };
                let outcome = self
                    .protocol
                    .handle_inbound(member.id, &reply_channel, &text)
                    .await?;
                if matches!(outcome, ProtocolOutcome::Confirmed(_)) {
                    self.lifecycle.attempt_completion(member.campaign_id).await?;
                }
                Ok(())
            }
            None => {
                tracing::debug!(%source, "message from nobody we track, dropping");
                Ok(())
            }
        }
    }

    async fn start_campaign(&self, source: &str, channel: &str) -> Result<()> {
        match self.lifecycle.begin_setup(source).await {
            Ok(_) => Ok(()), // instructions already DM'd
            Err(CoreError::Transition(e)) => {
                self.reply(channel, &e.to_string()).await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn manager_message(&self, campaign: &Campaign, channel: &str, text: &str) -> Result<()> {
        let result = match campaign.state {
            CampaignState::AwaitingRoster => self.take_roster(campaign, channel, text).await,
            CampaignState::AwaitingPrompt => self.take_prompt(campaign, channel, text).await,
            CampaignState::Ongoing => {
                self.report_progress(campaign, channel).await;
                Ok(())
            }
            CampaignState::Completed => Ok(()),
        };
        // Setup mistakes come back to the manager as chat text, not as
        // a dead queue worker.
        match result {
            Err(CoreError::Transition(e)) => {
                self.reply(channel, &e.to_string()).await;
                Ok(())
            }
            other => other,
        }
    }

    async fn take_roster(&self, campaign: &Campaign, channel: &str, text: &str) -> Result<()> {
        let rows = parse_roster(text);
        if rows.is_empty() {
            self.reply(channel, ROSTER_HINT).await;
            return Ok(());
        }
        let count = self.lifecycle.ingest_roster(campaign.id, &rows)?;
        self.reply(
            channel,
            &format!("Roster received: {count} members. {PROMPT_HINT}"),
        )
        .await;
        Ok(())
    }

    async fn take_prompt(&self, campaign: &Campaign, channel: &str, text: &str) -> Result<()> {
        let Some((prompt, reference)) = parse_task_and_ledger(text) else {
            self.reply(channel, PROMPT_HINT).await;
            return Ok(());
        };
        self.lifecycle
            .finalize_setup(campaign.id, &prompt, &reference)
            .await?;
        let stats = self.outreach.send_initial_messages(campaign.id).await?;
        self.reply(
            channel,
            &format!(
                "Campaign launched: {} messages sent, {} failed.",
                stats.sent, stats.failed
            ),
        )
        .await;
        Ok(())
    }

    async fn report_progress(&self, campaign: &Campaign, channel: &str) {
        let counts = {
            let db = lock(&self.db);
            db.member_count(campaign.id)
                .and_then(|total| Ok((total, db.unconfirmed_count(campaign.id)?)))
        };
        match counts {
            Ok((total, unconfirmed)) => {
                self.reply(
                    channel,
                    &format!(
                        "Campaign {} is ongoing: {}/{} members confirmed.",
                        campaign.id,
                        total - unconfirmed,
                        total
                    ),
                )
                .await;
            }
            Err(e) => tracing::warn!(campaign_id = campaign.id, error = %e, "progress query failed"),
        }
    }

    async fn reply(&self, channel: &str, text: &str) {
        if channel.is_empty() {
            return;
        }
        if let Err(e) = self.messenger.send_message(channel, text).await {
            tracing::warn!(channel, error = %e, "reply send failed");
        }
    }
}

/// The intake queue: accepts events immediately, processes them one
/// at a time in arrival order on a worker task.
pub struct Intake {
    tx: mpsc::UnboundedSender<InboundEvent>,
    worker: JoinHandle<()>,
}

impl Intake {
    pub fn spawn(router: Arc<EventRouter>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundEvent>();
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = router.route(event).await {
                    tracing::error!(error = %e, "event processing failed");
                }
            }
        });
        Self { tx, worker }
    }

    /// Enqueue an event. Returns immediately; processing happens on
    /// the worker in arrival order.
    pub fn submit(&self, event: InboundEvent) {
        if self.tx.send(event).is_err() {
            tracing::error!("intake worker is gone, dropping event");
        }
    }

    /// Stop accepting events and wait for the queue to drain.
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}
