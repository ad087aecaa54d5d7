//! Outbound messaging: initial fan-out, reminder sweeps, and the
//! stale-campaign advisory.
//!
//! Sends are best-effort and isolated per member: one dead email or
//! closed DM never stops the rest of the roster. A ping is recorded
//! only after its send succeeded, so the reminder sweep naturally
//! retries members whose sends failed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::error::{Result, TransitionError};
use crate::lifecycle::CampaignLifecycle;
use crate::messenger::Messenger;
use crate::protocol::KeyedLocks;
use crate::roster::{CampaignState, MemberRecord};
use crate::storage::{lock, CampaignPolicy, SharedDb};

/// Initial fan-out results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutStats {
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Sends campaign messages and runs the recurring sweeps.
pub struct Outreach {
    db: SharedDb,
    messenger: Arc<dyn Messenger>,
    lifecycle: Arc<CampaignLifecycle>,
    locks: Arc<KeyedLocks>,
    policy: CampaignPolicy,
    /// Held for the duration of a reminder sweep; a tick that fires
    /// while the previous sweep is still sending is skipped.
    sweep_gate: AsyncMutex<()>,
}

impl Outreach {
    pub fn new(
        db: SharedDb,
        messenger: Arc<dyn Messenger>,
        lifecycle: Arc<CampaignLifecycle>,
        locks: Arc<KeyedLocks>,
        policy: CampaignPolicy,
    ) -> Self {
        Self {
            db,
            messenger,
            lifecycle,
            locks,
            policy,
            sweep_gate: AsyncMutex::new(()),
        }
    }

    /// Send the crafted outreach message to every member of a freshly
    /// ongoing campaign. Idempotent: members already pinged are
    /// skipped, so a rerun after a partial failure only touches the
    /// members that were missed.
    pub async fn send_initial_messages(&self, campaign_id: i64) -> Result<FanOutStats> {
        let (message, member_ids) = {
            let db = lock(&self.db);
            let campaign = db
                .campaign(campaign_id)?
                .ok_or(TransitionError::CampaignNotFound(campaign_id))?;
            if campaign.state != CampaignState::Ongoing {
                return Err(TransitionError::WrongCampaignState {
                    id: campaign_id,
                    actual: campaign.state,
                    expected: CampaignState::Ongoing,
                }
                .into());
            }
            let message = campaign.crafted_message.unwrap_or_default();
            let ids: Vec<i64> = db.members(campaign_id)?.iter().map(|m| m.id).collect();
            (message, ids)
        };

        let mut stats = FanOutStats::default();
        for member_id in member_ids {
            let member_lock = self.locks.lock_for(member_id);
            let _held = member_lock.lock().await;

            let member = {
                let db = lock(&self.db);
                db.member(member_id)?
            };
            let Some(member) = member else { continue };
            if member.ping_count > 0 {
                stats.skipped += 1;
                continue;
            }
            match self.ping(&member, &message).await {
                Ok(()) => stats.sent += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        member_id,
                        email = %member.contact_email,
                        error = %e,
                        "initial send failed"
                    );
                }
            }
        }
        tracing::info!(
            campaign_id,
            sent = stats.sent,
            failed = stats.failed,
            skipped = stats.skipped,
            "fan-out finished"
        );
        Ok(stats)
    }

    /// One reminder pass: every undecided member under the ping cap
    /// whose last ping is older than the reminder interval gets a
    /// reminder. Returns the number of reminders sent. Skips entirely
    /// if a previous sweep is still running.
    pub async fn sweep_reminders(&self) -> Result<u32> {
        let Ok(_gate) = self.sweep_gate.try_lock() else {
            tracing::debug!("reminder sweep already running, skipping tick");
            return Ok(0);
        };

        let cutoff = chrono::Utc::now() - self.policy.reminder_interval();
        let candidates = {
            let db = lock(&self.db);
            db.reminder_candidates(self.policy.max_pings, cutoff)?
        };

        let mut messages: HashMap<i64, String> = HashMap::new();
        let mut sent = 0;
        for candidate in candidates {
            let member_lock = self.locks.lock_for(candidate.id);
            let _held = member_lock.lock().await;

            // Re-read under the lock: the member may have answered
            // between the scan and now.
            let member = {
                let db = lock(&self.db);
                db.member(candidate.id)?
            };
            let Some(member) = member else { continue };
            if member.decision.is_some()
                || member.ping_count >= self.policy.max_pings
                || member.last_ping_at.map_or(true, |at| at >= cutoff)
            {
                continue;
            }

            let message = match messages.entry(member.campaign_id) {
                std::collections::hash_map::Entry::Occupied(e) => e.get().clone(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    let db = lock(&self.db);
                    let crafted = db
                        .campaign(member.campaign_id)?
                        .and_then(|c| c.crafted_message)
                        .unwrap_or_default();
                    e.insert(format!("Reminder: {crafted}")).clone()
                }
            };

            match self.ping(&member, &message).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(member_id = member.id, error = %e, "reminder send failed")
                }
            }
        }
        if sent > 0 {
            tracing::info!(sent, "reminder sweep finished");
        }
        Ok(sent)
    }

    /// Advise managers of ongoing campaigns older than the staleness
    /// threshold. One advisory per campaign; it repeats only if the
    /// send itself failed.
    pub async fn sweep_stale_campaigns(&self) -> Result<u32> {
        let cutoff = chrono::Utc::now() - self.policy.stale_after();
        let stale = {
            let db = lock(&self.db);
            db.stale_ongoing_campaigns(cutoff)?
        };

        let mut notified = 0;
        for campaign in stale {
            let advisory = format!(
                "Heads up: campaign {} has been running for over {} days and still has \
                 unconfirmed members. Consider following up directly or wrapping it up.",
                campaign.id, self.policy.stale_after_days
            );
            if self.dm(&campaign.manager_identity, &advisory).await {
                let db = lock(&self.db);
                db.mark_stale_notified(campaign.id)?;
                notified += 1;
            }
        }
        Ok(notified)
    }

    /// One full maintenance pass: reminders, staleness advisories, and
    /// a completion re-check for every ongoing campaign.
    pub async fn run_once(&self) -> Result<()> {
        self.sweep_reminders().await?;
        self.sweep_stale_campaigns().await?;

        let ongoing: Vec<i64> = {
            let db = lock(&self.db);
            db.ongoing_campaigns()?.iter().map(|c| c.id).collect()
        };
        for campaign_id in ongoing {
            self.lifecycle.attempt_completion(campaign_id).await?;
        }
        Ok(())
    }

    /// Recurring sweep loop; runs until the task is dropped. Errors
    /// are logged and the next tick proceeds.
    pub async fn run(&self) {
        let period = std::time::Duration::from_secs(
            u64::from(self.policy.reminder_interval_hours) * 3600,
        );
        let mut ticks = tokio::time::interval(period);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if let Err(e) = self.run_once().await {
                tracing::error!(error = %e, "sweep pass failed");
            }
        }
    }

    /// Send one message to a member, resolving and caching the
    /// messaging identity and DM channel on first use, then record the
    /// ping.
    async fn ping(&self, member: &MemberRecord, text: &str) -> Result<()> {
        let identity = match &member.user_identity {
            Some(identity) => identity.clone(),
            None => {
                let resolved = self
                    .messenger
                    .resolve_identity_by_email(&member.contact_email)
                    .await?;
                let Some(identity) = resolved else {
                    return Err(crate::error::CoreError::Custom(format!(
                        "no messaging account for '{}'",
                        member.contact_email
                    )));
                };
                let db = lock(&self.db);
                db.set_member_identity(member.id, &identity)?;
                identity
            }
        };

        let channel = match &member.dm_channel {
            Some(channel) => channel.clone(),
            None => {
                let channel = self.messenger.open_direct_channel(&identity).await?;
                let db = lock(&self.db);
                db.set_member_channel(member.id, &channel)?;
                channel
            }
        };

        self.messenger.send_message(&channel, text).await?;
        let db = lock(&self.db);
        db.record_ping(member.id, chrono::Utc::now())?;
        Ok(())
    }

    async fn dm(&self, identity: &str, text: &str) -> bool {
        let channel = match self.messenger.open_direct_channel(identity).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(identity, error = %e, "DM channel open failed");
                return false;
            }
        };
        match self.messenger.send_message(&channel, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(identity, error = %e, "DM send failed");
                false
            }
        }
    }
}
