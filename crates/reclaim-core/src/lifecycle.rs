//! Campaign lifecycle: setup, activation, completion.
//!
//! A campaign walks forward only: `AwaitingRoster -> AwaitingPrompt ->
//! Ongoing -> Completed`. Every transition is guarded in the store, so
//! a stale or duplicate request gets a descriptive rejection instead
//! of a double-apply.

use std::sync::Arc;

use crate::error::{Result, TransitionError};
use crate::ledger::Ledger;
use crate::messenger::Messenger;
use crate::nlp::MessageCrafter;
use crate::roster::{Campaign, CampaignState, DecisionTally, RosterRow};
use crate::storage::{lock, SharedDb};

const SETUP_INSTRUCTIONS: &str = "Campaign created. Upload the member roster (one email per \
     line, or a CSV with an email column) to this conversation to continue.";

/// Profile-title keywords that grant campaign administration.
const IT_TITLE_KEYWORDS: [&str; 3] = ["information technology", "systems", "tech"];

/// Whether a profile title describes an IT role. "it" must stand as
/// its own word; a plain substring test would match half the company
/// ("recruiter", "editor").
pub fn is_it_role(title: &str) -> bool {
    let lower = title.to_lowercase();
    if lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == "it")
    {
        return true;
    }
    IT_TITLE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Drives campaign-level transitions and the completion check.
pub struct CampaignLifecycle {
    db: SharedDb,
    messenger: Arc<dyn Messenger>,
    crafter: Arc<dyn MessageCrafter>,
    ledger: Arc<dyn Ledger>,
}

impl CampaignLifecycle {
    pub fn new(
        db: SharedDb,
        messenger: Arc<dyn Messenger>,
        crafter: Arc<dyn MessageCrafter>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            db,
            messenger,
            crafter,
            ledger,
        }
    }

    /// Start campaign setup for a manager: role check, the
    /// one-active-campaign rule, then a fresh `AwaitingRoster`
    /// campaign. The manager gets the next-step instructions by DM.
    pub async fn begin_setup(&self, manager_identity: &str) -> Result<i64> {
        let title = self.messenger.profile_title(manager_identity).await?;
        if !is_it_role(&title) {
            return Err(TransitionError::NotAuthorized.into());
        }

        let campaign_id = {
            let db = lock(&self.db);
            if let Some(existing) = db.active_campaign_for_manager(manager_identity)? {
                return Err(TransitionError::ActiveCampaignExists {
                    manager: manager_identity.to_string(),
                    id: existing.id,
                }
                .into());
            }
            db.create_campaign(manager_identity)?
        };

        tracing::info!(campaign_id, manager = manager_identity, "campaign created");
        self.dm_manager(manager_identity, SETUP_INSTRUCTIONS).await;
        Ok(campaign_id)
    }

    /// Attach the roster: `AwaitingRoster -> AwaitingPrompt`. Returns
    /// the number of members created.
    pub fn ingest_roster(&self, campaign_id: i64, rows: &[RosterRow]) -> Result<usize> {
        let mut db = lock(&self.db);
        match db.ingest_roster(campaign_id, rows)? {
            Some(count) => {
                tracing::info!(campaign_id, members = count, "roster ingested");
                Ok(count)
            }
            None => Err(self.wrong_state(&db, campaign_id, CampaignState::AwaitingRoster)),
        }
    }

    /// Activate the campaign: `AwaitingPrompt -> Ongoing`.
    ///
    /// The ledger sheet must be reachable and gets its header row
    /// before anything else moves; a campaign never goes ongoing with
    /// a ledger nobody can write. Returns the crafted outreach text.
    pub async fn finalize_setup(
        &self,
        campaign_id: i64,
        prompt_text: &str,
        ledger_reference: &str,
    ) -> Result<String> {
        // Cheap precondition read so a wrong-state request fails
        // before any external call; the SQL guard below still decides.
        {
            let db = lock(&self.db);
            let campaign = db
                .campaign(campaign_id)?
                .ok_or(TransitionError::CampaignNotFound(campaign_id))?;
            if campaign.state != CampaignState::AwaitingPrompt {
                return Err(TransitionError::WrongCampaignState {
                    id: campaign_id,
                    actual: campaign.state,
                    expected: CampaignState::AwaitingPrompt,
                }
                .into());
            }
        }

        self.ledger
            .verify_access(ledger_reference)
            .await
            .map_err(|e| TransitionError::LedgerUnusable {
                reference: ledger_reference.to_string(),
                message: e.to_string(),
            })?;
        self.ledger
            .initialize(ledger_reference)
            .await
            .map_err(|e| TransitionError::LedgerUnusable {
                reference: ledger_reference.to_string(),
                message: e.to_string(),
            })?;

        let crafted = self.crafter.craft(prompt_text).await;

        let db = lock(&self.db);
        let finalized = db.finalize_campaign(
            campaign_id,
            prompt_text,
            &crafted,
            ledger_reference,
            chrono::Utc::now(),
        )?;
        if !finalized {
            return Err(self.wrong_state(&db, campaign_id, CampaignState::AwaitingPrompt));
        }
        tracing::info!(campaign_id, "campaign ongoing");
        Ok(crafted)
    }

    /// Complete the campaign if every member has confirmed. Returns
    /// whether it completed. Safe to call after any confirmation or
    /// sweep; a campaign that is not ongoing (or not yet done) is a
    /// no-op.
    pub async fn attempt_completion(&self, campaign_id: i64) -> Result<bool> {
        let (campaign, tally) = {
            let db = lock(&self.db);
            let Some(campaign) = db.campaign(campaign_id)? else {
                return Ok(false);
            };
            if campaign.state != CampaignState::Ongoing {
                return Ok(false);
            }
            let total = db.member_count(campaign_id)?;
            if total == 0 || db.unconfirmed_count(campaign_id)? > 0 {
                return Ok(false);
            }
            if !db.complete_campaign(campaign_id)? {
                return Ok(false);
            }
            let tally = db.decision_tally(campaign_id)?;
            (campaign, tally)
        };

        tracing::info!(campaign_id, "campaign completed");
        self.dm_manager(&campaign.manager_identity, &completion_summary(&campaign, tally))
            .await;
        Ok(true)
    }

    fn wrong_state(
        &self,
        db: &crate::storage::Database,
        campaign_id: i64,
        expected: CampaignState,
    ) -> crate::error::CoreError {
        match db.campaign(campaign_id) {
            Ok(Some(campaign)) => TransitionError::WrongCampaignState {
                id: campaign_id,
                actual: campaign.state,
                expected,
            }
            .into(),
            Ok(None) => TransitionError::CampaignNotFound(campaign_id).into(),
            Err(e) => e.into(),
        }
    }

    /// Soft DM to the manager: failures are logged, never fatal.
    async fn dm_manager(&self, manager_identity: &str, text: &str) {
        let channel = match self.messenger.open_direct_channel(manager_identity).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(manager = manager_identity, error = %e, "manager DM channel open failed");
                return;
            }
        };
        if let Err(e) = self.messenger.send_message(&channel, text).await {
            tracing::warn!(manager = manager_identity, error = %e, "manager DM send failed");
        }
    }
}

fn completion_summary(campaign: &Campaign, tally: DecisionTally) -> String {
    format!(
        "Campaign {} is complete: all {} members responded. \
         Keeping the license: {}. Releasing it: {}. Unclear: {}.",
        campaign.id,
        tally.total(),
        tally.yes,
        tally.no,
        tally.unclear
    )
}
