//! Campaign and member domain types.
//!
//! The member "state machine" of the response protocol is not stored
//! as an enum column -- it is derived from the nullable decision
//! fields -- but it is *exposed* as [`MemberState`] so illegal
//! combinations (confirmed with no decision) are unrepresentable to
//! callers. The store backs that up with a CHECK constraint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Campaign-level lifecycle state.
///
/// Transitions only move forward:
/// `AwaitingRoster -> AwaitingPrompt -> Ongoing -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    AwaitingRoster,
    AwaitingPrompt,
    Ongoing,
    Completed,
}

impl CampaignState {
    /// Stable string encoding used by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignState::AwaitingRoster => "awaiting_roster",
            CampaignState::AwaitingPrompt => "awaiting_prompt",
            CampaignState::Ongoing => "ongoing",
            CampaignState::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting_roster" => Some(CampaignState::AwaitingRoster),
            "awaiting_prompt" => Some(CampaignState::AwaitingPrompt),
            "ongoing" => Some(CampaignState::Ongoing),
            "completed" => Some(CampaignState::Completed),
            _ => None,
        }
    }

    /// Whether this campaign still counts against the
    /// one-active-campaign-per-manager rule.
    pub fn is_active(&self) -> bool {
        !matches!(self, CampaignState::Completed)
    }
}

impl std::fmt::Display for CampaignState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified intent of a member's free-text reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Yes,
    No,
    Unclear,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Yes => "yes",
            Decision::No => "no",
            Decision::Unclear => "unclear",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yes" => Some(Decision::Yes),
            "no" => Some(Decision::No),
            "unclear" => Some(Decision::Unclear),
            _ => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outreach/response-collection run owned by one administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub manager_identity: String,
    pub state: CampaignState,
    pub prompt_text: Option<String>,
    pub crafted_message: Option<String>,
    pub ledger_reference: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// Set once the staleness advisory has been sent to the manager.
    pub stale_notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One roster entry tracked within a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub id: i64,
    pub campaign_id: i64,
    /// Stable identity key from the roster upload.
    pub contact_email: String,
    /// Messaging identity, resolved lazily from the email.
    pub user_identity: Option<String>,
    /// Direct-message channel, opened lazily on first send.
    pub dm_channel: Option<String>,
    pub decision: Option<Decision>,
    pub decision_confidence: Option<f64>,
    pub raw_response: Option<String>,
    pub decision_at: Option<DateTime<Utc>>,
    pub decision_confirmed: bool,
    pub ping_count: u32,
    pub last_ping_at: Option<DateTime<Utc>>,
}

/// Per-member protocol state, derived from the decision fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MemberState {
    /// No decision recorded yet.
    Undecided,
    /// A provisional decision awaits the member's literal yes/no.
    PendingConfirmation { decision: Decision, confidence: f64 },
    /// Terminal within the campaign: the decision is durable.
    Confirmed { decision: Decision },
}

impl MemberRecord {
    pub fn state(&self) -> MemberState {
        match (self.decision_confirmed, self.decision) {
            (true, Some(decision)) => MemberState::Confirmed { decision },
            (false, Some(decision)) => MemberState::PendingConfirmation {
                decision,
                confidence: self.decision_confidence.unwrap_or(0.0),
            },
            // Confirmed-with-null cannot load (CHECK constraint); a
            // row with no decision is undecided either way.
            (_, None) => MemberState::Undecided,
        }
    }
}

/// One row of an uploaded roster. The upload is ingested literally:
/// duplicate emails produce duplicate members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterRow {
    pub email: String,
}

/// Confirmed-decision counts for a campaign, reported to the manager
/// on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTally {
    pub yes: u32,
    pub no: u32,
    pub unclear: u32,
}

impl DecisionTally {
    pub fn total(&self) -> u32 {
        self.yes + self.no + self.unclear
    }
}
