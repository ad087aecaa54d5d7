//! # Reclaim Core Library
//!
//! This library implements an automated license reclamation campaign:
//! an IT manager uploads a roster of license holders, the system DMs
//! each of them a crafted outreach message, classifies their free-text
//! replies, and walks every member through a decide-then-confirm
//! dialogue until the whole roster has a confirmed keep/release
//! decision mirrored to a spreadsheet ledger.
//!
//! ## Architecture
//!
//! - **Roster Store**: SQLite-backed ground truth for campaigns and
//!   members; every state transition is guarded in SQL
//! - **Response Protocol**: the per-member decide-then-confirm state
//!   machine, serialized per member
//! - **Lifecycle**: campaign setup, activation, and completion
//! - **Outreach**: initial fan-out plus the reminder and staleness
//!   sweeps
//! - **Intake**: ordered queue and router for inbound chat events
//! - **Capabilities**: Slack messaging, Google Sheets ledger, and LLM
//!   classification/crafting behind traits
//!
//! ## Key Components
//!
//! - [`ResponseProtocol`]: member dialogue state machine
//! - [`CampaignLifecycle`]: campaign-level transitions
//! - [`Database`]: campaign and member persistence
//! - [`Messenger`] / [`Ledger`] / [`Classifier`]: external capability traits

pub mod error;
pub mod intake;
pub mod ledger;
pub mod lifecycle;
pub mod messenger;
pub mod nlp;
pub mod outreach;
pub mod protocol;
pub mod roster;
pub mod storage;

#[cfg(test)]
pub(crate) mod testkit;

pub use error::{ConfigError, CoreError, DatabaseError, Result, TransitionError};
pub use intake::{EventRouter, InboundEvent, Intake};
pub use ledger::{Ledger, LedgerError, SheetLedger};
pub use lifecycle::CampaignLifecycle;
pub use messenger::{Messenger, MessengerError, SlackMessenger};
pub use nlp::{Classifier, LlmCrafter, MessageCrafter, ResponseClassifier};
pub use outreach::{FanOutStats, Outreach};
pub use protocol::{KeyedLocks, ProtocolOutcome, ResponseProtocol};
pub use roster::{
    Campaign, CampaignState, Decision, DecisionTally, MemberRecord, MemberState, RosterRow,
};
pub use storage::{CampaignPolicy, Config, Database, SharedDb, TimeoutsConfig};
