//! The response protocol: decide, then confirm.
//!
//! A classified reply is never trusted directly. It is recorded as a
//! provisional decision and paraphrased back to the member, and only
//! a literal "yes" promotes it to a confirmed, durable decision. The
//! confirmation match is exact (trimmed, lowercased) on purpose: the
//! classifier may misread "yeah, remove it", but it cannot misread
//! the one-word confirmation, so no decision becomes durable on the
//! strength of a guess alone.
//!
//! All mutations for one member run under that member's lock from
//! [`KeyedLocks`], and the member row is re-read after acquiring it,
//! so concurrent replies and reminder pings serialize cleanly.

pub mod locks;

pub use locks::KeyedLocks;

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, TransitionError};
use crate::ledger::Ledger;
use crate::messenger::Messenger;
use crate::nlp::{confirmation_prompt, is_likely_response, Classifier};
use crate::roster::{Decision, MemberRecord, MemberState};
use crate::storage::{lock, SharedDb};

const CONFIRMED_ACK: &str = "Thanks! Your decision has been recorded.";
const RETRACTED_PROMPT: &str =
    "Got it, let's try again. Do you still need the license? Please tell me in your own words.";
const REPROMPT: &str = "Please reply with a simple yes or no to confirm.";
const ALREADY_RECORDED: &str =
    "Your decision is already recorded for this campaign. Thanks again!";

/// What an inbound member message did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtocolOutcome {
    /// Small talk: no mutation, no reply.
    Ignored,
    /// A provisional decision was recorded and paraphrased back.
    ConfirmationRequested { decision: Decision, confidence: f64 },
    /// The pending decision is now durable.
    Confirmed(Decision),
    /// The member rejected the paraphrase; back to undecided.
    Retracted,
    /// Neither "yes" nor "no" while pending; asked again.
    Reprompted,
    /// The member already confirmed earlier in this campaign.
    AlreadyRecorded(Decision),
}

/// Drives one member's dialogue from free text to a confirmed
/// decision.
pub struct ResponseProtocol {
    db: SharedDb,
    classifier: Arc<dyn Classifier>,
    messenger: Arc<dyn Messenger>,
    ledger: Arc<dyn Ledger>,
    locks: Arc<KeyedLocks>,
    push_timeout: Duration,
}

impl ResponseProtocol {
    pub fn new(
        db: SharedDb,
        classifier: Arc<dyn Classifier>,
        messenger: Arc<dyn Messenger>,
        ledger: Arc<dyn Ledger>,
        locks: Arc<KeyedLocks>,
        push_timeout: Duration,
    ) -> Self {
        Self {
            db,
            classifier,
            messenger,
            ledger,
            locks,
            push_timeout,
        }
    }

    /// Handle a DM from a roster member.
    ///
    /// Returns what the message did; replies to the member are sent as
    /// a side effect. Reply sends are soft: a transport failure is
    /// logged and the recorded state stands.
    pub async fn handle_inbound(
        &self,
        member_id: i64,
        channel: &str,
        text: &str,
    ) -> Result<ProtocolOutcome> {
        let member_lock = self.locks.lock_for(member_id);
        let _held = member_lock.lock().await;

        // Fresh read under the lock: the state may have moved since
        // the event was queued.
        let member = {
            let db = lock(&self.db);
            db.member(member_id)?
                .ok_or(TransitionError::MemberNotFound(member_id))?
        };

        match member.state() {
            MemberState::Confirmed { decision } => {
                self.reply(channel, ALREADY_RECORDED).await;
                Ok(ProtocolOutcome::AlreadyRecorded(decision))
            }
            MemberState::Undecided => self.handle_fresh_reply(&member, channel, text).await,
            MemberState::PendingConfirmation { decision, .. } => {
                self.handle_confirmation_reply(&member, channel, text, decision)
                    .await
            }
        }
    }

    async fn handle_fresh_reply(
        &self,
        member: &MemberRecord,
        channel: &str,
        text: &str,
    ) -> Result<ProtocolOutcome> {
        if !is_likely_response(text) {
            return Ok(ProtocolOutcome::Ignored);
        }

        let (decision, confidence) = self.classifier.classify(text).await;
        {
            let db = lock(&self.db);
            db.record_provisional_decision(member.id, decision, confidence, text, chrono::Utc::now())?;
        }
        self.reply(channel, &confirmation_prompt(decision, confidence))
            .await;
        Ok(ProtocolOutcome::ConfirmationRequested {
            decision,
            confidence,
        })
    }

    async fn handle_confirmation_reply(
        &self,
        member: &MemberRecord,
        channel: &str,
        text: &str,
        pending: Decision,
    ) -> Result<ProtocolOutcome> {
        match text.trim().to_lowercase().as_str() {
            "yes" => {
                let confirmed = {
                    let db = lock(&self.db);
                    db.confirm_decision(member.id)?
                };
                if !confirmed {
                    // The decision vanished between read and write;
                    // cannot happen under the member lock, but the
                    // guarded update keeps it impossible to confirm
                    // nothing.
                    self.reply(channel, REPROMPT).await;
                    return Ok(ProtocolOutcome::Reprompted);
                }
                self.push_to_ledger(member, pending).await;
                self.reply(channel, CONFIRMED_ACK).await;
                Ok(ProtocolOutcome::Confirmed(pending))
            }
            "no" => {
                {
                    let db = lock(&self.db);
                    db.reset_decision(member.id)?;
                }
                self.reply(channel, RETRACTED_PROMPT).await;
                Ok(ProtocolOutcome::Retracted)
            }
            _ => {
                self.reply(channel, REPROMPT).await;
                Ok(ProtocolOutcome::Reprompted)
            }
        }
    }

    /// Mirror a freshly confirmed decision to the campaign ledger.
    /// Best-effort with a bounded wait: the store already holds the
    /// durable truth, so a mirror failure is logged, never unwound.
    async fn push_to_ledger(&self, member: &MemberRecord, decision: Decision) {
        let reference = {
            let db = lock(&self.db);
            match db.campaign(member.campaign_id) {
                Ok(Some(campaign)) => campaign.ledger_reference,
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(member_id = member.id, error = %e, "campaign lookup for ledger push failed");
                    return;
                }
            }
        };
        let Some(reference) = reference else {
            tracing::warn!(
                campaign_id = member.campaign_id,
                "ongoing campaign has no ledger reference, skipping push"
            );
            return;
        };

        let push = self
            .ledger
            .upsert_row(&reference, &member.contact_email, member.ping_count, decision);
        match tokio::time::timeout(self.push_timeout, push).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(member_id = member.id, error = %e, "ledger push failed")
            }
            Err(_) => {
                tracing::warn!(member_id = member.id, "ledger push timed out")
            }
        }
    }

    /// Soft send: log and continue on failure.
    async fn reply(&self, channel: &str, text: &str) {
        if let Err(e) = self.messenger.send_message(channel, text).await {
            tracing::warn!(channel, error = %e, "reply send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::roster::RosterRow;
    use crate::storage::{shared, Database};
    use crate::testkit::{FakeLedger, FakeMessenger, ScriptedClassifier};

    struct Fixture {
        protocol: ResponseProtocol,
        db: SharedDb,
        messenger: Arc<FakeMessenger>,
        ledger: Arc<FakeLedger>,
        member_id: i64,
    }

    fn fixture(script: Vec<(Decision, f64)>) -> Fixture {
        let mut db = Database::open_memory().unwrap();
        let campaign_id = db.create_campaign("U_MANAGER").unwrap();
        db.ingest_roster(
            campaign_id,
            &[RosterRow {
                email: "a@x.com".to_string(),
            }],
        )
        .unwrap()
        .unwrap();
        db.finalize_campaign(
            campaign_id,
            "reclaim licenses",
            "Hi! Still need it?",
            "sheet-1",
            chrono::Utc::now(),
        )
        .unwrap();
        let member_id = db.members(campaign_id).unwrap()[0].id;
        db.set_member_identity(member_id, "U_a").unwrap();
        db.set_member_channel(member_id, "D_a").unwrap();

        let db = shared(db);
        let messenger = Arc::new(FakeMessenger::new());
        let ledger = Arc::new(FakeLedger::new());
        let protocol = ResponseProtocol::new(
            db.clone(),
            Arc::new(ScriptedClassifier::new(script)),
            messenger.clone(),
            ledger.clone(),
            Arc::new(KeyedLocks::new()),
            Duration::from_secs(2),
        );
        Fixture {
            protocol,
            db,
            messenger,
            ledger,
            member_id,
        }
    }

    fn member_state(f: &Fixture) -> MemberState {
        lock(&f.db).member(f.member_id).unwrap().unwrap().state()
    }

    #[tokio::test]
    async fn small_talk_is_ignored_without_mutation() {
        let f = fixture(vec![]);
        let outcome = f
            .protocol
            .handle_inbound(f.member_id, "D_a", "good morning!")
            .await
            .unwrap();
        assert_eq!(outcome, ProtocolOutcome::Ignored);
        assert_eq!(member_state(&f), MemberState::Undecided);
        assert!(f.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn relevant_reply_records_provisional_and_asks_confirmation() {
        let f = fixture(vec![(Decision::No, 0.9)]);
        let outcome = f
            .protocol
            .handle_inbound(f.member_id, "D_a", "I don't need the license anymore")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ProtocolOutcome::ConfirmationRequested {
                decision: Decision::No,
                confidence: 0.9
            }
        );
        assert_eq!(
            member_state(&f),
            MemberState::PendingConfirmation {
                decision: Decision::No,
                confidence: 0.9
            }
        );
        let sent = f.messenger.sent_to("D_a");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("don't need the license"));
        // Nothing hits the ledger until the member confirms.
        assert_eq!(f.ledger.row_count(), 0);
    }

    #[tokio::test]
    async fn low_confidence_asks_for_clarification() {
        let f = fixture(vec![(Decision::Yes, 0.3)]);
        f.protocol
            .handle_inbound(f.member_id, "D_a", "well, the license, hmm, maybe yes")
            .await
            .unwrap();
        assert!(f.messenger.sent_to("D_a")[0].contains("clarify"));
    }

    #[tokio::test]
    async fn literal_yes_confirms_and_mirrors_to_ledger() {
        let f = fixture(vec![(Decision::No, 0.9)]);
        f.protocol
            .handle_inbound(f.member_id, "D_a", "please remove my license")
            .await
            .unwrap();
        let outcome = f
            .protocol
            .handle_inbound(f.member_id, "D_a", "  YES ")
            .await
            .unwrap();
        assert_eq!(outcome, ProtocolOutcome::Confirmed(Decision::No));
        assert_eq!(
            member_state(&f),
            MemberState::Confirmed {
                decision: Decision::No
            }
        );
        assert_eq!(f.ledger.row("a@x.com"), Some((0, Decision::No)));
        assert!(f
            .messenger
            .sent_to("D_a")
            .last()
            .unwrap()
            .contains("recorded"));
    }

    #[tokio::test]
    async fn punctuated_yes_is_not_a_confirmation() {
        let f = fixture(vec![(Decision::Yes, 0.9)]);
        f.protocol
            .handle_inbound(f.member_id, "D_a", "yes I keep it")
            .await
            .unwrap();
        let outcome = f
            .protocol
            .handle_inbound(f.member_id, "D_a", "yes!")
            .await
            .unwrap();
        assert_eq!(outcome, ProtocolOutcome::Reprompted);
        assert!(matches!(
            member_state(&f),
            MemberState::PendingConfirmation { .. }
        ));
    }

    #[tokio::test]
    async fn no_retracts_back_to_undecided() {
        let f = fixture(vec![(Decision::Yes, 0.9), (Decision::No, 0.9)]);
        f.protocol
            .handle_inbound(f.member_id, "D_a", "yes I still use it")
            .await
            .unwrap();
        let outcome = f
            .protocol
            .handle_inbound(f.member_id, "D_a", "no")
            .await
            .unwrap();
        assert_eq!(outcome, ProtocolOutcome::Retracted);
        assert_eq!(member_state(&f), MemberState::Undecided);

        // The dialogue restarts cleanly from the top.
        let outcome = f
            .protocol
            .handle_inbound(f.member_id, "D_a", "actually, remove it")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ProtocolOutcome::ConfirmationRequested {
                decision: Decision::No,
                confidence: 0.9
            }
        );
    }

    #[tokio::test]
    async fn confirmed_member_gets_idempotent_ack() {
        let f = fixture(vec![(Decision::Yes, 0.9)]);
        f.protocol
            .handle_inbound(f.member_id, "D_a", "keep it please")
            .await
            .unwrap();
        f.protocol
            .handle_inbound(f.member_id, "D_a", "yes")
            .await
            .unwrap();

        let outcome = f
            .protocol
            .handle_inbound(f.member_id, "D_a", "no wait, remove it")
            .await
            .unwrap();
        assert_eq!(outcome, ProtocolOutcome::AlreadyRecorded(Decision::Yes));
        assert_eq!(
            member_state(&f),
            MemberState::Confirmed {
                decision: Decision::Yes
            }
        );
        assert!(f
            .messenger
            .sent_to("D_a")
            .last()
            .unwrap()
            .contains("already recorded"));
    }

    #[tokio::test]
    async fn ledger_failure_never_unwinds_a_confirmation() {
        let f = fixture(vec![(Decision::No, 0.9)]);
        f.ledger.set_fail(true);
        f.protocol
            .handle_inbound(f.member_id, "D_a", "remove it")
            .await
            .unwrap();
        let outcome = f
            .protocol
            .handle_inbound(f.member_id, "D_a", "yes")
            .await
            .unwrap();
        assert_eq!(outcome, ProtocolOutcome::Confirmed(Decision::No));
        assert_eq!(
            member_state(&f),
            MemberState::Confirmed {
                decision: Decision::No
            }
        );
        assert_eq!(f.ledger.row_count(), 0);
    }

    #[tokio::test]
    async fn reply_send_failure_is_soft() {
        let f = fixture(vec![(Decision::Yes, 0.9)]);
        f.messenger.set_fail_sends(true);
        let outcome = f
            .protocol
            .handle_inbound(f.member_id, "D_a", "yes, keep it")
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ProtocolOutcome::ConfirmationRequested { .. }
        ));
        assert!(matches!(
            member_state(&f),
            MemberState::PendingConfirmation { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_member_is_an_error() {
        let f = fixture(vec![]);
        let err = f
            .protocol
            .handle_inbound(999, "D_x", "yes")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Transition(TransitionError::MemberNotFound(999))
        ));
    }
}
