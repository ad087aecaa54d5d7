//! In-memory capability fakes shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ledger::{Ledger, LedgerError};
use crate::messenger::{Messenger, MessengerError};
use crate::nlp::{Classifier, MessageCrafter};
use crate::roster::Decision;

/// Records every message; resolves identities deterministically from
/// the email (`a@x.com` -> identity `U_a@x.com`, channel `D_U_...`).
#[derive(Default)]
pub struct FakeMessenger {
    sent: Mutex<Vec<(String, String)>>,
    unknown_emails: Mutex<HashSet<String>>,
    title: Mutex<String>,
    fail_sends: AtomicBool,
}

impl FakeMessenger {
    pub fn new() -> Self {
        let m = Self::default();
        *m.title.lock().unwrap() = "IT Support Engineer".to_string();
        m
    }

    pub fn with_title(title: &str) -> Self {
        let m = Self::new();
        *m.title.lock().unwrap() = title.to_string();
        m
    }

    /// Make `resolve_identity_by_email` return None for this email.
    pub fn forget_email(&self, email: &str) {
        self.unknown_emails.lock().unwrap().insert(email.to_string());
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// All `(channel, text)` pairs sent so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent to one channel.
    pub fn sent_to(&self, channel: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_message(&self, channel: &str, text: &str) -> Result<(), MessengerError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(MessengerError::Api("send disabled".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }

    async fn open_direct_channel(&self, identity: &str) -> Result<String, MessengerError> {
        Ok(format!("D_{identity}"))
    }

    async fn resolve_identity_by_email(
        &self,
        email: &str,
    ) -> Result<Option<String>, MessengerError> {
        if self.unknown_emails.lock().unwrap().contains(email) {
            return Ok(None);
        }
        Ok(Some(format!("U_{email}")))
    }

    async fn profile_title(&self, _identity: &str) -> Result<String, MessengerError> {
        Ok(self.title.lock().unwrap().clone())
    }
}

/// Returns scripted classifications in order; `(Unclear, 0.0)` once
/// the script runs dry.
#[derive(Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<(Decision, f64)>>,
}

impl ScriptedClassifier {
    pub fn new(script: impl IntoIterator<Item = (Decision, f64)>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, _text: &str) -> (Decision, f64) {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((Decision::Unclear, 0.0))
    }
}

/// In-memory sheet keyed by email.
#[derive(Default)]
pub struct FakeLedger {
    rows: Mutex<HashMap<String, (u32, Decision)>>,
    initialized: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn row(&self, email: &str) -> Option<(u32, Decision)> {
        self.rows.lock().unwrap().get(email).copied()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn initialized_references(&self) -> Vec<String> {
        self.initialized.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Api("ledger disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn verify_access(&self, _reference: &str) -> Result<(), LedgerError> {
        self.check()
    }

    async fn initialize(&self, reference: &str) -> Result<(), LedgerError> {
        self.check()?;
        self.initialized.lock().unwrap().push(reference.to_string());
        Ok(())
    }

    async fn upsert_row(
        &self,
        _reference: &str,
        email: &str,
        ping_count: u32,
        decision: Decision,
    ) -> Result<(), LedgerError> {
        self.check()?;
        self.rows
            .lock()
            .unwrap()
            .insert(email.to_string(), (ping_count, decision));
        Ok(())
    }
}

/// Deterministic crafter.
pub struct FakeCrafter {
    text: String,
}

impl FakeCrafter {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl Default for FakeCrafter {
    fn default() -> Self {
        Self::new("Hi! Do you still need your license?")
    }
}

#[async_trait]
impl MessageCrafter for FakeCrafter {
    async fn craft(&self, _prompt: &str) -> String {
        self.text.clone()
    }
}
