//! SQLite-backed roster store.
//!
//! Ground truth for campaigns and their members. All decision-field
//! writes are single statements (or one transaction for the roster
//! ingest), so a failed transition never leaves partial updates
//! behind. State-guarded updates carry their precondition in the
//! WHERE clause; callers translate a zero-row update into a
//! descriptive transition rejection.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use crate::roster::{Campaign, CampaignState, Decision, DecisionTally, MemberRecord, RosterRow};

use super::data_dir;

const CAMPAIGN_COLS: &str = "id, manager_identity, state, prompt_text, crafted_message, \
     ledger_reference, started_at, stale_notified, created_at, updated_at";

const MEMBER_COLS: &str = "id, campaign_id, contact_email, user_identity, dm_channel, \
     decision, decision_confidence, raw_response, decision_at, decision_confirmed, \
     ping_count, last_ping_at";

/// SQLite database holding campaigns and campaign members.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/reclaim/reclaim.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("reclaim.db");
        Self::open_at(&path)
    }

    /// Open (creating if needed) a database at an explicit path.
    pub fn open_at(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (tests and ephemeral runs).
    pub fn open_memory() -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS campaigns (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                manager_identity TEXT NOT NULL,
                state            TEXT NOT NULL,
                prompt_text      TEXT,
                crafted_message  TEXT,
                ledger_reference TEXT,
                started_at       TEXT,
                stale_notified   INTEGER NOT NULL DEFAULT 0,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS campaign_members (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id         INTEGER NOT NULL REFERENCES campaigns(id),
                contact_email       TEXT NOT NULL,
                user_identity       TEXT,
                dm_channel          TEXT,
                decision            TEXT,
                decision_confidence REAL,
                raw_response        TEXT,
                decision_at         TEXT,
                decision_confirmed  INTEGER NOT NULL DEFAULT 0,
                ping_count          INTEGER NOT NULL DEFAULT 0,
                last_ping_at        TEXT,
                CHECK (decision_confirmed = 0 OR decision IS NOT NULL)
            );

            -- Hot lookup paths: inbound routing and sweep scans
            CREATE INDEX IF NOT EXISTS idx_members_campaign ON campaign_members(campaign_id);
            CREATE INDEX IF NOT EXISTS idx_members_identity ON campaign_members(user_identity);
            CREATE INDEX IF NOT EXISTS idx_campaigns_manager ON campaigns(manager_identity, state);",
        )?;
        Ok(())
    }

    // ── Campaigns ────────────────────────────────────────────────────

    /// Create a campaign in `AwaitingRoster` for the given manager.
    pub fn create_campaign(&self, manager_identity: &str) -> Result<i64, rusqlite::Error> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO campaigns (manager_identity, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![
                manager_identity,
                CampaignState::AwaitingRoster.as_str(),
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn campaign(&self, id: i64) -> Result<Option<Campaign>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CAMPAIGN_COLS} FROM campaigns WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], campaign_from_row)?;
        rows.next().transpose()
    }

    /// The one non-terminal campaign for a manager, if any.
    pub fn active_campaign_for_manager(
        &self,
        manager_identity: &str,
    ) -> Result<Option<Campaign>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CAMPAIGN_COLS} FROM campaigns
             WHERE manager_identity = ?1 AND state != 'completed'
             ORDER BY id LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![manager_identity], campaign_from_row)?;
        rows.next().transpose()
    }

    pub fn ongoing_campaigns(&self) -> Result<Vec<Campaign>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CAMPAIGN_COLS} FROM campaigns WHERE state = 'ongoing' ORDER BY id"
        ))?;
        let rows = stmt.query_map([], campaign_from_row)?;
        rows.collect()
    }

    /// Ingest a roster into a campaign in one transaction: bulk member
    /// insert plus the `AwaitingRoster -> AwaitingPrompt` transition.
    /// Duplicate emails are preserved. Returns `None` (fully rolled
    /// back) when the campaign was not in `AwaitingRoster`.
    pub fn ingest_roster(
        &mut self,
        campaign_id: i64,
        rows: &[RosterRow],
    ) -> Result<Option<usize>, rusqlite::Error> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE campaigns SET state = 'awaiting_prompt', updated_at = ?2
             WHERE id = ?1 AND state = 'awaiting_roster'",
            params![campaign_id, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Ok(None); // tx dropped, rolled back
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO campaign_members (campaign_id, contact_email) VALUES (?1, ?2)",
            )?;
            for row in rows {
                stmt.execute(params![campaign_id, row.email.trim()])?;
            }
        }
        tx.commit()?;
        Ok(Some(rows.len()))
    }

    /// `AwaitingPrompt -> Ongoing`: record the prompt, the crafted
    /// outreach text, the ledger reference, and the start timestamp in
    /// one guarded statement. Returns false if the campaign was not in
    /// `AwaitingPrompt`.
    pub fn finalize_campaign(
        &self,
        campaign_id: i64,
        prompt_text: &str,
        crafted_message: &str,
        ledger_reference: &str,
        started_at: DateTime<Utc>,
    ) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE campaigns
             SET state = 'ongoing', prompt_text = ?2, crafted_message = ?3,
                 ledger_reference = ?4, started_at = ?5, updated_at = ?6
             WHERE id = ?1 AND state = 'awaiting_prompt'",
            params![
                campaign_id,
                prompt_text,
                crafted_message,
                ledger_reference,
                started_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// `Ongoing -> Completed`. Returns false if not ongoing.
    pub fn complete_campaign(&self, campaign_id: i64) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE campaigns SET state = 'completed', updated_at = ?2
             WHERE id = ?1 AND state = 'ongoing'",
            params![campaign_id, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_stale_notified(&self, campaign_id: i64) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE campaigns SET stale_notified = 1, updated_at = ?2 WHERE id = ?1",
            params![campaign_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Ongoing campaigns started before `cutoff` that have not yet
    /// received the staleness advisory.
    pub fn stale_ongoing_campaigns(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Campaign>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CAMPAIGN_COLS} FROM campaigns
             WHERE state = 'ongoing' AND stale_notified = 0
               AND started_at IS NOT NULL AND started_at < ?1
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![cutoff.to_rfc3339()], campaign_from_row)?;
        rows.collect()
    }

    // ── Members ──────────────────────────────────────────────────────

    pub fn member(&self, id: i64) -> Result<Option<MemberRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEMBER_COLS} FROM campaign_members WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], member_from_row)?;
        rows.next().transpose()
    }

    pub fn members(&self, campaign_id: i64) -> Result<Vec<MemberRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEMBER_COLS} FROM campaign_members WHERE campaign_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![campaign_id], member_from_row)?;
        rows.collect()
    }

    /// Inbound routing: the member with this messaging identity whose
    /// campaign is currently ongoing, if any.
    pub fn member_for_identity_in_ongoing(
        &self,
        user_identity: &str,
    ) -> Result<Option<MemberRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT m.{} FROM campaign_members m
             JOIN campaigns c ON c.id = m.campaign_id
             WHERE m.user_identity = ?1 AND c.state = 'ongoing'
             ORDER BY m.id LIMIT 1",
            MEMBER_COLS.replace(", ", ", m.")
        ))?;
        let mut rows = stmt.query_map(params![user_identity], member_from_row)?;
        rows.next().transpose()
    }

    pub fn set_member_identity(
        &self,
        member_id: i64,
        user_identity: &str,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE campaign_members SET user_identity = ?2 WHERE id = ?1",
            params![member_id, user_identity],
        )?;
        Ok(())
    }

    pub fn set_member_channel(
        &self,
        member_id: i64,
        dm_channel: &str,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE campaign_members SET dm_channel = ?2 WHERE id = ?1",
            params![member_id, dm_channel],
        )?;
        Ok(())
    }

    /// Record a provisional (unconfirmed) decision: all four decision
    /// fields move together in one statement.
    pub fn record_provisional_decision(
        &self,
        member_id: i64,
        decision: Decision,
        confidence: f64,
        raw_response: &str,
        at: DateTime<Utc>,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE campaign_members
             SET decision = ?2, decision_confidence = ?3, raw_response = ?4,
                 decision_at = ?5, decision_confirmed = 0
             WHERE id = ?1",
            params![
                member_id,
                decision.as_str(),
                confidence,
                raw_response,
                at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Promote the pending decision to confirmed. Guarded: a member
    /// with no decision cannot be confirmed.
    pub fn confirm_decision(&self, member_id: i64) -> Result<bool, rusqlite::Error> {
        let changed = self.conn.execute(
            "UPDATE campaign_members SET decision_confirmed = 1
             WHERE id = ?1 AND decision IS NOT NULL",
            params![member_id],
        )?;
        Ok(changed > 0)
    }

    /// Discard the pending decision: the member returns to undecided
    /// with all decision fields null.
    pub fn reset_decision(&self, member_id: i64) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE campaign_members
             SET decision = NULL, decision_confidence = NULL, raw_response = NULL,
                 decision_at = NULL, decision_confirmed = 0
             WHERE id = ?1",
            params![member_id],
        )?;
        Ok(())
    }

    pub fn record_ping(&self, member_id: i64, at: DateTime<Utc>) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE campaign_members
             SET ping_count = ping_count + 1, last_ping_at = ?2
             WHERE id = ?1",
            params![member_id, at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Members due a reminder: undecided, under the ping cap, last
    /// pinged before `cutoff`, in an ongoing campaign. Members whose
    /// fan-out send never succeeded (last_ping_at null) are excluded;
    /// the next fan-out retry is the sweep's send itself only once a
    /// first ping exists.
    pub fn reminder_candidates(
        &self,
        max_pings: u32,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MemberRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT m.{} FROM campaign_members m
             JOIN campaigns c ON c.id = m.campaign_id
             WHERE c.state = 'ongoing' AND m.decision IS NULL
               AND m.ping_count < ?1
               AND m.last_ping_at IS NOT NULL AND m.last_ping_at < ?2
             ORDER BY m.id",
            MEMBER_COLS.replace(", ", ", m.")
        ))?;
        let rows = stmt.query_map(params![max_pings, cutoff.to_rfc3339()], member_from_row)?;
        rows.collect()
    }

    pub fn member_count(&self, campaign_id: i64) -> Result<u32, rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM campaign_members WHERE campaign_id = ?1",
            params![campaign_id],
            |row| row.get(0),
        )
    }

    pub fn unconfirmed_count(&self, campaign_id: i64) -> Result<u32, rusqlite::Error> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM campaign_members
             WHERE campaign_id = ?1 AND decision_confirmed = 0",
            params![campaign_id],
            |row| row.get(0),
        )
    }

    /// Confirmed decision counts for the completion summary.
    pub fn decision_tally(&self, campaign_id: i64) -> Result<DecisionTally, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT decision, COUNT(*) FROM campaign_members
             WHERE campaign_id = ?1 AND decision_confirmed = 1
             GROUP BY decision",
        )?;
        let rows = stmt.query_map(params![campaign_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;

        let mut tally = DecisionTally::default();
        for row in rows {
            let (decision, count) = row?;
            match Decision::parse(&decision) {
                Some(Decision::Yes) => tally.yes += count,
                Some(Decision::No) => tally.no += count,
                Some(Decision::Unclear) | None => tally.unclear += count,
            }
        }
        Ok(tally)
    }
}

// ── Row mapping ──────────────────────────────────────────────────────

fn parse_ts(idx: usize, raw: String) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_ts_opt(idx: usize, raw: Option<String>) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    raw.map(|s| parse_ts(idx, s)).transpose()
}

fn campaign_from_row(row: &Row) -> Result<Campaign, rusqlite::Error> {
    let state_raw: String = row.get(2)?;
    let state = CampaignState::parse(&state_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown campaign state '{state_raw}'").into(),
        )
    })?;
    Ok(Campaign {
        id: row.get(0)?,
        manager_identity: row.get(1)?,
        state,
        prompt_text: row.get(3)?,
        crafted_message: row.get(4)?,
        ledger_reference: row.get(5)?,
        started_at: parse_ts_opt(6, row.get(6)?)?,
        stale_notified: row.get(7)?,
        created_at: parse_ts(8, row.get(8)?)?,
        updated_at: parse_ts(9, row.get(9)?)?,
    })
}

fn member_from_row(row: &Row) -> Result<MemberRecord, rusqlite::Error> {
    let decision_raw: Option<String> = row.get(5)?;
    let decision = match decision_raw {
        Some(raw) => Some(Decision::parse(&raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                Type::Text,
                format!("unknown decision '{raw}'").into(),
            )
        })?),
        None => None,
    };
    Ok(MemberRecord {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        contact_email: row.get(2)?,
        user_identity: row.get(3)?,
        dm_channel: row.get(4)?,
        decision,
        decision_confidence: row.get(6)?,
        raw_response: row.get(7)?,
        decision_at: parse_ts_opt(8, row.get(8)?)?,
        decision_confirmed: row.get(9)?,
        ping_count: row.get(10)?,
        last_ping_at: parse_ts_opt(11, row.get(11)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rows(emails: &[&str]) -> Vec<RosterRow> {
        emails
            .iter()
            .map(|e| RosterRow {
                email: (*e).to_string(),
            })
            .collect()
    }

    fn ongoing_campaign(db: &mut Database, emails: &[&str]) -> i64 {
        let id = db.create_campaign("U_MANAGER").unwrap();
        db.ingest_roster(id, &rows(emails)).unwrap().unwrap();
        assert!(db
            .finalize_campaign(id, "review licenses", "Hi! Still need it?", "sheet-1", Utc::now())
            .unwrap());
        id
    }

    #[test]
    fn campaign_walks_forward_through_states() {
        let mut db = Database::open_memory().unwrap();
        let id = db.create_campaign("U1").unwrap();
        assert_eq!(
            db.campaign(id).unwrap().unwrap().state,
            CampaignState::AwaitingRoster
        );

        db.ingest_roster(id, &rows(&["a@x.com"])).unwrap().unwrap();
        assert_eq!(
            db.campaign(id).unwrap().unwrap().state,
            CampaignState::AwaitingPrompt
        );

        assert!(db
            .finalize_campaign(id, "p", "m", "sheet", Utc::now())
            .unwrap());
        let campaign = db.campaign(id).unwrap().unwrap();
        assert_eq!(campaign.state, CampaignState::Ongoing);
        assert!(campaign.started_at.is_some());
        assert_eq!(campaign.crafted_message.as_deref(), Some("m"));

        assert!(db.complete_campaign(id).unwrap());
        assert_eq!(
            db.campaign(id).unwrap().unwrap().state,
            CampaignState::Completed
        );
    }

    #[test]
    fn guarded_transitions_reject_wrong_state() {
        let mut db = Database::open_memory().unwrap();
        let id = db.create_campaign("U1").unwrap();

        // Finalize before roster: no-op.
        assert!(!db
            .finalize_campaign(id, "p", "m", "sheet", Utc::now())
            .unwrap());
        // Complete before ongoing: no-op.
        assert!(!db.complete_campaign(id).unwrap());

        db.ingest_roster(id, &rows(&["a@x.com"])).unwrap().unwrap();
        // Second ingest is rejected and rolled back entirely.
        assert!(db.ingest_roster(id, &rows(&["b@x.com"])).unwrap().is_none());
        assert_eq!(db.member_count(id).unwrap(), 1);
    }

    #[test]
    fn duplicate_emails_are_preserved() {
        let mut db = Database::open_memory().unwrap();
        let id = db.create_campaign("U1").unwrap();
        db.ingest_roster(id, &rows(&["a@x.com", "b@x.com", "a@x.com"]))
            .unwrap()
            .unwrap();
        let members = db.members(id).unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(
            members.iter().filter(|m| m.contact_email == "a@x.com").count(),
            2
        );
    }

    #[test]
    fn active_campaign_lookup_ignores_completed() {
        let mut db = Database::open_memory().unwrap();
        let first = ongoing_campaign(&mut db, &["a@x.com"]);
        assert_eq!(
            db.active_campaign_for_manager("U_MANAGER").unwrap().unwrap().id,
            first
        );
        db.complete_campaign(first).unwrap();
        assert!(db.active_campaign_for_manager("U_MANAGER").unwrap().is_none());
    }

    #[test]
    fn decision_fields_move_as_one_unit() {
        let mut db = Database::open_memory().unwrap();
        let id = ongoing_campaign(&mut db, &["a@x.com"]);
        let member_id = db.members(id).unwrap()[0].id;

        let at = Utc::now();
        db.record_provisional_decision(member_id, Decision::No, 0.9, "don't need it", at)
            .unwrap();
        let m = db.member(member_id).unwrap().unwrap();
        assert_eq!(m.decision, Some(Decision::No));
        assert_eq!(m.decision_confidence, Some(0.9));
        assert_eq!(m.raw_response.as_deref(), Some("don't need it"));
        assert!(m.decision_at.is_some());
        assert!(!m.decision_confirmed);

        db.reset_decision(member_id).unwrap();
        let m = db.member(member_id).unwrap().unwrap();
        assert_eq!(m.decision, None);
        assert_eq!(m.decision_confidence, None);
        assert_eq!(m.raw_response, None);
        assert_eq!(m.decision_at, None);
    }

    #[test]
    fn confirm_requires_a_decision() {
        let mut db = Database::open_memory().unwrap();
        let id = ongoing_campaign(&mut db, &["a@x.com"]);
        let member_id = db.members(id).unwrap()[0].id;

        assert!(!db.confirm_decision(member_id).unwrap());

        db.record_provisional_decision(member_id, Decision::Yes, 0.9, "yes", Utc::now())
            .unwrap();
        assert!(db.confirm_decision(member_id).unwrap());
        assert!(db.member(member_id).unwrap().unwrap().decision_confirmed);
    }

    #[test]
    fn check_constraint_blocks_confirmed_without_decision() {
        let mut db = Database::open_memory().unwrap();
        let id = ongoing_campaign(&mut db, &["a@x.com"]);
        let member_id = db.members(id).unwrap()[0].id;
        let result = db.conn().execute(
            "UPDATE campaign_members SET decision_confirmed = 1 WHERE id = ?1",
            params![member_id],
        );
        assert!(result.is_err());
    }

    #[test]
    fn reminder_candidates_respect_all_bounds() {
        let mut db = Database::open_memory().unwrap();
        let id = ongoing_campaign(&mut db, &["a@x.com", "b@x.com", "c@x.com", "d@x.com"]);
        let members = db.members(id).unwrap();
        let old = Utc::now() - Duration::hours(48);

        // a: pinged long ago, no decision -> due
        db.record_ping(members[0].id, old).unwrap();
        // b: at the ping cap -> never due
        for _ in 0..3 {
            db.record_ping(members[1].id, old).unwrap();
        }
        // c: has a decision -> never due
        db.record_ping(members[2].id, old).unwrap();
        db.record_provisional_decision(members[2].id, Decision::Yes, 0.9, "yes", Utc::now())
            .unwrap();
        // d: pinged just now -> not yet due
        db.record_ping(members[3].id, Utc::now()).unwrap();

        let cutoff = Utc::now() - Duration::hours(24);
        let due = db.reminder_candidates(3, cutoff).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, members[0].id);
    }

    #[test]
    fn reminder_candidates_skip_non_ongoing_campaigns() {
        let mut db = Database::open_memory().unwrap();
        let id = ongoing_campaign(&mut db, &["a@x.com"]);
        let member_id = db.members(id).unwrap()[0].id;
        db.record_ping(member_id, Utc::now() - Duration::hours(48))
            .unwrap();
        db.complete_campaign(id).unwrap();

        let due = db
            .reminder_candidates(3, Utc::now() - Duration::hours(24))
            .unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn tally_counts_confirmed_only() {
        let mut db = Database::open_memory().unwrap();
        let id = ongoing_campaign(&mut db, &["a@x.com", "b@x.com", "c@x.com"]);
        let members = db.members(id).unwrap();

        db.record_provisional_decision(members[0].id, Decision::Yes, 0.9, "yes", Utc::now())
            .unwrap();
        db.confirm_decision(members[0].id).unwrap();
        db.record_provisional_decision(members[1].id, Decision::No, 0.9, "no", Utc::now())
            .unwrap();
        db.confirm_decision(members[1].id).unwrap();
        // c stays provisional: not counted.
        db.record_provisional_decision(members[2].id, Decision::No, 0.9, "no", Utc::now())
            .unwrap();

        let tally = db.decision_tally(id).unwrap();
        assert_eq!(tally.yes, 1);
        assert_eq!(tally.no, 1);
        assert_eq!(tally.unclear, 0);
        assert_eq!(db.unconfirmed_count(id).unwrap(), 1);
    }

    #[test]
    fn stale_query_is_one_shot() {
        let mut db = Database::open_memory().unwrap();
        let id = db.create_campaign("U1").unwrap();
        db.ingest_roster(id, &rows(&["a@x.com"])).unwrap().unwrap();
        db.finalize_campaign(id, "p", "m", "sheet", Utc::now() - Duration::days(10))
            .unwrap();

        let cutoff = Utc::now() - Duration::days(7);
        assert_eq!(db.stale_ongoing_campaigns(cutoff).unwrap().len(), 1);
        db.mark_stale_notified(id).unwrap();
        assert!(db.stale_ongoing_campaigns(cutoff).unwrap().is_empty());
    }

    #[test]
    fn data_survives_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reclaim.db");

        let campaign_id = {
            let mut db = Database::open_at(&path).unwrap();
            ongoing_campaign(&mut db, &["a@x.com"])
        };

        let db = Database::open_at(&path).unwrap();
        let campaign = db.campaign(campaign_id).unwrap().unwrap();
        assert_eq!(campaign.state, CampaignState::Ongoing);
        assert_eq!(db.member_count(campaign_id).unwrap(), 1);
    }

    #[test]
    fn routing_lookup_requires_ongoing_campaign() {
        let mut db = Database::open_memory().unwrap();
        let id = ongoing_campaign(&mut db, &["a@x.com"]);
        let member_id = db.members(id).unwrap()[0].id;
        db.set_member_identity(member_id, "U_AAA").unwrap();

        assert_eq!(
            db.member_for_identity_in_ongoing("U_AAA").unwrap().unwrap().id,
            member_id
        );
        db.complete_campaign(id).unwrap();
        assert!(db.member_for_identity_in_ongoing("U_AAA").unwrap().is_none());
    }
}
