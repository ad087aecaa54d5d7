use clap::Subcommand;
use reclaim_core::intake::parse_roster;
use reclaim_core::storage::lock;

use crate::common;

#[derive(Subcommand)]
pub enum CampaignAction {
    /// Create a campaign for a manager (runs the role check)
    Create {
        /// Manager's messaging identity (e.g. a Slack user id)
        manager: String,
    },
    /// Attach a roster file (one email per line or CSV)
    Roster {
        campaign_id: i64,
        /// Path to the roster file
        file: std::path::PathBuf,
    },
    /// Craft the outreach message, initialize the ledger, go ongoing,
    /// and fan out the initial messages
    Finalize {
        campaign_id: i64,
        /// Free-text task description for message crafting
        prompt: String,
        /// Ledger sheet id or URL
        ledger: String,
    },
    /// Show a campaign with its member states and tally
    Status { campaign_id: i64 },
    /// Complete the campaign if every member has confirmed
    Complete { campaign_id: i64 },
}

pub async fn run(action: CampaignAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = common::build()?;

    match action {
        CampaignAction::Create { manager } => {
            let id = app.lifecycle.begin_setup(&manager).await?;
            println!("campaign {id} created, awaiting roster");
        }
        CampaignAction::Roster { campaign_id, file } => {
            let raw = std::fs::read_to_string(&file)?;
            let rows = parse_roster(&raw);
            let count = app.lifecycle.ingest_roster(campaign_id, &rows)?;
            println!("roster ingested: {count} members, awaiting prompt");
        }
        CampaignAction::Finalize {
            campaign_id,
            prompt,
            ledger,
        } => {
            let crafted = app
                .lifecycle
                .finalize_setup(campaign_id, &prompt, &ledger)
                .await?;
            println!("outreach message: {crafted}");
            let stats = app.outreach.send_initial_messages(campaign_id).await?;
            println!(
                "fan-out: {} sent, {} failed, {} skipped",
                stats.sent, stats.failed, stats.skipped
            );
        }
        CampaignAction::Status { campaign_id } => {
            let (campaign, members, tally) = {
                let db = lock(&app.db);
                let campaign = db
                    .campaign(campaign_id)?
                    .ok_or_else(|| format!("campaign {campaign_id} not found"))?;
                (
                    campaign,
                    db.members(campaign_id)?,
                    db.decision_tally(campaign_id)?,
                )
            };
            println!("{}", serde_json::to_string_pretty(&campaign)?);
            println!("{}", serde_json::to_string_pretty(&members)?);
            println!("confirmed tally: {}", serde_json::to_string(&tally)?);
        }
        CampaignAction::Complete { campaign_id } => {
            if app.lifecycle.attempt_completion(campaign_id).await? {
                println!("campaign {campaign_id} completed");
            } else {
                println!("campaign {campaign_id} is not ready to complete");
            }
        }
    }
    Ok(())
}
