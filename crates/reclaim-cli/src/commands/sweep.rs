use clap::Subcommand;

use crate::common;

#[derive(Subcommand)]
pub enum SweepAction {
    /// Send due reminder pings
    Reminders,
    /// Send staleness advisories for long-running campaigns
    Stale,
    /// One full maintenance pass (reminders, staleness, completion)
    Once,
}

pub async fn run(action: SweepAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = common::build()?;

    match action {
        SweepAction::Reminders => {
            let sent = app.outreach.sweep_reminders().await?;
            println!("{sent} reminders sent");
        }
        SweepAction::Stale => {
            let notified = app.outreach.sweep_stale_campaigns().await?;
            println!("{notified} managers advised");
        }
        SweepAction::Once => {
            app.outreach.run_once().await?;
            println!("maintenance pass finished");
        }
    }
    Ok(())
}
