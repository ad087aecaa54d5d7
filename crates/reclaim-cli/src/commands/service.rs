use crate::common;

/// Run the recurring sweep loop until Ctrl-C.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let app = common::build()?;
    tracing::info!(
        interval_hours = app.config.campaign.reminder_interval_hours,
        "sweep loop starting"
    );

    tokio::select! {
        _ = app.outreach.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
    Ok(())
}
