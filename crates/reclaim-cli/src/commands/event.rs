use clap::Subcommand;
use reclaim_core::intake::InboundEvent;

use crate::common;

#[derive(Subcommand)]
pub enum EventAction {
    /// Route one inbound chat message through the event router
    Inject {
        /// Sender's messaging identity
        source: String,
        /// Channel the message arrived in
        channel: String,
        /// Message text
        text: String,
    },
}

pub async fn run(action: EventAction) -> Result<(), Box<dyn std::error::Error>> {
    let app = common::build()?;

    match action {
        EventAction::Inject {
            source,
            channel,
            text,
        } => {
            app.router
                .route(InboundEvent::message(&source, &channel, &text))
                .await?;
            println!("event routed");
        }
    }
    Ok(())
}
