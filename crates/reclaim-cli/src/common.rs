//! Shared wiring for CLI commands: config, store, and the external
//! capabilities assembled into the core components.

use std::sync::Arc;

use reclaim_core::intake::EventRouter;
use reclaim_core::lifecycle::CampaignLifecycle;
use reclaim_core::outreach::Outreach;
use reclaim_core::protocol::{KeyedLocks, ResponseProtocol};
use reclaim_core::storage::{shared, Config, Database, SharedDb};
use reclaim_core::{LlmCrafter, ResponseClassifier, SheetLedger, SlackMessenger};

pub struct App {
    pub config: Config,
    pub db: SharedDb,
    pub lifecycle: Arc<CampaignLifecycle>,
    pub outreach: Arc<Outreach>,
    pub router: Arc<EventRouter>,
}

/// Build the full component stack from the on-disk config.
pub fn build() -> Result<App, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = shared(Database::open()?);
    let locks = Arc::new(KeyedLocks::new());

    let messenger = Arc::new(SlackMessenger::new(
        config.slack_token()?,
        config.timeouts.send(),
    ));
    let ledger = Arc::new(SheetLedger::new(
        config.sheets_token()?,
        config.timeouts.send(),
    ));
    let classifier = Arc::new(ResponseClassifier::new(
        config.llm_api_key(),
        config.llm.model.clone(),
        config.timeouts.classify(),
    ));
    let crafter = Arc::new(LlmCrafter::new(
        config.llm_api_key(),
        config.llm.model.clone(),
        config.timeouts.classify(),
    ));

    let lifecycle = Arc::new(CampaignLifecycle::new(
        db.clone(),
        messenger.clone(),
        crafter,
        ledger.clone(),
    ));
    let outreach = Arc::new(Outreach::new(
        db.clone(),
        messenger.clone(),
        lifecycle.clone(),
        locks.clone(),
        config.campaign,
    ));
    let protocol = Arc::new(ResponseProtocol::new(
        db.clone(),
        classifier,
        messenger.clone(),
        ledger,
        locks,
        config.timeouts.send(),
    ));
    let router = Arc::new(EventRouter::new(
        db.clone(),
        messenger,
        lifecycle.clone(),
        outreach.clone(),
        protocol,
    ));

    Ok(App {
        config,
        db,
        lifecycle,
        outreach,
        router,
    })
}
