use clap::{Parser, Subcommand};

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "reclaim-cli", version, about = "Reclaim license campaign CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Campaign management
    Campaign {
        #[command(subcommand)]
        action: commands::campaign::CampaignAction,
    },
    /// One-off maintenance sweeps
    Sweep {
        #[command(subcommand)]
        action: commands::sweep::SweepAction,
    },
    /// Inbound event handling
    Event {
        #[command(subcommand)]
        action: commands::event::EventAction,
    },
    /// Run the recurring sweep loop until interrupted
    Run,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Campaign { action } => commands::campaign::run(action).await,
        Commands::Sweep { action } => commands::sweep::run(action).await,
        Commands::Event { action } => commands::event::run(action).await,
        Commands::Run => commands::service::run().await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
