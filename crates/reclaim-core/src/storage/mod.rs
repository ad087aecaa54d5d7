mod config;
pub mod database;

pub use config::{CampaignPolicy, Config, TimeoutsConfig};
pub use database::Database;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Returns `~/.config/reclaim[-dev]/` based on RECLAIM_ENV.
///
/// Set RECLAIM_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("RECLAIM_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("reclaim-dev")
    } else {
        base_dir.join("reclaim")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Shared handle to the roster store.
///
/// The store is the single source of truth and the synchronization
/// boundary: components lock it per operation and never hold the
/// guard across an await point.
pub type SharedDb = Arc<Mutex<Database>>;

pub fn shared(db: Database) -> SharedDb {
    Arc::new(Mutex::new(db))
}

/// Lock the store, recovering from a poisoned mutex. A writer that
/// panicked mid-operation left only a single-statement or rolled-back
/// transaction behind, so the data itself stays consistent.
pub fn lock(db: &SharedDb) -> MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
