//! Per-member mutation locks.
//!
//! Inbound handling, reminder pings, and fan-out sends may all touch
//! the same member concurrently. Each member gets its own async mutex
//! so mutations to one member serialize without stalling the rest of
//! the roster.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

/// Registry of per-member async locks, keyed by member id.
///
/// Entries are created on demand and live for the process lifetime;
/// rosters are small enough that the map is never reaped.
#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for one member. Clone the Arc out so the registry
    /// mutex is released before anyone awaits the member lock.
    pub fn lock_for(&self, member_id: i64) -> Arc<AsyncMutex<()>> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(member_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_same_lock() {
        let locks = KeyedLocks::new();
        let a = locks.lock_for(1);
        let b = locks.lock_for(1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_keys_are_independent() {
        let locks = KeyedLocks::new();
        let a = locks.lock_for(1);
        let b = locks.lock_for(2);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn holding_one_member_lock_does_not_block_another() {
        let locks = KeyedLocks::new();
        let a = locks.lock_for(1);
        let _held = a.lock().await;
        let b = locks.lock_for(2);
        assert!(b.try_lock().is_ok());
        assert!(locks.lock_for(1).try_lock().is_err());
    }
}
