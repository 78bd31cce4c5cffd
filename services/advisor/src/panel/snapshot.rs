//! services/advisor/src/panel/snapshot.rs
//!
//! Persists the previous run's snapshot through the durable key-value
//! store so comparisons survive reloads. Holds at most one snapshot:
//! writes overwrite, there is no history.

use maker_price_core::domain::Snapshot;
use maker_price_core::ports::KeyValueStore;
use std::sync::Arc;
use tracing::debug;

/// Durable key for the comparison snapshot.
const PREV_SNAPSHOT_KEY: &str = "ixia_makerprice_prev_snapshot_v1";

/// The single-slot snapshot store. All operations are fail-safe: a failed
/// read is `None` and a failed write is dropped (and logged).
pub struct SnapshotStore {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn read(&self) -> Option<Snapshot> {
        let raw = self.store.get(PREV_SNAPSHOT_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!("Ignoring unreadable snapshot: {}", e);
                None
            }
        }
    }

    pub fn write(&self, snapshot: &Snapshot) {
        match serde_json::to_string(snapshot) {
            Ok(raw) => self.store.set(PREV_SNAPSHOT_KEY, &raw),
            Err(e) => debug!("Failed to encode snapshot: {}", e),
        }
    }

    pub fn clear(&self) {
        self.store.remove(PREV_SNAPSHOT_KEY);
    }
}
