//! services/advisor/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::panel::AdvicePanel;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The shared application state, created once at startup and passed to all
/// handlers.
///
/// The advice panel sits behind a lock: its operations are single-flight by
/// design, and mutating handlers take the lock with `try_lock` so a second
/// concurrent operation reports busy instead of queueing a duplicate.
pub struct AppState {
    pub config: Arc<Config>,
    pub panel: Mutex<AdvicePanel>,
}
