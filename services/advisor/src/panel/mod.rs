pub mod orchestrator;
pub mod session;
pub mod snapshot;
pub mod state;

// Re-export the pieces the web layer and binary wire together.
pub use orchestrator::AdvicePanel;
pub use session::{LinkCompletion, SessionManager};
pub use snapshot::SnapshotStore;
pub use state::{PanelMode, PanelState, FREE_LIMIT};
