use crate::models::game::ScanResult;
use std::fmt;

/// Maximum number of sync operations touching the working tree at once.
///
/// **IMPORTANT:** This is 1 because the repository working tree is shared
/// mutable state. A second pull/push running against it can lose updates or
/// corrupt the repository. Enforced by [`crate::services::SyncOrchestrator`].
pub const MAX_CONCURRENT_SYNC_OPERATIONS: usize = 1;

/// Which way a sync operation moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Create or open the local repository only
    Init,
    /// Remote → repository → game installation
    Pull,
    /// Game installation → repository → remote
    Push,
    /// Conflict resolution after a failed pull
    Resolve,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncDirection::Init => "init",
            SyncDirection::Pull => "pull",
            SyncDirection::Push => "push",
            SyncDirection::Resolve => "resolve",
        };
        f.write_str(name)
    }
}

/// Runtime state shared between the front end and the orchestrator.
///
/// Wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`]; never
/// mutate it directly, use [`update()`](crate::state::StateManager::update).
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Latest scan of the installation
    pub last_scan: Option<ScanResult>,

    // Runtime state
    pub is_syncing: bool,
    pub current_direction: Option<SyncDirection>,
    pub current_operation: String,

    // A pull stopped on a merge conflict that still needs a decision
    pub conflict_pending: bool,

    // Results
    pub last_outcome: Option<String>,
    pub completed_syncs: usize,
    pub failed_syncs: usize,
}

impl AppState {
    /// Number of characters found by the last scan.
    pub fn scanned_character_count(&self) -> usize {
        self.last_scan.as_ref().map_or(0, |s| s.characters.len())
    }

    /// Reset runtime state after an operation ends.
    pub fn finish_sync(&mut self, outcome: String, success: bool) {
        self.is_syncing = false;
        self.current_direction = None;
        self.current_operation.clear();
        self.last_outcome = Some(outcome);
        if success {
            self.completed_syncs += 1;
        } else {
            self.failed_syncs += 1;
        }
    }
}
