// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for front-end updates.

use crate::models::{AppState, ScanResult, SyncDirection};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events let a front end follow long sync operations without polling.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A scan of the installation finished
    ScanCompleted {
        versions: usize,
        characters: usize,
    },

    /// A sync operation has started
    SyncStarted {
        direction: SyncDirection,
    },

    /// A sync operation has finished
    SyncFinished {
        direction: SyncDirection,
        success: bool,
        message: String,
    },

    /// Current operation has changed
    OperationChanged {
        operation: String,
    },

    /// A pull stopped on a merge conflict
    ConflictDetected,

    /// The pending conflict was resolved
    ConflictResolved,
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
pub struct StateManager {
    /// The application state protected by RwLock for thread-safe access
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100 event buffer
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Clone of the current state, safe to use without holding locks.
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_syncing);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, then emits one event per
    /// detected change. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.last_scan != new.last_scan {
            if let Some(scan) = &new.last_scan {
                changes.push(StateChange::ScanCompleted {
                    versions: scan.versions.len(),
                    characters: scan.characters.len(),
                });
            }
        }

        if old.is_syncing != new.is_syncing {
            if new.is_syncing {
                if let Some(direction) = new.current_direction {
                    changes.push(StateChange::SyncStarted { direction });
                }
            } else if let Some(direction) = old.current_direction {
                changes.push(StateChange::SyncFinished {
                    direction,
                    success: new.completed_syncs > old.completed_syncs,
                    message: new.last_outcome.clone().unwrap_or_default(),
                });
            }
        }

        if old.current_operation != new.current_operation && !new.current_operation.is_empty() {
            changes.push(StateChange::OperationChanged {
                operation: new.current_operation.clone(),
            });
        }

        if old.conflict_pending != new.conflict_pending {
            if new.conflict_pending {
                changes.push(StateChange::ConflictDetected);
            } else {
                changes.push(StateChange::ConflictResolved);
            }
        }

        changes
    }

    // Convenience methods for common state updates

    /// Record a finished scan
    pub fn set_scan(&self, scan: ScanResult) -> Vec<StateChange> {
        self.update(|state| state.last_scan = Some(scan))
    }

    /// Mark a sync operation as started
    pub fn begin_sync(&self, direction: SyncDirection) -> Vec<StateChange> {
        self.update(|state| {
            state.is_syncing = true;
            state.current_direction = Some(direction);
            state.current_operation = format!("Starting {direction}...");
        })
    }

    /// Update the human readable current operation
    pub fn set_operation(&self, operation: impl Into<String>) -> Vec<StateChange> {
        let operation = operation.into();
        self.update(|state| state.current_operation = operation)
    }

    /// Mark the running sync as finished
    pub fn finish_sync(&self, outcome: impl Into<String>, success: bool) -> Vec<StateChange> {
        let outcome = outcome.into();
        self.update(|state| state.finish_sync(outcome, success))
    }

    pub fn set_conflict_pending(&self, pending: bool) -> Vec<StateChange> {
        self.update(|state| state.conflict_pending = pending)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
