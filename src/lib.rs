// WoW Sync - keeps World of Warcraft settings and addons in a git repository
//
// This is the library crate containing the sync engine and data structures.
// The binary crate (main.rs) provides the command-line entry point.

pub mod cli;
pub mod config;
pub mod error;
pub mod instance;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use error::{Result, SyncError};
pub use instance::InstanceLock;
pub use metrics::Metrics;
pub use models::{AppConfig, AppState, CharacterRef, GameVersion, Selection, SyncSettings};
pub use services::{ConflictResolution, SyncContext, SyncOrchestrator};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
