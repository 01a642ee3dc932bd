//! Data models for WoW Sync.
//!
//! - [`GameVersion`], [`CharacterRef`], [`SyncPath`], [`ScanResult`]: what a scan of the
//!   installation finds and which trees take part in a sync pass
//! - [`Selection`]: the persisted choice of characters to sync, with an explicit
//!   "nothing chosen yet, sync everything" state
//! - [`AppConfig`]: user settings loaded from `config.json`
//! - [`AppState`]: runtime state shared through [`StateManager`](crate::state::StateManager)

pub mod app_state;
pub mod config;
pub mod game;
pub mod selection;

pub use app_state::{AppState, MAX_CONCURRENT_SYNC_OPERATIONS, SyncDirection};
pub use config::{AppConfig, SyncSettings, validate_repo_url};
pub use game::{CharacterRef, ContentKind, GameVersion, ScanResult, SyncPath};
pub use selection::{ExplicitSelection, RealmCharacters, Selection};
