//! Services module - the sync engine.
//!
//! Everything here is framework-agnostic: no terminal I/O, only filesystem
//! and git work with explicit inputs and typed outcomes.
//!
//! # Components
//!
//! - [`scan`]: discovers versions, accounts, realms and characters in an installation
//! - [`filter`]: depth-aware exclusion rules for the settings tree ([`DirContext`], [`TreeFilter`])
//! - [`copy`]: the differential copy engine ([`sync_tree`], [`fresh_copy`], [`differential_copy`])
//! - [`auth`]: lazy credential resolution for the git remote ([`CredentialResolver`])
//! - [`git`]: repository lifecycle, pull, push and conflict resolution ([`GitAdapter`])
//! - [`sync`]: the [`SyncOrchestrator`] that sequences all of the above
//!
//! # Data flow
//!
//! ```text
//! pull:  remote --git--> repo/<version>/{WTF,AddOns} --copy(Preserve)--> <wow>/<version>/...
//! push:  <wow>/<version>/... --copy(Prune)--> repo/<version>/{WTF,AddOns} --git--> remote
//! ```

pub mod auth;
pub mod copy;
pub mod filter;
pub mod git;
pub mod scan;
pub mod sync;

pub use auth::{CredentialResolver, TokenPrompt};
pub use copy::{CopyStats, ExcludedPolicy, differential_copy, fresh_copy, sync_tree};
pub use filter::{DirContext, EntryInfo, TreeFilter};
pub use git::{ConflictResolution, GitAdapter, PullOutcome, PushOutcome, RepositoryHandle};
pub use scan::{scan_installation, sync_paths};
pub use sync::{PullReport, PushReport, SyncContext, SyncOrchestrator};
