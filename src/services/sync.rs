//! Sync orchestrator.
//!
//! Sequences scan, filtering, the copy engine and the git adapter into the
//! two user-facing directions:
//!
//! - **pull and apply**: remote → repository → game installation
//! - **collect and push**: game installation → repository → remote
//!
//! Only one operation runs at a time. The blocking work runs on tokio's
//! blocking pool and every call re-derives paths and filters from the
//! [`SyncContext`].

use crate::error::{Result, SyncError};
use crate::logging::SyncLog;
use crate::metrics::Metrics;
use crate::models::{
    AppConfig, ContentKind, GameVersion, MAX_CONCURRENT_SYNC_OPERATIONS, ScanResult, SyncDirection,
    SyncSettings,
};
use crate::services::auth::CredentialResolver;
use crate::services::copy::{CopyStats, ExcludedPolicy, sync_tree};
use crate::services::filter::TreeFilter;
use crate::services::git::{ConflictResolution, GitAdapter, PullOutcome, PushOutcome};
use crate::services::scan::{scan_installation, sync_paths};
use crate::state::StateManager;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Everything a sync pass reads from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncContext {
    pub wow_path: Utf8PathBuf,
    pub repo_path: Utf8PathBuf,
    pub repo_url: String,
    pub settings: SyncSettings,
}

impl SyncContext {
    /// Build a context from configuration, failing on configuration errors.
    pub fn from_config(config: &AppConfig, repo_path: impl Into<Utf8PathBuf>) -> Result<Self> {
        config.validate()?;
        let context = Self {
            wow_path: config
                .wow_path()
                .ok_or(SyncError::MissingInstallPath)?
                .to_path_buf(),
            repo_path: repo_path.into(),
            repo_url: config.git_repo_url.trim().to_string(),
            settings: config.sync_settings(),
        };
        Ok(context)
    }

    pub fn validate(&self) -> Result<()> {
        if self.wow_path.as_str().trim().is_empty() {
            return Err(SyncError::MissingInstallPath);
        }
        crate::models::validate_repo_url(&self.repo_url)?;
        Ok(())
    }

    /// `<repo>/<version>/<WTF|AddOns>`
    pub fn repo_dir(&self, version: GameVersion, kind: ContentKind) -> Utf8PathBuf {
        self.repo_path
            .join(version.dir_name())
            .join(kind.repo_dir_name())
    }

    /// `<wow>/<version>/<WTF|Interface/AddOns>`
    pub fn install_dir(&self, version: GameVersion, kind: ContentKind) -> Utf8PathBuf {
        self.wow_path
            .join(version.dir_name())
            .join(kind.install_rel_path())
    }
}

/// What a pull did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullReport {
    pub outcome: PullOutcome,
    pub applied: CopyStats,
}

/// What a push did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushReport {
    pub outcome: PushOutcome,
    pub collected: CopyStats,
}

impl PushReport {
    pub fn pushed(&self) -> bool {
        self.outcome == PushOutcome::Pushed
    }
}

/// The blocking half of the orchestrator. Cheap to clone into a task.
#[derive(Clone)]
struct SyncJob {
    context: SyncContext,
    credentials: Arc<CredentialResolver>,
    log: SyncLog,
    metrics: Arc<Metrics>,
}

impl SyncJob {
    fn adapter(&self) -> GitAdapter {
        GitAdapter::new(
            self.context.repo_path.clone(),
            self.context.repo_url.clone(),
            Arc::clone(&self.credentials),
            self.log.clone(),
        )
    }

    fn init_repository(&self) -> Result<()> {
        self.adapter().init_or_clone()?;
        Ok(())
    }

    fn pull_and_apply(&self) -> Result<PullReport> {
        let adapter = self.adapter();
        let handle = adapter.init_or_clone()?;

        self.log.log("Pulling from remote repository...");
        let outcome = adapter.pull(&handle)?;
        self.metrics.record_pull();

        let applied = self.apply_repo_to_game()?;
        Ok(PullReport { outcome, applied })
    }

    fn collect_and_push(&self, force: bool) -> Result<PushReport> {
        let adapter = self.adapter();
        let handle = adapter.init_or_clone()?;

        let collected = self.collect_into_repo()?;

        self.log.log("Pushing to remote repository...");
        let outcome = adapter.push(&handle, force)?;
        match outcome {
            PushOutcome::Pushed => self.metrics.record_push(),
            PushOutcome::NothingToPush => self.metrics.record_nothing_to_push(),
        }
        Ok(PushReport { outcome, collected })
    }

    fn resolve_conflict(&self, resolution: ConflictResolution) -> Result<CopyStats> {
        let adapter = self.adapter();
        let handle = adapter.init_or_clone()?;
        adapter.resolve_conflict(&handle, resolution)?;

        match resolution {
            ConflictResolution::UseRemote => self.apply_repo_to_game(),
            ConflictResolution::KeepLocal => {
                self.log
                    .log("Local side kept; push with force to overwrite the remote");
                Ok(CopyStats::default())
            }
        }
    }

    /// Repository → installation for every enabled version installed locally.
    fn apply_repo_to_game(&self) -> Result<CopyStats> {
        let context = &self.context;
        let mut total = CopyStats::default();

        for &version in &context.settings.enabled_versions {
            if !context.wow_path.join(version.dir_name()).is_dir() {
                tracing::debug!("{} is not installed, skipping", version);
                continue;
            }

            for kind in [ContentKind::Settings, ContentKind::Addons] {
                let src = context.repo_dir(version, kind);
                if !src.is_dir() {
                    continue;
                }
                let dst = context.install_dir(version, kind);
                let filter = TreeFilter::for_sync(kind, version, &context.settings);

                self.log_copy(version, kind, &filter, "Applying", "to game");
                let stats = sync_tree(&src, &dst, &filter, ExcludedPolicy::Preserve)?;
                self.metrics.record_copy(&stats);
                total += stats;
            }
        }

        self.log_totals(&total);
        Ok(total)
    }

    /// Installation → repository for every enabled, present sync path.
    fn collect_into_repo(&self) -> Result<CopyStats> {
        let context = &self.context;
        let mut total = CopyStats::default();

        for path in sync_paths(&context.wow_path, &context.settings.enabled_versions) {
            let dst = context.repo_dir(path.version, path.kind);
            let filter = TreeFilter::for_sync(path.kind, path.version, &context.settings);

            self.log_copy(path.version, path.kind, &filter, "Collecting", "into repository");
            let stats = sync_tree(&path.source, &dst, &filter, ExcludedPolicy::Prune)?;
            self.metrics.record_copy(&stats);
            total += stats;
        }

        self.log_totals(&total);
        Ok(total)
    }

    fn log_copy(
        &self,
        version: GameVersion,
        kind: ContentKind,
        filter: &TreeFilter,
        verb: &str,
        target: &str,
    ) {
        let filters = filter.describe();
        if filters.is_empty() {
            self.log.log(format!("{verb} {version} {kind} {target}"));
        } else {
            self.log.log(format!(
                "{verb} {version} {kind} {target} ({})",
                filters.join(", ")
            ));
        }
    }

    fn log_totals(&self, stats: &CopyStats) {
        self.log.log(format!(
            "{} file(s) copied, {} updated, {} unchanged, {} deleted",
            stats.files_copied,
            stats.files_updated,
            stats.files_unchanged,
            stats.files_deleted + stats.dirs_removed
        ));
    }
}

/// Runs sync operations one at a time and reports them to the state manager.
pub struct SyncOrchestrator {
    job: SyncJob,
    state: Arc<StateManager>,
    /// One permit per operation allowed to touch the working tree
    in_flight: Semaphore,
}

impl SyncOrchestrator {
    pub fn new(
        context: SyncContext,
        credentials: Arc<CredentialResolver>,
        log: SyncLog,
        state: Arc<StateManager>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            job: SyncJob {
                context,
                credentials,
                log,
                metrics,
            },
            state,
            in_flight: Semaphore::new(MAX_CONCURRENT_SYNC_OPERATIONS),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.job.context
    }

    pub fn repo_path(&self) -> &Utf8Path {
        &self.job.context.repo_path
    }

    /// Discover versions, accounts and characters in the installation.
    pub async fn scan(&self) -> Result<ScanResult> {
        let wow_path = self.job.context.wow_path.clone();
        let scan = tokio::task::spawn_blocking(move || scan_installation(&wow_path))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))??;
        self.state.set_scan(scan.clone());
        Ok(scan)
    }

    /// Create or open the local repository.
    pub async fn init_repository(&self) -> Result<()> {
        self.run(SyncDirection::Init, |job| job.init_repository(), |_| {
            "Repository ready".to_string()
        })
        .await
    }

    /// Pull the remote and apply the repository to the installation.
    ///
    /// A merge conflict is returned as [`SyncError::Conflict`] and marks the
    /// state as waiting for [`SyncOrchestrator::resolve_conflict`].
    pub async fn pull_and_apply(&self) -> Result<PullReport> {
        self.run(SyncDirection::Pull, |job| job.pull_and_apply(), |report| {
            report.outcome.to_string()
        })
        .await
    }

    /// Collect the installation into the repository and push it.
    ///
    /// Returns whether a commit was pushed.
    pub async fn collect_and_push(&self, force: bool) -> Result<bool> {
        let report = self
            .run(
                SyncDirection::Push,
                move |job| job.collect_and_push(force),
                |report| match report.outcome {
                    PushOutcome::Pushed => "Push completed".to_string(),
                    PushOutcome::NothingToPush => "Nothing to push".to_string(),
                },
            )
            .await?;
        Ok(report.pushed())
    }

    /// Settle a pending conflict; with [`ConflictResolution::UseRemote`] the
    /// repository is applied to the installation afterwards.
    pub async fn resolve_conflict(&self, resolution: ConflictResolution) -> Result<CopyStats> {
        let stats = self
            .run(
                SyncDirection::Resolve,
                move |job| job.resolve_conflict(resolution),
                move |_| format!("Conflict resolved ({resolution})"),
            )
            .await?;
        self.state.set_conflict_pending(false);
        Ok(stats)
    }

    async fn run<T, F, M>(&self, direction: SyncDirection, work: F, describe: M) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SyncJob) -> Result<T> + Send + 'static,
        M: FnOnce(&T) -> String + Send,
    {
        let _permit = self
            .in_flight
            .try_acquire()
            .map_err(|_| SyncError::SyncInProgress)?;

        self.job.context.validate()?;

        self.state.begin_sync(direction);
        let started = Instant::now();

        let job = self.job.clone();
        let result = tokio::task::spawn_blocking(move || work(&job))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))
            .and_then(|r| r);

        self.job.metrics.record_sync_time(started.elapsed());

        match &result {
            Ok(value) => {
                self.state.finish_sync(describe(value), true);
            }
            Err(SyncError::Conflict) => {
                self.job.metrics.record_conflict();
                self.state.set_conflict_pending(true);
                self.state.finish_sync("Merge conflict", false);
            }
            Err(e) => {
                tracing::error!("{} failed: {}", direction, e);
                self.job.metrics.record_failure();
                self.state.finish_sync(e.to_string(), false);
            }
        }
        result
    }
}
