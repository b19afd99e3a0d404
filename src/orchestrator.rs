//! # Backup Orchestration
//!
//! Drives a whole backup run: for every repository descriptor it
//! synchronizes the working copy, archives the default branch, finds
//! recently active branches and archives their changed files. Disk space is
//! checked before the first repository and after each one.
//!
//! ## Per-repository flow
//!
//! ```text
//! Pending -> Syncing -> SyncFailed (terminal)
//!                    -> Synced -> ArchivingDefault -> DefaultArchived | ArchiveDefaultFailed
//!                              -> ScanningBranches -> ArchivingBranches -> Done
//! ```
//!
//! Failures are contained to the repository (or branch) they occur in. The
//! only run-level failure is a free-space check falling below the minimum,
//! which stops any further repository from starting.
//!
//! ## Concurrency
//!
//! With `jobs > 1`, repositories are processed on a bounded rayon pool. Each
//! repository owns its working copy and output subtree, so no two workers
//! touch the same checkout. Branches of one repository are always archived
//! sequentially. Workers share a `RunReport` of atomic counters and an abort
//! flag; post-repository space checks are serialized by a mutex.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::archive::{
    Archive, ArchiveBuilder, ArchiveKind, Archiver, ZipArchiver, TIMESTAMP_FORMAT,
};
use crate::config::BackupConfig;
use crate::descriptor::RepositoryDescriptor;
use crate::error::{Error, Result};
use crate::output::SUCCESS_TARGET;
use crate::repository::{Synchronizer, SyncResult, SystemGit, VcsOperations};
use crate::space::{format_gb, Fs2SpaceProbe, SizeReport, SpaceCheck, SpaceGuard, SpaceProbe};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Where a repository's processing ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepoStage {
    Pending,
    Syncing,
    SyncFailed,
    Synced,
    ArchivingDefault,
    ArchiveDefaultFailed,
    DefaultArchived,
    ScanningBranches,
    ArchivingBranches,
    Done,
}

/// Result of processing one repository.
#[derive(Debug, Clone, Serialize)]
pub struct RepoOutcome {
    pub local_name: String,
    pub source_ref: String,
    pub final_stage: RepoStage,
    pub sync_result: Option<SyncResult>,
    pub default_branch: Option<String>,
    /// True when the full archive of the default branch could not be made.
    pub default_archive_failed: bool,
    pub archives: Vec<Archive>,
}

impl RepoOutcome {
    fn new(descriptor: &RepositoryDescriptor) -> Self {
        Self {
            local_name: descriptor.local_name.clone(),
            source_ref: descriptor.source_ref.clone(),
            final_stage: RepoStage::Pending,
            sync_result: None,
            default_branch: None,
            default_archive_failed: false,
            archives: Vec::new(),
        }
    }

    fn enter(&mut self, stage: RepoStage) {
        debug!("[{}] {:?} -> {:?}", self.local_name, self.final_stage, stage);
        self.final_stage = stage;
    }

    pub fn succeeded(&self) -> bool {
        self.final_stage == RepoStage::Done
    }
}

/// Running totals shared by all workers of a run.
#[derive(Debug, Default)]
pub struct RunReport {
    repositories_done: AtomicUsize,
    repositories_failed: AtomicUsize,
    full_archives: AtomicUsize,
    default_archive_failures: AtomicUsize,
    branches_archived: AtomicUsize,
    aborted: AtomicBool,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a space check has stopped the run.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Stop further repositories from starting. Returns `true` for the
    /// first caller.
    pub fn abort(&self) -> bool {
        !self.aborted.swap(true, Ordering::SeqCst)
    }

    fn record(&self, outcome: &RepoOutcome) {
        if outcome.succeeded() {
            self.repositories_done.fetch_add(1, Ordering::SeqCst);
        } else {
            self.repositories_failed.fetch_add(1, Ordering::SeqCst);
        }
        if outcome.default_archive_failed {
            self.default_archive_failures.fetch_add(1, Ordering::SeqCst);
        }
        for archive in &outcome.archives {
            let counter = match archive.kind {
                ArchiveKind::Full => &self.full_archives,
                ArchiveKind::Partial => &self.branches_archived,
            };
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Serializable snapshot of a finished (or aborted) run.
///
/// Every reference line of the list is counted exactly once:
/// `repositories_total + invalid_references + duplicate_references` equals
/// the number of non-blank, non-comment lines. Of the repositories,
/// `repositories_done + repositories_failed + repositories_skipped` equals
/// `repositories_total`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    /// Distinct valid references handed to the run.
    pub repositories_total: usize,
    pub repositories_done: usize,
    pub repositories_failed: usize,
    /// Repositories never started because the run was aborted.
    pub repositories_skipped: usize,
    /// List lines rejected by the descriptor parser; filled in by the caller.
    pub invalid_references: usize,
    /// List lines naming a repository already listed; filled in by the caller.
    pub duplicate_references: usize,
    pub full_archives: usize,
    pub default_archive_failures: usize,
    pub branches_archived: usize,
    pub initial_space: Option<SpaceCheck>,
    pub final_space: Option<SpaceCheck>,
    pub backup_size: Option<SizeReport>,
    pub aborted: bool,
    pub repositories: Vec<RepoOutcome>,
}

/// A summary plus the fatal error that ended the run early, if any.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub fatal: Option<Error>,
}

impl RunOutcome {
    pub fn into_result(self) -> Result<RunSummary> {
        match self.fatal {
            Some(e) => Err(e),
            None => Ok(self.summary),
        }
    }
}

/// Thresholds and locations the orchestrator needs beyond its components.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backup_root: PathBuf,
    pub branch_threshold_hours: f64,
    pub min_free_gb: f64,
    pub size_warning_gb: f64,
    pub jobs: usize,
}

impl From<&BackupConfig> for Settings {
    fn from(config: &BackupConfig) -> Self {
        Self {
            backup_root: config.backup_root.clone(),
            branch_threshold_hours: config.branch_threshold_hours,
            min_free_gb: config.min_free_gb,
            size_warning_gb: config.size_warning_gb,
            jobs: config.jobs,
        }
    }
}

/// Runs backups over a list of repositories.
pub struct Orchestrator {
    synchronizer: Synchronizer,
    builder: ArchiveBuilder,
    guard: SpaceGuard,
    clock: Arc<dyn Clock>,
    settings: Settings,
    space_check_lock: Mutex<()>,
}

impl Orchestrator {
    /// Create an orchestrator using system git, zip and free-space queries.
    pub fn new(config: &BackupConfig) -> Self {
        Self::with_components(
            config,
            Arc::new(SystemGit),
            Arc::new(ZipArchiver),
            Arc::new(Fs2SpaceProbe),
            Arc::new(SystemClock),
        )
    }

    /// Create an orchestrator with custom collaborators.
    pub fn with_components(
        config: &BackupConfig,
        vcs: Arc<dyn VcsOperations>,
        archiver: Arc<dyn Archiver>,
        probe: Arc<dyn SpaceProbe>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            synchronizer: Synchronizer::new(vcs.clone(), config.clone_root.clone()),
            builder: ArchiveBuilder::new(
                vcs,
                archiver,
                config.backup_root.clone(),
                config.zip_folder.clone(),
            ),
            guard: SpaceGuard::new(probe),
            clock,
            settings: Settings::from(config),
            space_check_lock: Mutex::new(()),
        }
    }

    /// Back up every repository in `descriptors`.
    ///
    /// Individual repository failures are recorded in the summary. A failed
    /// free-space check ends the run early and is returned as `fatal`.
    pub fn run(&self, descriptors: &[RepositoryDescriptor]) -> RunOutcome {
        let started_at = self.clock.now();
        let report = RunReport::new();
        let mut summary = RunSummary {
            started_at: started_at.to_rfc3339(),
            repositories_total: descriptors.len(),
            repositories_done: 0,
            repositories_failed: 0,
            repositories_skipped: 0,
            invalid_references: 0,
            duplicate_references: 0,
            full_archives: 0,
            default_archive_failures: 0,
            branches_archived: 0,
            initial_space: None,
            final_space: None,
            backup_size: None,
            aborted: false,
            repositories: Vec::new(),
        };

        info!(
            "Starting backup of {} repositories into {}",
            descriptors.len(),
            self.settings.backup_root.display()
        );

        match self.ensure_space("before the first repository") {
            Ok(check) => summary.initial_space = Some(check),
            Err(e) => {
                report.abort();
                summary.aborted = true;
                summary.repositories_skipped = descriptors.len();
                return RunOutcome {
                    summary,
                    fatal: Some(e),
                };
            }
        }

        let fatal: Mutex<Option<Error>> = Mutex::new(None);
        let outcomes: Mutex<Vec<(usize, RepoOutcome)>> = Mutex::new(Vec::new());

        let work = |index: usize, descriptor: &RepositoryDescriptor| {
            if report.is_aborted() {
                return;
            }
            let outcome = self.process_repository(descriptor);
            report.record(&outcome);
            lock(&outcomes).push((index, outcome));

            let _serial = lock(&self.space_check_lock);
            if report.is_aborted() {
                return;
            }
            let context = format!("after {}", descriptor.local_name);
            if let Err(e) = self.ensure_space(&context) {
                if report.abort() {
                    *lock(&fatal) = Some(e);
                }
            }
        };

        if self.settings.jobs > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.settings.jobs)
                .build()
            {
                Ok(pool) => pool.install(|| {
                    descriptors
                        .par_iter()
                        .enumerate()
                        .for_each(|(index, descriptor)| work(index, descriptor))
                }),
                Err(e) => {
                    warn!("Could not start worker pool ({}), running sequentially", e);
                    run_sequential(descriptors, &report, &work);
                }
            }
        } else {
            run_sequential(descriptors, &report, &work);
        }

        let mut outcomes = outcomes.into_inner().unwrap_or_else(|e| e.into_inner());
        outcomes.sort_by_key(|(index, _)| *index);
        summary.repositories = outcomes.into_iter().map(|(_, o)| o).collect();
        summary.repositories_done = report.repositories_done.load(Ordering::SeqCst);
        summary.repositories_failed = report.repositories_failed.load(Ordering::SeqCst);
        summary.repositories_skipped =
            descriptors.len() - summary.repositories_done - summary.repositories_failed;
        summary.full_archives = report.full_archives.load(Ordering::SeqCst);
        summary.default_archive_failures = report.default_archive_failures.load(Ordering::SeqCst);
        summary.branches_archived = report.branches_archived.load(Ordering::SeqCst);
        summary.aborted = report.is_aborted();

        let fatal = fatal.into_inner().unwrap_or_else(|e| e.into_inner());
        if fatal.is_none() {
            summary.backup_size = Some(
                self.guard
                    .check_backup_size(&self.settings.backup_root, self.settings.size_warning_gb),
            );
            let final_space = self
                .guard
                .free_space(&self.settings.backup_root, self.settings.min_free_gb);
            if let SpaceCheck::Insufficient {
                available_bytes, ..
            } = final_space
            {
                warn!(
                    "Only {} free after the run, below the {} GB minimum",
                    format_gb(available_bytes),
                    self.settings.min_free_gb
                );
            }
            summary.final_space = Some(final_space);
        }

        log_summary(&summary);
        RunOutcome { summary, fatal }
    }

    /// Free-space check that turns a shortfall into `SpaceExhausted`.
    fn ensure_space(&self, context: &str) -> Result<SpaceCheck> {
        let check = self
            .guard
            .ensure_free_space(&self.settings.backup_root, self.settings.min_free_gb);
        match &check {
            Ok(SpaceCheck::Sufficient { available_bytes }) => {
                debug!("{} free {}", format_gb(*available_bytes), context);
            }
            Ok(_) => {}
            Err(e) => error!("Aborting run {}: {}", context, e),
        }
        check
    }

    /// Take one repository through sync, default archive and branch archives.
    pub fn process_repository(&self, descriptor: &RepositoryDescriptor) -> RepoOutcome {
        let name = descriptor.local_name.as_str();
        let mut outcome = RepoOutcome::new(descriptor);

        outcome.enter(RepoStage::Syncing);
        let state = match self.synchronizer.ensure_local_copy(descriptor) {
            Ok(state) => state,
            Err(e) => {
                error!("[{}] {}", name, e);
                outcome.sync_result = Some(SyncResult::Failed);
                outcome.enter(RepoStage::SyncFailed);
                return outcome;
            }
        };
        outcome.sync_result = Some(state.last_sync_result);
        outcome.default_branch = Some(state.default_branch.clone());
        outcome.enter(RepoStage::Synced);

        if let Err(e) = self.synchronizer.sync_default_branch(&state) {
            warn!("[{}] {}", name, e);
        }

        outcome.enter(RepoStage::ArchivingDefault);
        let timestamp = self.clock.now().format(TIMESTAMP_FORMAT).to_string();
        match self.builder.build_full_archive(&state, name, &timestamp) {
            Ok(archive) => {
                info!(
                    target: SUCCESS_TARGET,
                    "[{}] Full archive of '{}' written to {}",
                    name,
                    state.default_branch,
                    archive.path.display()
                );
                outcome.archives.push(archive);
                outcome.enter(RepoStage::DefaultArchived);
            }
            Err(e) => {
                error!("[{}] {}", name, e);
                outcome.default_archive_failed = true;
                outcome.enter(RepoStage::ArchiveDefaultFailed);
            }
        }

        outcome.enter(RepoStage::ScanningBranches);
        let now_epoch = self.clock.now().timestamp();
        let branches = self
            .synchronizer
            .list_recent_branches(&state, self.settings.branch_threshold_hours, now_epoch)
            .unwrap_or_else(|e| {
                warn!("[{}] Could not list remote branches: {}", name, e);
                Vec::new()
            });
        if branches.is_empty() {
            info!(
                "[{}] No branches updated in the last {} hours",
                name, self.settings.branch_threshold_hours
            );
        }

        outcome.enter(RepoStage::ArchivingBranches);
        for branch in &branches {
            let diff = self.synchronizer.diff_against_default(&state, &branch.name);
            match self
                .builder
                .build_partial_archive(&state, name, &branch.name, &diff, &timestamp)
            {
                Ok(Some(archive)) => {
                    info!(
                        target: SUCCESS_TARGET,
                        "[{}] Archived {} changed files of '{}' to {}",
                        name,
                        archive.file_count.unwrap_or_default(),
                        branch.name,
                        archive.path.display()
                    );
                    outcome.archives.push(archive);
                }
                Ok(None) => {}
                Err(e) => warn!("[{}] Skipping branch '{}': {}", name, branch.name, e),
            }
        }

        if !branches.is_empty() {
            if let Err(e) = self.synchronizer.checkout_default(&state) {
                warn!("[{}] Could not return to '{}': {}", name, state.default_branch, e);
            }
        }

        outcome.enter(RepoStage::Done);
        outcome
    }
}

fn run_sequential<F>(descriptors: &[RepositoryDescriptor], report: &RunReport, work: &F)
where
    F: Fn(usize, &RepositoryDescriptor),
{
    for (index, descriptor) in descriptors.iter().enumerate() {
        if report.is_aborted() {
            break;
        }
        work(index, descriptor);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn log_summary(summary: &RunSummary) {
    let line = format!(
        "{} of {} repositories done, {} failed, {} skipped; {} full and {} branch archives",
        summary.repositories_done,
        summary.repositories_total,
        summary.repositories_failed,
        summary.repositories_skipped,
        summary.full_archives,
        summary.branches_archived,
    );
    if summary.aborted {
        error!("Run aborted: {}", line);
    } else if summary.repositories_failed > 0 || summary.default_archive_failures > 0 {
        warn!("Run finished with failures: {}", line);
    } else {
        info!(target: SUCCESS_TARGET, "Run finished: {}", line);
    }
    if let Some(size) = &summary.backup_size {
        info!("Backup tree size: {}", format_gb(size.total_bytes));
    }
}
