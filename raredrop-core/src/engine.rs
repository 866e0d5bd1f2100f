//! Operation surface: sync, backup, restore and inspection, one run at a time.

use crate::config::SyncConfig;
use crate::database::Database;
use crate::error::{RareDropError, Result};
use crate::inspect::{inspect_assignments, DetectedConfig};
use crate::models::{SyncSummary, TableCounts};
use crate::planner::SyncPlan;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::snapshot::{BackupStatus, SnapshotGuard};
use crate::sync::BatchSynchronizer;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;

/// Held for the duration of a mutating operation; releases the run flag on drop.
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A running background operation: its progress stream and final outcome.
#[derive(Debug)]
pub struct RunHandle<T> {
    pub progress: UnboundedReceiver<ProgressEvent>,
    outcome: oneshot::Receiver<Result<T>>,
}

impl<T> RunHandle<T> {
    /// Wait for the operation to finish.
    pub async fn finish(self) -> Result<T> {
        self.outcome.await.unwrap_or_else(|_| Err(worker_lost()))
    }

    /// Blocking variant of [`RunHandle::finish`] for callers outside an async runtime.
    pub fn wait(self) -> Result<T> {
        self.outcome.blocking_recv().unwrap_or_else(|_| Err(worker_lost()))
    }
}

fn worker_lost() -> RareDropError {
    RareDropError::Unknown("worker thread terminated before reporting a result".to_string())
}

#[derive(Clone)]
pub struct Engine {
    db: Database,
    running: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(db: Database) -> Self {
        Self { db, running: Arc::new(AtomicBool::new(false)) }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::new(path)?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claim the single run slot or fail with `Busy`.
    pub fn try_acquire(&self) -> Result<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RareDropError::Busy)?;
        Ok(RunGuard { flag: Arc::clone(&self.running) })
    }

    /// Replace every synthetic group and assignment according to `config`.
    pub fn sync(&self, config: &SyncConfig, reporter: &ProgressReporter) -> Result<SyncSummary> {
        config.validate()?;
        let _guard = self.try_acquire()?;
        self.sync_unguarded(config, reporter)
    }

    fn sync_unguarded(&self, config: &SyncConfig, reporter: &ProgressReporter) -> Result<SyncSummary> {
        let mut conn = self.db.connection()?;
        BatchSynchronizer::new(&self.db, reporter).run(&mut conn, config)
    }

    /// Compute the plan for `config` without writing.
    pub fn plan(&self, config: &SyncConfig) -> Result<SyncPlan> {
        config.validate()?;
        let conn = self.db.connection()?;
        BatchSynchronizer::new(&self.db, &ProgressReporter::silent()).plan(&conn, config)
    }

    /// Force a fresh snapshot of both drop relations.
    pub fn ensure_or_refresh_backup(&self, reporter: &ProgressReporter) -> Result<TableCounts> {
        let _guard = self.try_acquire()?;
        self.backup_unguarded(reporter)
    }

    fn backup_unguarded(&self, reporter: &ProgressReporter) -> Result<TableCounts> {
        let mut conn = self.db.connection()?;
        let tx = self.db.begin_write(&mut conn)?;
        reporter.report("Creating backup of drop groups and assignments...", 10, "Backing up...");
        let counts = SnapshotGuard::new(&self.db).refresh(&tx)?;
        tx.commit()?;
        reporter.report("Backup created successfully", 100, "Complete!");
        Ok(counts)
    }

    /// Replace both live relations with the snapshot contents.
    pub fn restore(&self, reporter: &ProgressReporter) -> Result<TableCounts> {
        let _guard = self.try_acquire()?;
        self.restore_unguarded(reporter)
    }

    fn restore_unguarded(&self, reporter: &ProgressReporter) -> Result<TableCounts> {
        let mut conn = self.db.connection()?;
        let tx = self.db.begin_write(&mut conn)?;
        reporter.report("Restoring drop tables from backup...", 10, "Restoring...");
        let counts = SnapshotGuard::new(&self.db).restore(&tx)?;
        tx.commit()?;
        reporter.report("Restore completed successfully", 100, "Complete!");
        Ok(counts)
    }

    pub fn backup_status(&self) -> Result<BackupStatus> {
        let conn = self.db.connection()?;
        SnapshotGuard::new(&self.db).status(&conn)
    }

    /// Detect the configuration behind the currently persisted synthetic rows.
    pub fn inspect(&self) -> Result<DetectedConfig> {
        let conn = self.db.connection()?;
        inspect_assignments(&conn)
    }

    /// Start a sync on a worker thread. Validation and the busy check happen before it starts.
    pub fn spawn_sync(&self, config: SyncConfig) -> Result<RunHandle<SyncSummary>> {
        config.validate()?;
        let guard = self.try_acquire()?;
        let engine = self.clone();
        Ok(spawn_worker(guard, move |reporter| engine.sync_unguarded(&config, reporter)))
    }

    pub fn spawn_backup(&self) -> Result<RunHandle<TableCounts>> {
        let guard = self.try_acquire()?;
        let engine = self.clone();
        Ok(spawn_worker(guard, move |reporter| engine.backup_unguarded(reporter)))
    }

    pub fn spawn_restore(&self) -> Result<RunHandle<TableCounts>> {
        let guard = self.try_acquire()?;
        let engine = self.clone();
        Ok(spawn_worker(guard, move |reporter| engine.restore_unguarded(reporter)))
    }
}

fn spawn_worker<T, F>(guard: RunGuard, work: F) -> RunHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&ProgressReporter) -> Result<T> + Send + 'static,
{
    let (reporter, progress) = ProgressReporter::channel();
    let (done_tx, outcome) = oneshot::channel();

    std::thread::spawn(move || {
        let result = work(&reporter);
        if let Err(e) = &result {
            tracing::warn!("Background operation failed: {}", e);
        }
        // Release the slot before announcing completion so the caller can start the next run.
        drop(guard);
        drop(reporter);
        let _ = done_tx.send(result);
    });

    RunHandle { progress, outcome }
}
