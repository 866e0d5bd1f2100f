//! End-to-end sync: snapshot, plan, replace synthetic rows in bounded batches, commit.

use crate::config::SyncConfig;
use crate::database::{
    rows_per_batch, Database, ASSIGNMENT_COLUMNS, ASSIGNMENT_TABLE, GROUP_COLUMNS, GROUP_TABLE,
};
use crate::error::{RareDropError, Result};
use crate::index::LevelIndex;
use crate::models::{DropGroup, RareCategory, SyncSummary};
use crate::planner::{plan_assignments, GroupIdAllocator, SyncPlan};
use crate::progress::{EtaTracker, ProgressReporter};
use crate::snapshot::SnapshotGuard;
use rusqlite::Connection;
use std::time::Instant;
use tracing::info;

pub struct BatchSynchronizer<'a> {
    db: &'a Database,
    reporter: &'a ProgressReporter,
}

impl<'a> BatchSynchronizer<'a> {
    pub fn new(db: &'a Database, reporter: &'a ProgressReporter) -> Self {
        Self { db, reporter }
    }

    /// Load catalogs, index them and plan the run without writing anything.
    pub fn plan(&self, conn: &Connection, config: &SyncConfig) -> Result<SyncPlan> {
        let categories: Vec<RareCategory> = config.categories.iter().map(|c| c.category).collect();

        self.reporter.report("Collecting rare items...", 0, "Analyzing...");
        let items = self.db.load_items(conn, &categories)?;
        let monsters = self.db.load_monsters(conn)?;

        let index = LevelIndex::build(&items, config.region_mixing);
        info!(
            "Indexed {} items into {} partitions and {} level buckets ({}), {} monsters eligible",
            items.len(),
            index.partition_count(),
            index.bucket_count(),
            if index.is_region_aware() { "region-aware" } else { "regions mixed" },
            monsters.len()
        );

        self.reporter.report(
            format!("Planning drops for {} monsters...", monsters.len()),
            0,
            "Planning...",
        );
        let mut ids = GroupIdAllocator::starting_after(self.db.max_group_id(conn)?);
        let mut plan = plan_assignments(&monsters, &index, config, &mut ids);
        plan.items_processed = items.len();

        info!(
            "Planned {} groups ({} item rows) and {} assignments",
            plan.groups.len(),
            plan.group_rows(),
            plan.assignments.len()
        );
        Ok(plan)
    }

    /// Run a full sync inside one immediate transaction.
    pub fn run(&self, conn: &mut Connection, config: &SyncConfig) -> Result<SyncSummary> {
        let started = Instant::now();
        let tx = self.db.begin_write(conn)?;

        self.reporter.report("Checking for backup...", 0, "Checking...");
        let snapshot = SnapshotGuard::new(self.db).ensure(&tx)?;
        if snapshot.is_some() {
            self.reporter.report("Backup created successfully", 0, "Checking...");
        }

        let plan = self.plan(&tx, config)?;

        self.reporter.report("Deleting old rare drop groups and assignments...", 0, "Deleting...");
        let deleted_assignments =
            self.db
                .delete_synthetic_assignments(&tx)
                .map_err(|source| RareDropError::Write {
                    table: ASSIGNMENT_TABLE,
                    batch: 0,
                    rows_written: 0,
                    source,
                })?;
        let deleted_group_rows =
            self.db
                .delete_synthetic_groups(&tx)
                .map_err(|source| RareDropError::Write {
                    table: GROUP_TABLE,
                    batch: 0,
                    rows_written: 0,
                    source,
                })?;
        info!(
            "Deleted {} old group rows and {} old assignments",
            deleted_group_rows, deleted_assignments
        );

        let mut tracker = EtaTracker::start(plan.total_rows());
        self.write_groups(&tx, &plan, &mut tracker)?;
        self.write_assignments(&tx, &plan, &mut tracker)?;

        self.reporter.report("Committing changes to database...", tracker.percent(), "Committing...");
        tx.commit()?;

        let summary = SyncSummary {
            items_processed: plan.items_processed,
            groups_created: plan.groups.len(),
            group_rows: plan.group_rows(),
            assignments_created: plan.assignments.len(),
            deleted_group_rows,
            deleted_assignments,
            snapshot_created: snapshot.is_some(),
            elapsed: started.elapsed(),
        };
        self.reporter.report("Complete!", 100, "Complete!");
        info!(
            "Sync finished: {} groups, {} assignments",
            summary.groups_created, summary.assignments_created
        );
        Ok(summary)
    }

    fn write_groups(&self, conn: &Connection, plan: &SyncPlan, tracker: &mut EtaTracker) -> Result<()> {
        let rows: Vec<(&DropGroup, usize)> = plan
            .groups
            .iter()
            .flat_map(|group| (0..group.members.len()).map(move |idx| (group, idx)))
            .collect();
        let total = rows.len();
        let mut written = 0;

        for (batch_idx, batch) in rows.chunks(rows_per_batch(GROUP_COLUMNS)).enumerate() {
            self.db
                .insert_group_rows(conn, batch)
                .map_err(|source| RareDropError::Write {
                    table: GROUP_TABLE,
                    batch: batch_idx + 1,
                    rows_written: written,
                    source,
                })?;
            written += batch.len();
            tracker.record(batch.len());
            tracing::debug!("Group batch {} written ({}/{})", batch_idx + 1, written, total);
            self.reporter.report(
                format!("Created {}/{} group item entries", written, total),
                tracker.percent(),
                format!("ETA: {}", tracker.eta_text()),
            );
        }
        Ok(())
    }

    fn write_assignments(&self, conn: &Connection, plan: &SyncPlan, tracker: &mut EtaTracker) -> Result<()> {
        let total = plan.assignments.len();
        let mut written = 0;

        for (batch_idx, batch) in plan.assignments.chunks(rows_per_batch(ASSIGNMENT_COLUMNS)).enumerate() {
            self.db
                .insert_assignment_rows(conn, batch)
                .map_err(|source| RareDropError::Write {
                    table: ASSIGNMENT_TABLE,
                    batch: batch_idx + 1,
                    rows_written: written,
                    source,
                })?;
            written += batch.len();
            tracker.record(batch.len());
            tracing::debug!("Assignment batch {} written ({}/{})", batch_idx + 1, written, total);
            self.reporter.report(
                format!("Created {}/{} assignments", written, total),
                tracker.percent(),
                format!("ETA: {}", tracker.eta_text()),
            );
        }
        Ok(())
    }
}
