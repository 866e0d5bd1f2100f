//! Full-table safety copies of the drop relations.
//!
//! A snapshot is the pair `_RefDropItemGroup_Backup` / `_RefMonster_AssignedItemRndDrop_Backup`.
//! Both must exist for a backup to count as present. Snapshots hold every row of the
//! live tables, not only synthetic ones, so a restore undoes any change made after them.
//!
//! Every function here runs on the caller's connection; pass a transaction to make
//! the copy or restore part of a larger unit.

use crate::database::{
    Database, ASSIGNMENT_BACKUP_TABLE, ASSIGNMENT_TABLE, GROUP_BACKUP_TABLE, GROUP_TABLE,
};
use crate::error::{RareDropError, Result};
use crate::models::TableCounts;
use rusqlite::Connection;
use serde::Serialize;

/// Presence and size of the backup pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackupStatus {
    pub group_backup: bool,
    pub assignment_backup: bool,
    pub counts: Option<TableCounts>,
}

impl BackupStatus {
    pub fn is_present(&self) -> bool {
        self.group_backup && self.assignment_backup
    }
}

pub struct SnapshotGuard<'a> {
    db: &'a Database,
}

impl<'a> SnapshotGuard<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn status(&self, conn: &Connection) -> Result<BackupStatus> {
        let group_backup = self.db.table_exists(conn, GROUP_BACKUP_TABLE)?;
        let assignment_backup = self.db.table_exists(conn, ASSIGNMENT_BACKUP_TABLE)?;
        let counts = if group_backup && assignment_backup {
            Some(self.backup_counts(conn)?)
        } else {
            None
        };
        Ok(BackupStatus { group_backup, assignment_backup, counts })
    }

    /// Create the snapshot if either backup relation is missing.
    /// Returns the copied row counts when a snapshot was taken.
    pub fn ensure(&self, conn: &Connection) -> Result<Option<TableCounts>> {
        if self.status(conn)?.is_present() {
            tracing::debug!("Backup tables present, leaving them untouched");
            return Ok(None);
        }
        tracing::info!("No backup found, creating one before applying changes");
        self.refresh(conn).map(Some)
    }

    /// Drop and recreate both backup relations from the live tables.
    pub fn refresh(&self, conn: &Connection) -> Result<TableCounts> {
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {gb};
             CREATE TABLE {gb} AS SELECT * FROM {g};
             DROP TABLE IF EXISTS {ab};
             CREATE TABLE {ab} AS SELECT * FROM {a};",
            gb = GROUP_BACKUP_TABLE,
            g = GROUP_TABLE,
            ab = ASSIGNMENT_BACKUP_TABLE,
            a = ASSIGNMENT_TABLE,
        ))?;

        let counts = self.backup_counts(conn)?;
        tracing::info!(
            "Backup created: {} group rows, {} assignment rows",
            counts.group_rows,
            counts.assignment_rows
        );
        Ok(counts)
    }

    /// Replace the live tables with the backup contents.
    pub fn restore(&self, conn: &Connection) -> Result<TableCounts> {
        let status = self.status(conn)?;
        if !status.group_backup {
            return Err(RareDropError::NoBackup(format!(
                "{} is missing, create a backup first",
                GROUP_BACKUP_TABLE
            )));
        }
        if !status.assignment_backup {
            return Err(RareDropError::NoBackup(format!(
                "{} is missing, create a backup first",
                ASSIGNMENT_BACKUP_TABLE
            )));
        }

        let backup = self.backup_counts(conn)?;
        if backup.is_empty() {
            return Err(RareDropError::EmptyBackup {
                groups: backup.group_rows,
                assignments: backup.assignment_rows,
            });
        }

        conn.execute_batch(&format!(
            "DELETE FROM {a};
             DELETE FROM {g};
             INSERT INTO {g} SELECT * FROM {gb};
             INSERT INTO {a} SELECT * FROM {ab};",
            a = ASSIGNMENT_TABLE,
            g = GROUP_TABLE,
            gb = GROUP_BACKUP_TABLE,
            ab = ASSIGNMENT_BACKUP_TABLE,
        ))?;

        let restored = self.db.live_counts(conn)?;
        tracing::info!(
            "Restored {} group rows and {} assignment rows from backup",
            restored.group_rows,
            restored.assignment_rows
        );
        Ok(restored)
    }

    fn backup_counts(&self, conn: &Connection) -> Result<TableCounts> {
        Ok(TableCounts {
            group_rows: self.db.row_count(conn, GROUP_BACKUP_TABLE)?,
            assignment_rows: self.db.row_count(conn, ASSIGNMENT_BACKUP_TABLE)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_catalog, TestDb};

    #[test]
    fn test_ensure_creates_once() {
        let test_db = TestDb::new();
        let conn = test_db.db.connection().unwrap();
        seed_catalog(&conn);
        let guard = SnapshotGuard::new(&test_db.db);

        assert!(!guard.status(&conn).unwrap().is_present());
        let created = guard.ensure(&conn).unwrap().unwrap();
        assert_eq!(created, TableCounts { group_rows: 2, assignment_rows: 1 });

        conn.execute("DELETE FROM _RefDropItemGroup", []).unwrap();
        assert_eq!(guard.ensure(&conn).unwrap(), None);
        // The existing snapshot was preserved.
        assert_eq!(guard.status(&conn).unwrap().counts, Some(created));
    }

    #[test]
    fn test_refresh_overwrites() {
        let test_db = TestDb::new();
        let conn = test_db.db.connection().unwrap();
        seed_catalog(&conn);
        let guard = SnapshotGuard::new(&test_db.db);

        guard.refresh(&conn).unwrap();
        conn.execute("DELETE FROM _RefMonster_AssignedItemRndDrop", []).unwrap();
        let counts = guard.refresh(&conn).unwrap();
        assert_eq!(counts, TableCounts { group_rows: 2, assignment_rows: 0 });
    }

    #[test]
    fn test_restore_without_backup() {
        let test_db = TestDb::new();
        let conn = test_db.db.connection().unwrap();
        let guard = SnapshotGuard::new(&test_db.db);
        assert!(matches!(guard.restore(&conn), Err(RareDropError::NoBackup(_))));

        // Only one half of the pair is not a backup.
        conn.execute_batch("CREATE TABLE _RefDropItemGroup_Backup AS SELECT * FROM _RefDropItemGroup")
            .unwrap();
        assert!(!guard.status(&conn).unwrap().is_present());
        assert!(matches!(guard.restore(&conn), Err(RareDropError::NoBackup(_))));
    }

    #[test]
    fn test_restore_refuses_empty_backup() {
        let test_db = TestDb::new();
        let conn = test_db.db.connection().unwrap();
        let guard = SnapshotGuard::new(&test_db.db);
        guard.refresh(&conn).unwrap();

        seed_catalog(&conn);
        let err = guard.restore(&conn).unwrap_err();
        assert!(matches!(err, RareDropError::EmptyBackup { groups: 0, assignments: 0 }));
        // Live data untouched.
        assert_eq!(
            test_db.db.live_counts(&conn).unwrap(),
            TableCounts { group_rows: 2, assignment_rows: 1 }
        );
    }

    #[test]
    fn test_restore_replaces_live_rows() {
        let test_db = TestDb::new();
        let conn = test_db.db.connection().unwrap();
        seed_catalog(&conn);
        let guard = SnapshotGuard::new(&test_db.db);
        guard.refresh(&conn).unwrap();

        conn.execute_batch(
            "DELETE FROM _RefDropItemGroup WHERE RefItemGroupID = 11;
             INSERT INTO _RefMonster_AssignedItemRndDrop VALUES (1, 2, 10, 'GROUP_MOB_CH_TIGER_ETC', 0, 1, 1, 0.1, 0, 0);",
        )
        .unwrap();

        let restored = guard.restore(&conn).unwrap();
        assert_eq!(restored, TableCounts { group_rows: 2, assignment_rows: 1 });
        let names: Vec<String> = conn
            .prepare("SELECT CodeName128 FROM _RefDropItemGroup ORDER BY RefItemGroupID")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(names, vec!["GROUP_MOB_CH_TIGER_ETC", "GROUP_POTIONS"]);
    }
}
