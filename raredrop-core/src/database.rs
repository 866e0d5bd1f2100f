use crate::error::{RareDropError, Result};
use crate::models::{Assignment, DropGroup, Item, Monster, RareCategory, TableCounts, SYNTH_PREFIX};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Transaction, TransactionBehavior};
use std::time::Duration;

pub const GROUP_TABLE: &str = "_RefDropItemGroup";
pub const ASSIGNMENT_TABLE: &str = "_RefMonster_AssignedItemRndDrop";
pub const GROUP_BACKUP_TABLE: &str = "_RefDropItemGroup_Backup";
pub const ASSIGNMENT_BACKUP_TABLE: &str = "_RefMonster_AssignedItemRndDrop_Backup";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(3);

/// Bound parameter ceiling per statement.
pub const MAX_SQL_PARAMS: usize = 999;
pub const GROUP_COLUMNS: usize = 6;
pub const ASSIGNMENT_COLUMNS: usize = 10;

/// Largest row count whose parameters fit under [`MAX_SQL_PARAMS`].
pub const fn rows_per_batch(columns: usize) -> usize {
    MAX_SQL_PARAMS / columns
}

/// `LIKE` pattern matching every synthetic name (`_` escaped).
pub(crate) fn synthetic_like() -> String {
    format!("{}\\_%", SYNTH_PREFIX)
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn new(path: &std::path::Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(4)
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .build(manager)
            .map_err(RareDropError::Connection)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(RareDropError::Connection)
    }

    /// Begin an IMMEDIATE transaction. A write lock held by another connection,
    /// including one in another process, surfaces as `Busy` once the busy timeout expires.
    pub fn begin_write<'c>(&self, conn: &'c mut Connection) -> Result<Transaction<'c>> {
        conn.transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                    tracing::warn!("Database is locked by another writer: {}", e);
                    RareDropError::Busy
                }
                _ => RareDropError::Database(e),
            })
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        tx.execute_batch(
            r#"
            -- Reference objects (items and monsters)
            CREATE TABLE IF NOT EXISTS _RefObjCommon (
                ID INTEGER PRIMARY KEY,
                Service INTEGER NOT NULL DEFAULT 1,
                CodeName128 TEXT NOT NULL,
                TypeID1 INTEGER NOT NULL,
                TypeID2 INTEGER NOT NULL DEFAULT 0,
                ReqLevel1 INTEGER,
                Country INTEGER NOT NULL DEFAULT 0,
                Link INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS _RefObjChar (
                ID INTEGER PRIMARY KEY,
                Lvl INTEGER NOT NULL
            );

            -- Drop groups and monster assignments
            CREATE TABLE IF NOT EXISTS _RefDropItemGroup (
                Service INTEGER NOT NULL,
                RefItemGroupID INTEGER NOT NULL,
                CodeName128 TEXT NOT NULL,
                RefItemID INTEGER NOT NULL,
                SelectRatio REAL NOT NULL,
                RefMagicGroupID INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS _RefMonster_AssignedItemRndDrop (
                Service INTEGER NOT NULL,
                RefMonsterID INTEGER NOT NULL,
                RefItemGroupID INTEGER NOT NULL,
                ItemGroupCodeName128 TEXT NOT NULL,
                Overlap INTEGER NOT NULL,
                DropAmountMin INTEGER NOT NULL,
                DropAmountMax INTEGER NOT NULL,
                DropRatio REAL NOT NULL,
                param1 INTEGER NOT NULL,
                param2 INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_drop_group_name ON _RefDropItemGroup(CodeName128);
            CREATE INDEX IF NOT EXISTS idx_assigned_group_name ON _RefMonster_AssignedItemRndDrop(ItemGroupCodeName128);
            "#,
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Load rare equipment for the given categories, in scan order per category.
    pub fn load_items(&self, conn: &Connection, categories: &[RareCategory]) -> Result<Vec<Item>> {
        let mut stmt = conn.prepare(
            "SELECT ID, ReqLevel1, Country
             FROM _RefObjCommon
             WHERE CodeName128 LIKE ?1 ESCAPE '\\'
             AND Service = 1
             AND TypeID1 = 3
             AND ReqLevel1 IS NOT NULL
             ORDER BY ID",
        )?;

        let mut items = Vec::new();
        for &category in categories {
            let pattern = format!("%\\_{}\\_RARE%", category.tag());
            let rows = stmt
                .query_map(params![pattern], |row| {
                    Ok(Item {
                        id: row.get(0)?,
                        category,
                        level: row.get(1)?,
                        country: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            tracing::debug!("Loaded {} {} rare items", rows.len(), category.label());
            items.extend(rows);
        }

        Ok(items)
    }

    /// Load every serviced monster with its character level.
    pub fn load_monsters(&self, conn: &Connection) -> Result<Vec<Monster>> {
        let mut stmt = conn.prepare(
            "SELECT c.ID, ch.Lvl, c.Country
             FROM _RefObjCommon c
             JOIN _RefObjChar ch ON c.Link = ch.ID
             WHERE c.CodeName128 LIKE 'MOB\\_%' ESCAPE '\\'
             AND c.TypeID1 = 1
             AND c.Service = 1
             ORDER BY c.ID",
        )?;

        let monsters = stmt
            .query_map([], |row| {
                Ok(Monster {
                    id: row.get(0)?,
                    level: row.get(1)?,
                    country: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(monsters)
    }

    /// Highest persisted group id, 0 when the table is empty.
    pub fn max_group_id(&self, conn: &Connection) -> Result<i32> {
        let max: Option<i32> =
            conn.query_row("SELECT MAX(RefItemGroupID) FROM _RefDropItemGroup", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0))
    }

    /// Delete every synthetic group row. Returns rows deleted.
    pub fn delete_synthetic_groups(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "DELETE FROM _RefDropItemGroup WHERE CodeName128 LIKE ?1 ESCAPE '\\'",
            params![synthetic_like()],
        )
    }

    /// Delete every synthetic assignment row. Returns rows deleted.
    pub fn delete_synthetic_assignments(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "DELETE FROM _RefMonster_AssignedItemRndDrop WHERE ItemGroupCodeName128 LIKE ?1 ESCAPE '\\'",
            params![synthetic_like()],
        )
    }

    /// Insert one batch of group member rows with a single multi-row statement.
    pub fn insert_group_rows(&self, conn: &Connection, rows: &[(&DropGroup, usize)]) -> rusqlite::Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut values = Vec::with_capacity(rows.len() * GROUP_COLUMNS);
        for &(group, member_idx) in rows {
            let member = &group.members[member_idx];
            values.push(Value::Integer(1));
            values.push(Value::Integer(group.id.into()));
            values.push(Value::Text(group.name.clone()));
            values.push(Value::Integer(member.item_id.into()));
            values.push(Value::Real(member.select_ratio));
            values.push(Value::Integer(0));
        }

        let sql = format!(
            "INSERT INTO _RefDropItemGroup
             (Service, RefItemGroupID, CodeName128, RefItemID, SelectRatio, RefMagicGroupID)
             VALUES {}",
            placeholders(rows.len(), GROUP_COLUMNS)
        );
        conn.prepare_cached(&sql)?.execute(params_from_iter(values))
    }

    /// Insert one batch of assignment rows with a single multi-row statement.
    pub fn insert_assignment_rows(&self, conn: &Connection, rows: &[Assignment]) -> rusqlite::Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut values = Vec::with_capacity(rows.len() * ASSIGNMENT_COLUMNS);
        for assignment in rows {
            values.push(Value::Integer(1));
            values.push(Value::Integer(assignment.monster_id.into()));
            values.push(Value::Integer(assignment.group_id.into()));
            values.push(Value::Text(assignment.group_name.clone()));
            values.push(Value::Integer(assignment.overlap.into()));
            values.push(Value::Integer(assignment.drop_amount_min.into()));
            values.push(Value::Integer(assignment.drop_amount_max.into()));
            values.push(Value::Real(assignment.drop_ratio));
            values.push(Value::Integer(0));
            values.push(Value::Integer(0));
        }

        let sql = format!(
            "INSERT INTO _RefMonster_AssignedItemRndDrop
             (Service, RefMonsterID, RefItemGroupID, ItemGroupCodeName128, Overlap,
              DropAmountMin, DropAmountMax, DropRatio, param1, param2)
             VALUES {}",
            placeholders(rows.len(), ASSIGNMENT_COLUMNS)
        );
        conn.prepare_cached(&sql)?.execute(params_from_iter(values))
    }

    pub fn table_exists(&self, conn: &Connection, table: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Row count of `table`. Only ever called with the module's table constants.
    pub fn row_count(&self, conn: &Connection, table: &str) -> Result<i64> {
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn live_counts(&self, conn: &Connection) -> Result<TableCounts> {
        Ok(TableCounts {
            group_rows: self.row_count(conn, GROUP_TABLE)?,
            assignment_rows: self.row_count(conn, ASSIGNMENT_TABLE)?,
        })
    }
}

/// `(?, ?, ...), (?, ?, ...)` for `rows` rows of `columns` parameters.
fn placeholders(rows: usize, columns: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}
