//! Shared fixtures for database-backed tests.

use crate::database::Database;
use rusqlite::Connection;
use tempfile::TempDir;

pub struct TestDb {
    _dir: TempDir,
    pub db: Database,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("shard.sqlite")).unwrap();
        Self { _dir: dir, db }
    }
}

/// Seed a small game catalog plus two hand-made groups and one hand-made assignment.
///
/// Rare items (id, tier, level, country):
/// 100 A 50 CN, 101 A 52 EU, 102 A 80 CN, 200 B 45 CN, 201 B 100 EU, 300 C 48 CN.
/// Monsters (id, level, country): 1 50 CN, 2 50 EU, 3 105 CN(3), 4 8 CN.
pub fn seed_catalog(conn: &Connection) {
    conn.execute_batch(
        r#"
        INSERT INTO _RefObjCommon (ID, Service, CodeName128, TypeID1, TypeID2, ReqLevel1, Country, Link) VALUES
            (100, 1, 'ITEM_CH_SWORD_11_A_RARE', 3, 1, 50, 0, 0),
            (101, 1, 'ITEM_EU_DAGGER_11_A_RARE', 3, 1, 52, 1, 0),
            (102, 1, 'ITEM_CH_BLADE_13_A_RARE', 3, 1, 80, 0, 0),
            (103, 0, 'ITEM_CH_SPEAR_11_A_RARE', 3, 1, 50, 0, 0),
            (104, 1, 'ITEM_CH_SHIELD_11_A_RARE', 3, 1, NULL, 0, 0),
            (200, 1, 'ITEM_CH_BOW_10_B_RARE', 3, 1, 45, 3, 0),
            (201, 1, 'ITEM_EU_AXE_10_B_RARE', 3, 1, 100, 1, 0),
            (300, 1, 'ITEM_CH_TBLADE_10_C_RARE', 3, 1, 48, 0, 0),
            (400, 1, 'ITEM_CH_SWORD_11_A', 3, 1, 50, 0, 0),
            (401, 1, 'ITEM_ETC_A_RARE_POTION', 2, 1, 50, 0, 0),
            (1, 1, 'MOB_CH_TIGER', 1, 2, NULL, 0, 1001),
            (2, 1, 'MOB_EU_WOLF', 1, 2, NULL, 1, 1002),
            (3, 1, 'MOB_CH_DRAGON', 1, 2, NULL, 3, 1003),
            (4, 1, 'MOB_CH_RAT', 1, 2, NULL, 0, 1004),
            (5, 1, 'NPC_CH_SMITH', 1, 2, NULL, 0, 1005),
            (6, 0, 'MOB_CH_GHOST', 1, 2, NULL, 0, 1006),
            (7, 1, 'MOBX_CH_DUMMY', 1, 2, NULL, 0, 1007);

        INSERT INTO _RefObjChar (ID, Lvl) VALUES
            (1001, 50), (1002, 50), (1003, 105), (1004, 8), (1005, 50), (1006, 50), (1007, 50);

        INSERT INTO _RefDropItemGroup VALUES
            (1, 10, 'GROUP_MOB_CH_TIGER_ETC', 400, 1.0, 0),
            (1, 11, 'GROUP_POTIONS', 401, 1.0, 0);

        INSERT INTO _RefMonster_AssignedItemRndDrop VALUES
            (1, 1, 10, 'GROUP_MOB_CH_TIGER_ETC', 0, 1, 1, 0.5, 0, 0);
        "#,
    )
    .unwrap();
}
