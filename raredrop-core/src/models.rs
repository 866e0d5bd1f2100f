//! Data models for rare drop synchronization.

use crate::region::Region;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Reserved name prefix carried by every group and assignment this engine writes.
pub const SYNTH_PREFIX: &str = "RARE";

/// Rare drop tier. Each tier is embedded in item code names as `_{tag}_RARE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RareCategory {
    Star,
    Moon,
    Sun,
}

impl RareCategory {
    pub const ALL: [RareCategory; 3] = [RareCategory::Star, RareCategory::Moon, RareCategory::Sun];

    /// Single-letter tag used in item code names and group names.
    pub fn tag(self) -> &'static str {
        match self {
            RareCategory::Star => "A",
            RareCategory::Moon => "B",
            RareCategory::Sun => "C",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tag() == tag)
    }

    pub fn label(self) -> &'static str {
        match self {
            RareCategory::Star => "Seal of Star",
            RareCategory::Moon => "Seal of Moon",
            RareCategory::Sun => "Seal of Sun",
        }
    }
}

impl fmt::Display for RareCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Rare equipment item loaded from `_RefObjCommon`
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i32,
    pub category: RareCategory,
    pub level: i32,
    pub country: i32,
}

/// Monster loaded from `_RefObjCommon` joined with `_RefObjChar`
#[derive(Debug, Clone, PartialEq)]
pub struct Monster {
    pub id: i32,
    pub level: i32,
    pub country: i32,
}

/// One item inside a drop group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMember {
    pub item_id: i32,
    pub select_ratio: f64,
}

/// Drop group, persisted as one `_RefDropItemGroup` row per member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropGroup {
    pub id: i32,
    pub name: String,
    pub category: RareCategory,
    pub members: Vec<GroupMember>,
}

impl DropGroup {
    /// Build a group whose members share the selection weight equally.
    pub fn equal_split(id: i32, name: String, category: RareCategory, item_ids: &[i32]) -> Self {
        let select_ratio = 1.0 / item_ids.len() as f64;
        let members = item_ids
            .iter()
            .map(|&item_id| GroupMember { item_id, select_ratio })
            .collect();
        Self { id, name, category, members }
    }

    pub fn weight_sum(&self) -> f64 {
        self.members.iter().map(|m| m.select_ratio).sum()
    }
}

/// Monster to group link, persisted in `_RefMonster_AssignedItemRndDrop`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub monster_id: i32,
    pub group_id: i32,
    pub group_name: String,
    pub overlap: i32,
    pub drop_amount_min: i32,
    pub drop_amount_max: i32,
    pub drop_ratio: f64,
}

impl Assignment {
    pub fn new(monster_id: i32, group: &DropGroup, drop_ratio: f64) -> Self {
        Self {
            monster_id,
            group_id: group.id,
            group_name: group.name.clone(),
            overlap: 0,
            drop_amount_min: 1,
            drop_amount_max: 1,
            drop_ratio,
        }
    }
}

/// Build a per-monster group name: `RARE_{tag}_MOB_{id}[_{region}]`.
pub fn monster_group_name(category: RareCategory, monster_id: i32, region: Option<Region>) -> String {
    let base = format!("{}_{}_MOB_{}", SYNTH_PREFIX, category.tag(), monster_id);
    match region {
        Some(region) => format!("{}_{}", base, region),
        None => base,
    }
}

/// Build a level-shared group name: `RARE_{tag}_LVL_{level}[_{region}]`.
pub fn level_group_name(category: RareCategory, level: i32, region: Option<Region>) -> String {
    let base = format!("{}_{}_LVL_{}", SYNTH_PREFIX, category.tag(), level);
    match region {
        Some(region) => format!("{}_{}", base, region),
        None => base,
    }
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub items_processed: usize,
    pub groups_created: usize,
    pub group_rows: usize,
    pub assignments_created: usize,
    pub deleted_group_rows: usize,
    pub deleted_assignments: usize,
    pub snapshot_created: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SyncSummary {
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Successfully updated drop rates in {}",
            crate::progress::format_elapsed(self.elapsed)
        )?;
        writeln!(f, "Items processed: {}", self.items_processed)?;
        writeln!(f, "Drop groups created: {} ({} item rows)", self.groups_created, self.group_rows)?;
        write!(f, "Monster-group assignments: {}", self.assignments_created)
    }
}

/// Row counts of the two drop relations (live or backup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub group_rows: i64,
    pub assignment_rows: i64,
}

impl TableCounts {
    pub fn is_empty(&self) -> bool {
        self.group_rows == 0 && self.assignment_rows == 0
    }
}
