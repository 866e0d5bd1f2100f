//! Detects the configuration behind the synthetic rows already in the database.

use crate::config::{CategoryRate, GroupingStrategy, SyncConfig};
use crate::database::synthetic_like;
use crate::error::Result;
use crate::models::RareCategory;
use crate::region::Region;
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Only groups anchored inside this level band contribute to distance detection.
/// Near the ends of the level curve the window is clipped and under-reports the distance.
pub const DISTANCE_ANCHOR_LEVELS: std::ops::RangeInclusive<i32> = 20..=110;

lazy_static! {
    static ref SYNTHETIC_NAME_REGEX: Regex =
        Regex::new(r"^RARE_([ABC])_(MOB|LVL)_(\d+)(?:_([A-Z][A-Z0-9-]*))?$").unwrap();
}

/// Components of a synthetic group name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedGroupName {
    pub category: RareCategory,
    pub grouping: GroupingStrategy,
    /// Monster id for per-monster groups, item level for shared groups.
    pub anchor: i32,
    pub region: Option<Region>,
}

pub fn parse_group_name(name: &str) -> Option<ParsedGroupName> {
    let caps = SYNTHETIC_NAME_REGEX.captures(name)?;
    let category = RareCategory::from_tag(caps.get(1)?.as_str())?;
    let grouping = match caps.get(2)?.as_str() {
        "MOB" => GroupingStrategy::PerMonster,
        _ => GroupingStrategy::SharedByLevel,
    };
    let anchor = caps.get(3)?.as_str().parse().ok()?;
    let region = match caps.get(4) {
        Some(suffix) => Some(suffix.as_str().parse::<Region>().ok()?),
        None => None,
    };
    Some(ParsedGroupName { category, grouping, anchor, region })
}

/// What the persisted synthetic rows say about the run that produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectedConfig {
    /// Enabled categories with the highest observed ratio as the base probability.
    pub categories: Vec<CategoryRate>,
    pub region_aware: bool,
    /// `None` when no names parse or both naming schemes are present.
    pub grouping: Option<GroupingStrategy>,
    pub level_distance: Option<u32>,
    pub synthetic_groups: usize,
    pub synthetic_assignments: usize,
    pub unrecognized_names: usize,
}

impl DetectedConfig {
    pub fn is_empty(&self) -> bool {
        self.synthetic_assignments == 0
    }

    /// A runnable configuration matching the detection. Decay parameters cannot be
    /// recovered from the rows and are left disabled.
    pub fn to_sync_config(&self, fallback_distance: u32) -> Option<SyncConfig> {
        if self.categories.is_empty() {
            return None;
        }
        let mut config = SyncConfig::new(
            self.categories.clone(),
            self.level_distance.unwrap_or(fallback_distance),
        );
        config.region_mixing = !self.region_aware;
        config.grouping = self.grouping.unwrap_or_default();
        Some(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for DetectedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("No existing configuration detected");
        }

        let mut parts: Vec<String> = self
            .categories
            .iter()
            .map(|rate| format!("{}: {}", short_label(rate.category), rate.probability))
            .collect();
        if let Some(distance) = self.level_distance {
            parts.push(format!("Level ±{}", distance));
        }
        parts.push(if self.region_aware { "Region-aware" } else { "Region mixture" }.to_string());
        match self.grouping {
            Some(GroupingStrategy::PerMonster) => parts.push("Per-monster groups".to_string()),
            Some(GroupingStrategy::SharedByLevel) => parts.push("Shared level groups".to_string()),
            None => {}
        }
        write!(f, "{}", parts.join(", "))
    }
}

fn short_label(category: RareCategory) -> &'static str {
    match category {
        RareCategory::Star => "Star",
        RareCategory::Moon => "Moon",
        RareCategory::Sun => "Sun",
    }
}

#[derive(Debug)]
struct GroupObservation {
    parsed: ParsedGroupName,
    monster_levels: Option<(i32, i32)>,
    item_levels: Option<(i32, i32)>,
}

impl GroupObservation {
    /// Distance from the group's anchor level to the furthest level it spans.
    fn distance(&self) -> Option<i32> {
        let (anchor, (low, high)) = match self.parsed.grouping {
            GroupingStrategy::SharedByLevel => (self.parsed.anchor, self.monster_levels?),
            // Per-monster groups hold a single monster, so its level is the anchor.
            GroupingStrategy::PerMonster => (self.monster_levels?.0, self.item_levels?),
        };
        if !DISTANCE_ANCHOR_LEVELS.contains(&anchor) {
            return None;
        }
        Some((anchor - low).abs().max((high - anchor).abs()))
    }
}

fn widen(range: Option<(i32, i32)>, level: i32) -> Option<(i32, i32)> {
    Some(match range {
        Some((low, high)) => (low.min(level), high.max(level)),
        None => (level, level),
    })
}

/// Most common value, smallest first on ties.
fn mode(values: impl IntoIterator<Item = i32>) -> Option<i32> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut best: Option<(i32, usize)> = None;
    for (value, count) in counts {
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

/// Read the synthetic assignments and groups and infer the configuration that produced them.
pub fn inspect_assignments(conn: &Connection) -> Result<DetectedConfig> {
    let pattern = synthetic_like();

    let assignments: Vec<(String, f64, Option<i32>)> = conn
        .prepare(
            "SELECT a.ItemGroupCodeName128, a.DropRatio, ch.Lvl
             FROM _RefMonster_AssignedItemRndDrop a
             LEFT JOIN _RefObjCommon c ON a.RefMonsterID = c.ID
             LEFT JOIN _RefObjChar ch ON c.Link = ch.ID
             WHERE a.ItemGroupCodeName128 LIKE ?1 ESCAPE '\\'",
        )?
        .query_map(params![pattern], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<rusqlite::Result<_>>()?;

    if assignments.is_empty() {
        tracing::info!("No synthetic assignments found");
        return Ok(DetectedConfig::default());
    }

    let item_ranges: HashMap<String, (Option<i32>, Option<i32>)> = conn
        .prepare(
            "SELECT g.CodeName128, MIN(c.ReqLevel1), MAX(c.ReqLevel1)
             FROM _RefDropItemGroup g
             LEFT JOIN _RefObjCommon c ON g.RefItemID = c.ID
             WHERE g.CodeName128 LIKE ?1 ESCAPE '\\'
             GROUP BY g.CodeName128",
        )?
        .query_map(params![pattern], |row| Ok((row.get(0)?, (row.get(1)?, row.get(2)?))))?
        .collect::<rusqlite::Result<_>>()?;

    let mut detected = DetectedConfig {
        synthetic_assignments: assignments.len(),
        synthetic_groups: item_ranges.len(),
        ..Default::default()
    };
    let mut ratios: BTreeMap<RareCategory, f64> = BTreeMap::new();
    let mut groups: HashMap<String, GroupObservation> = HashMap::new();

    for (name, ratio, monster_level) in assignments {
        let Some(parsed) = parse_group_name(&name) else {
            tracing::warn!("Unrecognized synthetic group name: {}", name);
            detected.unrecognized_names += 1;
            continue;
        };

        let best = ratios.entry(parsed.category).or_insert(ratio);
        *best = best.max(ratio);
        detected.region_aware |= parsed.region.is_some();

        let observation = groups.entry(name).or_insert_with_key(|name| GroupObservation {
            parsed,
            monster_levels: None,
            item_levels: match item_ranges.get(name) {
                Some(&(Some(low), Some(high))) => Some((low, high)),
                _ => None,
            },
        });
        if let Some(level) = monster_level {
            observation.monster_levels = widen(observation.monster_levels, level);
        }
    }

    detected.categories = ratios
        .into_iter()
        .map(|(category, probability)| CategoryRate { category, probability })
        .collect();

    let has_monster_groups = groups.values().any(|g| g.parsed.grouping == GroupingStrategy::PerMonster);
    let has_level_groups = groups.values().any(|g| g.parsed.grouping == GroupingStrategy::SharedByLevel);
    detected.grouping = match (has_monster_groups, has_level_groups) {
        (true, false) => Some(GroupingStrategy::PerMonster),
        (false, true) => Some(GroupingStrategy::SharedByLevel),
        (true, true) => {
            tracing::warn!("Both per-monster and shared level groups present");
            None
        }
        (false, false) => None,
    };

    detected.level_distance = mode(groups.values().filter_map(GroupObservation::distance))
        .filter(|&distance| distance > 0)
        .and_then(|distance| u32::try_from(distance).ok());

    tracing::info!("Detected configuration: {}", detected);
    Ok(detected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressReporter;
    use crate::sync::BatchSynchronizer;
    use crate::test_support::{seed_catalog, TestDb};

    #[test]
    fn test_parse_group_name() {
        let parsed = parse_group_name("RARE_A_MOB_12_R7").unwrap();
        assert_eq!(parsed.category, RareCategory::Star);
        assert_eq!(parsed.grouping, GroupingStrategy::PerMonster);
        assert_eq!(parsed.anchor, 12);
        assert_eq!(parsed.region, Some(Region::Other(7)));

        let parsed = parse_group_name("RARE_C_LVL_50").unwrap();
        assert_eq!(parsed.category, RareCategory::Sun);
        assert_eq!(parsed.grouping, GroupingStrategy::SharedByLevel);
        assert_eq!(parsed.region, None);
        assert_eq!(parse_group_name("RARE_B_LVL_45_CN").unwrap().region, Some(Region::Cn));

        assert!(parse_group_name("RARE_D_LVL_50").is_none());
        assert!(parse_group_name("RARE_A_MOB_12_XX").is_none());
        assert!(parse_group_name("GROUP_MOB_CH_TIGER_ETC").is_none());
    }

    #[test]
    fn test_mode_prefers_smallest_on_tie() {
        assert_eq!(mode([5, 10, 5, 10, 3]), Some(5));
        assert_eq!(mode([7]), Some(7));
        assert_eq!(mode([]), None);
    }

    #[test]
    fn test_nothing_to_detect() {
        let test_db = TestDb::new();
        let conn = test_db.db.connection().unwrap();
        seed_catalog(&conn);

        let detected = inspect_assignments(&conn).unwrap();
        assert!(detected.is_empty());
        assert_eq!(detected, DetectedConfig::default());
        assert!(detected.to_sync_config(10).is_none());
        assert_eq!(detected.to_string(), "No existing configuration detected");
    }

    #[test]
    fn test_detects_per_monster_run() {
        let test_db = TestDb::new();
        let mut conn = test_db.db.connection().unwrap();
        seed_catalog(&conn);

        let mut config = SyncConfig::new(
            vec![
                CategoryRate { category: RareCategory::Moon, probability: 0.02 },
                CategoryRate { category: RareCategory::Star, probability: 0.05 },
            ],
            10,
        );
        config.region_mixing = false;
        let reporter = ProgressReporter::silent();
        BatchSynchronizer::new(&test_db.db, &reporter).run(&mut conn, &config).unwrap();

        let detected = inspect_assignments(&conn).unwrap();
        assert_eq!(
            detected.categories,
            vec![
                CategoryRate { category: RareCategory::Star, probability: 0.05 },
                CategoryRate { category: RareCategory::Moon, probability: 0.02 },
            ]
        );
        assert!(detected.region_aware);
        assert_eq!(detected.grouping, Some(GroupingStrategy::PerMonster));
        assert_eq!(detected.synthetic_assignments, 3);
        assert_eq!(detected.synthetic_groups, 3);
        assert_eq!(detected.unrecognized_names, 0);

        let rerun = detected.to_sync_config(10).unwrap();
        assert!(!rerun.region_mixing);
        assert_eq!(rerun.grouping, GroupingStrategy::PerMonster);
    }

    #[test]
    fn test_detects_level_distance_from_shared_groups() {
        let test_db = TestDb::new();
        let conn = test_db.db.connection().unwrap();
        seed_catalog(&conn);
        // Monster levels: 1 and 2 are 50, 3 is 105, 4 is 8.
        conn.execute_batch(
            "INSERT INTO _RefMonster_AssignedItemRndDrop VALUES
                (1, 1, 20, 'RARE_A_LVL_45', 0, 1, 1, 0.05, 0, 0),
                (1, 1, 21, 'RARE_A_LVL_55', 0, 1, 1, 0.05, 0, 0),
                (1, 2, 21, 'RARE_A_LVL_55', 0, 1, 1, 0.05, 0, 0),
                (1, 3, 22, 'RARE_A_LVL_100', 0, 1, 1, 0.03, 0, 0),
                (1, 1, 23, 'RARE_A_LVL_40', 0, 1, 1, 0.05, 0, 0),
                (1, 4, 24, 'RARE_A_LVL_10', 0, 1, 1, 0.05, 0, 0),
                (1, 4, 25, 'RARE_A_LVL_18', 0, 1, 1, 0.05, 0, 0),
                (1, 3, 26, 'RARE_X_SOMETHING', 0, 1, 1, 0.9, 0, 0);",
        )
        .unwrap();

        let detected = inspect_assignments(&conn).unwrap();
        assert_eq!(detected.level_distance, Some(5));
        assert_eq!(detected.grouping, Some(GroupingStrategy::SharedByLevel));
        assert!(!detected.region_aware);
        assert_eq!(
            detected.categories,
            vec![CategoryRate { category: RareCategory::Star, probability: 0.05 }]
        );
        assert_eq!(detected.unrecognized_names, 1);
        assert_eq!(detected.synthetic_assignments, 8);
        assert_eq!(detected.to_string(), "Star: 0.05, Level ±5, Region mixture, Shared level groups");
        let json: serde_json::Value = serde_json::from_str(&detected.to_json().unwrap()).unwrap();
        assert_eq!(json["grouping"], "shared-by-level");
        assert_eq!(json["categories"][0]["category"], "star");
    }

    #[test]
    fn test_mixed_naming_leaves_grouping_undetermined() {
        let test_db = TestDb::new();
        let conn = test_db.db.connection().unwrap();
        seed_catalog(&conn);
        conn.execute_batch(
            "INSERT INTO _RefMonster_AssignedItemRndDrop VALUES
                (1, 1, 20, 'RARE_B_LVL_45_CN', 0, 1, 1, 0.01, 0, 0),
                (1, 2, 21, 'RARE_B_MOB_2_EU', 0, 1, 1, 0.02, 0, 0);",
        )
        .unwrap();

        let detected = inspect_assignments(&conn).unwrap();
        assert_eq!(detected.grouping, None);
        assert!(detected.region_aware);
        assert_eq!(
            detected.categories,
            vec![CategoryRate { category: RareCategory::Moon, probability: 0.02 }]
        );
    }
}
