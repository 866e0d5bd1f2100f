//! Assignment planning: turns the catalogs into drop groups and assignments.

use crate::config::{GroupingStrategy, SyncConfig};
use crate::index::LevelIndex;
use crate::models::{
    level_group_name, monster_group_name, Assignment, DropGroup, Monster, RareCategory,
};
use crate::probability::effective_ratio;
use crate::region::Region;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Fully planned state of one run, held in memory before any write.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub items_processed: usize,
    pub groups: Vec<DropGroup>,
    pub assignments: Vec<Assignment>,
}

impl SyncPlan {
    /// Number of `_RefDropItemGroup` rows the plan expands into.
    pub fn group_rows(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }

    pub fn total_rows(&self) -> usize {
        self.group_rows() + self.assignments.len()
    }
}

/// Strictly increasing group id sequence seeded from the persisted maximum.
#[derive(Debug)]
pub struct GroupIdAllocator {
    next: i32,
}

impl GroupIdAllocator {
    pub fn starting_after(max_existing: i32) -> Self {
        Self { next: max_existing.max(0) + 1 }
    }

    pub fn allocate(&mut self) -> i32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

struct Candidate {
    monster_id: i32,
    monster_level: i32,
    category: RareCategory,
    base: f64,
    region: Option<Region>,
    items: Vec<i32>,
}

/// Plan groups and assignments for every monster and enabled category.
pub fn plan_assignments(
    monsters: &[Monster],
    index: &LevelIndex,
    config: &SyncConfig,
    ids: &mut GroupIdAllocator,
) -> SyncPlan {
    match config.grouping {
        GroupingStrategy::PerMonster => plan_per_monster(monsters, index, config, ids),
        GroupingStrategy::SharedByLevel => plan_shared_by_level(monsters, index, config, ids),
    }
}

fn plan_per_monster(
    monsters: &[Monster],
    index: &LevelIndex,
    config: &SyncConfig,
    ids: &mut GroupIdAllocator,
) -> SyncPlan {
    let distance = config.level_distance_i32();
    let threshold = config.level_threshold_i32();

    // Window gathering is independent per monster; ids are handed out afterwards in roster order.
    let candidates: Vec<Candidate> = monsters
        .par_iter()
        .flat_map_iter(|monster| {
            config.categories.iter().filter_map(move |rate| {
                let key = index.key_for(rate.category, monster.country);
                let items = index.collect_window(&key, monster.level, distance);
                if items.is_empty() {
                    return None;
                }
                Some(Candidate {
                    monster_id: monster.id,
                    monster_level: monster.level,
                    category: rate.category,
                    base: rate.probability,
                    region: key.region,
                    items,
                })
            })
        })
        .collect();

    let mut plan = SyncPlan::default();
    for candidate in candidates {
        let name = monster_group_name(candidate.category, candidate.monster_id, candidate.region);
        let group = DropGroup::equal_split(ids.allocate(), name, candidate.category, &candidate.items);
        let ratio = effective_ratio(candidate.base, candidate.monster_level, threshold, config.decrease_pct);
        plan.assignments.push(Assignment::new(candidate.monster_id, &group, ratio));
        plan.groups.push(group);
    }

    tracing::debug!(
        "Planned {} per-monster groups for {} monsters",
        plan.groups.len(),
        monsters.len()
    );
    plan
}

fn plan_shared_by_level(
    monsters: &[Monster],
    index: &LevelIndex,
    config: &SyncConfig,
    ids: &mut GroupIdAllocator,
) -> SyncPlan {
    let distance = config.level_distance_i32();
    let threshold = config.level_threshold_i32();

    let mut by_level: BTreeMap<i32, Vec<&Monster>> = BTreeMap::new();
    for monster in monsters {
        by_level.entry(monster.level).or_default().push(monster);
    }

    let mut plan = SyncPlan::default();
    for key in index.keys() {
        let Some(base) = config.probability(key.category) else {
            continue;
        };

        for level in index.levels(&key) {
            let name = level_group_name(key.category, level, key.region);
            let group = DropGroup::equal_split(ids.allocate(), name, key.category, index.lookup(&key, level));

            let low = level.saturating_sub(distance).max(0);
            let high = level.saturating_add(distance);
            for monster in by_level.range(low..=high).flat_map(|(_, ms)| ms.iter()) {
                if let Some(region) = key.region {
                    if Region::classify(monster.country) != region {
                        continue;
                    }
                }
                let ratio = effective_ratio(base, monster.level, threshold, config.decrease_pct);
                plan.assignments.push(Assignment::new(monster.id, &group, ratio));
            }

            plan.groups.push(group);
        }
    }

    tracing::debug!(
        "Planned {} level-shared groups with {} assignments",
        plan.groups.len(),
        plan.assignments.len()
    );
    plan
}
