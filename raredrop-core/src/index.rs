//! Level index over the rare item catalog.

use crate::models::{Item, RareCategory};
use crate::region::Region;
use std::collections::{BTreeMap, HashMap};

/// Partition key. `region` is `None` when regions are mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexKey {
    pub category: RareCategory,
    pub region: Option<Region>,
}

/// Maps (category[, region]) -> level -> item ids in catalog scan order.
#[derive(Debug, Default)]
pub struct LevelIndex {
    region_aware: bool,
    partitions: HashMap<IndexKey, BTreeMap<i32, Vec<i32>>>,
}

impl LevelIndex {
    pub fn build(items: &[Item], region_mixing: bool) -> Self {
        let region_aware = !region_mixing;
        let mut partitions: HashMap<IndexKey, BTreeMap<i32, Vec<i32>>> = HashMap::new();

        for item in items {
            let key = IndexKey {
                category: item.category,
                region: region_aware.then(|| Region::classify(item.country)),
            };
            partitions
                .entry(key)
                .or_default()
                .entry(item.level)
                .or_default()
                .push(item.id);
        }

        Self { region_aware, partitions }
    }

    pub fn is_region_aware(&self) -> bool {
        self.region_aware
    }

    /// Key a monster of `country` falls into for `category`.
    pub fn key_for(&self, category: RareCategory, country: i32) -> IndexKey {
        IndexKey {
            category,
            region: self.region_aware.then(|| Region::classify(country)),
        }
    }

    /// Items at exactly `level`, or an empty slice.
    pub fn lookup(&self, key: &IndexKey, level: i32) -> &[i32] {
        self.partitions
            .get(key)
            .and_then(|levels| levels.get(&level))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Items with a level in `[max(0, center - distance), center + distance]`, ordered by level.
    pub fn collect_window(&self, key: &IndexKey, center: i32, distance: i32) -> Vec<i32> {
        let Some(levels) = self.partitions.get(key) else {
            return Vec::new();
        };
        let low = center.saturating_sub(distance).max(0);
        let high = center.saturating_add(distance);

        if low > high {
            return Vec::new();
        }

        levels
            .range(low..=high)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    /// Partition keys in a stable order.
    pub fn keys(&self) -> Vec<IndexKey> {
        let mut keys: Vec<IndexKey> = self.partitions.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Levels present in a partition, ascending.
    pub fn levels(&self, key: &IndexKey) -> Vec<i32> {
        self.partitions
            .get(key)
            .map(|levels| levels.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Number of distinct (partition, level) buckets.
    pub fn bucket_count(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i32, category: RareCategory, level: i32, country: i32) -> Item {
        Item { id, category, level, country }
    }

    fn catalog() -> Vec<Item> {
        vec![
            item(1, RareCategory::Star, 50, 0),
            item(2, RareCategory::Star, 50, 1),
            item(3, RareCategory::Star, 55, 3),
            item(4, RareCategory::Moon, 50, 0),
            item(5, RareCategory::Star, 70, 0),
        ]
    }

    #[test]
    fn test_mixed_index_ignores_region() {
        let index = LevelIndex::build(&catalog(), true);
        let key = index.key_for(RareCategory::Star, 1);
        assert_eq!(key.region, None);
        assert_eq!(index.lookup(&key, 50), &[1, 2]);
        assert_eq!(index.collect_window(&key, 50, 5), vec![1, 2, 3]);
    }

    #[test]
    fn test_region_aware_index_partitions() {
        let index = LevelIndex::build(&catalog(), false);
        let cn = index.key_for(RareCategory::Star, 3);
        let eu = index.key_for(RareCategory::Star, 1);
        assert_eq!(cn.region, Some(Region::Cn));
        assert_eq!(index.collect_window(&cn, 50, 10), vec![1, 3]);
        assert_eq!(index.collect_window(&eu, 50, 10), vec![2]);
    }

    #[test]
    fn test_missing_lookups_are_empty() {
        let index = LevelIndex::build(&catalog(), true);
        let sun = index.key_for(RareCategory::Sun, 0);
        assert!(index.lookup(&sun, 50).is_empty());
        assert!(index.collect_window(&sun, 50, 100).is_empty());
        let star = index.key_for(RareCategory::Star, 0);
        assert!(index.lookup(&star, 51).is_empty());
    }

    #[test]
    fn test_window_is_inclusive_and_floored() {
        let index = LevelIndex::build(&catalog(), true);
        let star = index.key_for(RareCategory::Star, 0);
        assert_eq!(index.collect_window(&star, 60, 10), vec![1, 2, 3, 5]);
        assert_eq!(index.collect_window(&star, 3, 50), vec![1, 2]);
        assert!(index.collect_window(&star, 3, 10).is_empty());
    }

    #[test]
    fn test_keys_and_levels() {
        let index = LevelIndex::build(&catalog(), true);
        assert_eq!(index.partition_count(), 2);
        assert_eq!(index.bucket_count(), 4);
        let star = index.key_for(RareCategory::Star, 0);
        assert_eq!(index.levels(&star), vec![50, 55, 70]);
    }

    #[test]
    fn test_huge_window_scans_only_present_levels() {
        let index = LevelIndex::build(&catalog(), true);
        let star = index.key_for(RareCategory::Star, 0);

        let started = std::time::Instant::now();
        assert_eq!(index.collect_window(&star, 50, i32::MAX), vec![1, 2, 3, 5]);
        assert_eq!(index.collect_window(&star, i32::MAX, i32::MAX), vec![1, 2, 3, 5]);
        assert_eq!(index.collect_window(&star, 1_000_000, 50_000_000).len(), 4);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }
}
