//! Run configuration for a sync.
//!
//! Supports TOML files like:
//! ```toml
//! level_distance = 10
//! region_mixing = false
//! level_threshold = 100
//! decrease_pct = 10.0
//! grouping = "per-monster"
//!
//! [[categories]]
//! category = "star"
//! probability = 0.01
//!
//! [[categories]]
//! category = "sun"
//! probability = 0.002
//! ```

use crate::error::{RareDropError, Result};
use crate::models::RareCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// How planned items are bundled into drop groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingStrategy {
    /// One group per (monster, category) holding every item in the monster's level window.
    #[default]
    PerMonster,
    /// One group per (category, item level[, region]) shared by every monster in range.
    SharedByLevel,
}

/// Base drop probability for one enabled category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryRate {
    pub category: RareCategory,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub categories: Vec<CategoryRate>,
    #[serde(default)]
    pub level_distance: u32,
    #[serde(default = "default_region_mixing")]
    pub region_mixing: bool,
    /// 0 disables decay.
    #[serde(default)]
    pub level_threshold: u32,
    /// 0 disables decay.
    #[serde(default)]
    pub decrease_pct: f64,
    #[serde(default)]
    pub grouping: GroupingStrategy,
}

fn default_region_mixing() -> bool {
    true
}

impl SyncConfig {
    pub fn new(categories: Vec<CategoryRate>, level_distance: u32) -> Self {
        Self {
            categories,
            level_distance,
            region_mixing: default_region_mixing(),
            level_threshold: 0,
            decrease_pct: 0.0,
            grouping: GroupingStrategy::default(),
        }
    }

    /// Load a run configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RareDropError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read sync config from {:?}: {}", path, e),
            ))
        })?;

        Self::from_str(&content)
    }

    /// Parse a run configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RareDropError::Config(format!("Failed to parse sync config TOML: {}", e)))
    }

    /// Check every field against its domain.
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(RareDropError::Validation(
                "at least one rare category must be enabled".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for rate in &self.categories {
            if !seen.insert(rate.category) {
                return Err(RareDropError::Validation(format!(
                    "category {} is listed more than once",
                    rate.category.label()
                )));
            }
            if !rate.probability.is_finite() || rate.probability <= 0.0 || rate.probability > 1.0 {
                return Err(RareDropError::Validation(format!(
                    "probability for {} must be in (0, 1], got {}",
                    rate.category.label(),
                    rate.probability
                )));
            }
        }

        if !self.decrease_pct.is_finite() || !(0.0..=100.0).contains(&self.decrease_pct) {
            return Err(RareDropError::Validation(format!(
                "decrease percent must be in [0, 100], got {}",
                self.decrease_pct
            )));
        }

        if i32::try_from(self.level_distance).is_err() || i32::try_from(self.level_threshold).is_err() {
            return Err(RareDropError::Validation(
                "level distance and threshold must fit in a game level".to_string(),
            ));
        }

        Ok(())
    }

    pub fn probability(&self, category: RareCategory) -> Option<f64> {
        self.categories
            .iter()
            .find(|rate| rate.category == category)
            .map(|rate| rate.probability)
    }

    pub fn level_distance_i32(&self) -> i32 {
        i32::try_from(self.level_distance).unwrap_or(i32::MAX)
    }

    pub fn level_threshold_i32(&self) -> i32 {
        i32::try_from(self.level_threshold).unwrap_or(i32::MAX)
    }
}
