//! Level-based drop ratio decay.

/// Lowest ratio ever produced, as a fraction of the base rate.
pub const RATIO_FLOOR_FRACTION: f64 = 0.01;

/// Effective drop ratio for a monster of `monster_level`.
///
/// Monsters at or below `threshold` keep `base`. Above it the ratio shrinks by
/// `decrease_pct` percent per level and never falls below 1% of `base`.
/// A zero threshold or zero decrease disables decay.
pub fn effective_ratio(base: f64, monster_level: i32, threshold: i32, decrease_pct: f64) -> f64 {
    if threshold <= 0 || decrease_pct <= 0.0 || monster_level <= threshold {
        return base;
    }

    let levels_above = monster_level - threshold;
    let factor = (1.0 - decrease_pct / 100.0).powi(levels_above);
    (base * factor).max(base * RATIO_FLOOR_FRACTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_scenario() {
        let ratio = effective_ratio(0.01, 105, 100, 10.0);
        assert!((ratio - 0.0059049).abs() < 1e-12);
    }

    #[test]
    fn test_at_threshold_is_unchanged() {
        assert_eq!(effective_ratio(0.01, 100, 100, 10.0), 0.01);
        assert_eq!(effective_ratio(0.01, 1, 100, 10.0), 0.01);
    }

    #[test]
    fn test_disabled_decay() {
        assert_eq!(effective_ratio(0.25, 120, 0, 10.0), 0.25);
        assert_eq!(effective_ratio(0.25, 120, 100, 0.0), 0.25);
    }

    #[test]
    fn test_full_decrease_floors_exactly() {
        assert_eq!(effective_ratio(0.01, 300, 100, 100.0), 0.01 * 0.01);
        assert_eq!(effective_ratio(0.5, 101, 100, 100.0), 0.5 * 0.01);
    }

    #[test]
    fn test_monotonic_and_floored() {
        let base = 0.3;
        let mut previous = effective_ratio(base, 50, 50, 7.5);
        for level in 51..400 {
            let ratio = effective_ratio(base, level, 50, 7.5);
            assert!(ratio <= previous);
            assert!(ratio >= base * RATIO_FLOOR_FRACTION);
            previous = ratio;
        }
    }
}
