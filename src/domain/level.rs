//! Membership levels derived from a point balance.
//!
//! A [`LevelTable`] is an ascending list of thresholds. The level of a
//! balance is the entry with the highest threshold not exceeding it.
//! Balances below the first threshold (possible when debits are allowed to
//! go negative) map to the lowest level.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::LoyaltyError;

/// One membership tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LevelDefinition {
    /// Stable key, e.g. `"silver"`.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Minimum balance to hold this level.
    pub min_points: i64,
    /// Display icon.
    pub icon: String,
    /// Display color (CSS hex).
    pub color: String,
    /// Store discount granted at this level, in percent.
    pub discount_percent: u8,
}

impl LevelDefinition {
    /// Convenience constructor.
    #[must_use]
    pub fn new(
        key: &str,
        name: &str,
        min_points: i64,
        icon: &str,
        color: &str,
        discount_percent: u8,
    ) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            min_points,
            icon: icon.to_string(),
            color: color.to_string(),
            discount_percent,
        }
    }
}

/// Position of a balance between its level and the next one.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LevelProgress {
    /// Key of the level the balance currently holds.
    pub current: String,
    /// Key of the next level, `None` at the top.
    pub next: Option<String>,
    /// Linear progress towards `next` in `[0, 100]`; `100` at the top.
    pub percentage: f64,
    /// Points still missing to reach `next`; `0` at the top.
    pub points_to_next: i64,
}

/// Validated, strictly ascending level table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    lowest: LevelDefinition,
    higher: Vec<LevelDefinition>,
}

impl LevelTable {
    /// Builds a table from levels in ascending threshold order.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::InvalidLevelTable`] if the list is empty,
    /// the first threshold is not `0`, thresholds are not strictly
    /// increasing, a key repeats, or a discount exceeds 100%.
    pub fn new(levels: Vec<LevelDefinition>) -> Result<Self, LoyaltyError> {
        let mut iter = levels.into_iter();
        let Some(lowest) = iter.next() else {
            return Err(LoyaltyError::InvalidLevelTable(
                "at least one level is required".to_string(),
            ));
        };
        if lowest.min_points != 0 {
            return Err(LoyaltyError::InvalidLevelTable(format!(
                "lowest level {} must start at 0 points, not {}",
                lowest.key, lowest.min_points
            )));
        }
        let higher: Vec<LevelDefinition> = iter.collect();

        let mut previous = &lowest;
        for level in &higher {
            if level.min_points <= previous.min_points {
                return Err(LoyaltyError::InvalidLevelTable(format!(
                    "threshold of {} ({}) must exceed threshold of {} ({})",
                    level.key, level.min_points, previous.key, previous.min_points
                )));
            }
            previous = level;
        }

        let table = Self { lowest, higher };
        let mut seen = std::collections::HashSet::new();
        for level in table.levels() {
            if !seen.insert(level.key.as_str()) {
                return Err(LoyaltyError::InvalidLevelTable(format!(
                    "duplicate level key {}",
                    level.key
                )));
            }
            if level.discount_percent > 100 {
                return Err(LoyaltyError::InvalidLevelTable(format!(
                    "discount of {} exceeds 100%",
                    level.key
                )));
            }
        }
        Ok(table)
    }

    /// Iterates levels in ascending threshold order.
    pub fn levels(&self) -> impl Iterator<Item = &LevelDefinition> {
        std::iter::once(&self.lowest).chain(self.higher.iter())
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.higher.len().saturating_add(1)
    }

    /// Always `false`: a table holds at least one level.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Looks up a level by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&LevelDefinition> {
        self.levels().find(|l| l.key == key)
    }

    /// Returns the level held by `points`.
    #[must_use]
    pub fn level_for(&self, points: i64) -> &LevelDefinition {
        self.higher
            .iter()
            .rev()
            .find(|l| l.min_points <= points)
            .unwrap_or(&self.lowest)
    }

    /// Returns the first level above `points`, if any.
    #[must_use]
    pub fn next_after(&self, points: i64) -> Option<&LevelDefinition> {
        self.higher.iter().find(|l| l.min_points > points)
    }

    /// Interpolates progress from the current level to the next.
    #[must_use]
    pub fn progress(&self, points: i64) -> LevelProgress {
        let current = self.level_for(points);
        let Some(next) = self.next_after(points) else {
            return LevelProgress {
                current: current.key.clone(),
                next: None,
                percentage: 100.0,
                points_to_next: 0,
            };
        };

        let span = next.min_points.saturating_sub(current.min_points);
        let into = points.saturating_sub(current.min_points).max(0);
        #[allow(clippy::cast_precision_loss)]
        let percentage = if span > 0 {
            (into as f64 / span as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        LevelProgress {
            current: current.key.clone(),
            next: Some(next.key.clone()),
            percentage,
            points_to_next: next.min_points.saturating_sub(points),
        }
    }
}

impl Default for LevelTable {
    /// Bronze / silver / gold at 0 / 300 / 1000 points.
    fn default() -> Self {
        Self {
            lowest: LevelDefinition::new("bronze", "Bronze", 0, "🥉", "#CD7F32", 0),
            higher: vec![
                LevelDefinition::new("silver", "Silver", 300, "🥈", "#C0C0C0", 5),
                LevelDefinition::new("gold", "Gold", 1000, "🥇", "#FFD700", 10),
            ],
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_inclusive() {
        let table = LevelTable::default();
        assert_eq!(table.level_for(299).key, "bronze");
        assert_eq!(table.level_for(300).key, "silver");
        assert_eq!(table.level_for(999).key, "silver");
        assert_eq!(table.level_for(1000).key, "gold");
        assert_eq!(table.level_for(50_000).key, "gold");
    }

    #[test]
    fn negative_balance_maps_to_lowest_level() {
        let table = LevelTable::default();
        assert_eq!(table.level_for(-20).key, "bronze");
        let progress = table.progress(-20);
        assert!(progress.percentage.abs() < f64::EPSILON);
        assert_eq!(progress.points_to_next, 320);
    }

    #[test]
    fn progress_interpolates_between_thresholds() {
        let table = LevelTable::default();
        let progress = table.progress(650);
        assert_eq!(progress.current, "silver");
        assert_eq!(progress.next.as_deref(), Some("gold"));
        assert!((progress.percentage - 50.0).abs() < 1e-9);
        assert_eq!(progress.points_to_next, 350);

        let progress = table.progress(150);
        assert!((progress.percentage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn progress_at_top_level_is_full() {
        let progress = LevelTable::default().progress(1000);
        assert_eq!(progress.current, "gold");
        assert!(progress.next.is_none());
        assert!((progress.percentage - 100.0).abs() < f64::EPSILON);
        assert_eq!(progress.points_to_next, 0);
    }

    #[test]
    fn rejects_non_increasing_thresholds() {
        let levels = vec![
            LevelDefinition::new("a", "A", 0, "", "", 0),
            LevelDefinition::new("b", "B", 100, "", "", 0),
            LevelDefinition::new("c", "C", 100, "", "", 0),
        ];
        assert!(matches!(
            LevelTable::new(levels),
            Err(LoyaltyError::InvalidLevelTable(_))
        ));
    }

    #[test]
    fn rejects_empty_and_offset_tables() {
        assert!(LevelTable::new(Vec::new()).is_err());
        let levels = vec![LevelDefinition::new("a", "A", 10, "", "", 0)];
        assert!(LevelTable::new(levels).is_err());
    }

    #[test]
    fn rejects_duplicate_keys_and_oversized_discounts() {
        let dup = vec![
            LevelDefinition::new("a", "A", 0, "", "", 0),
            LevelDefinition::new("a", "A2", 5, "", "", 0),
        ];
        assert!(LevelTable::new(dup).is_err());

        let big = vec![LevelDefinition::new("a", "A", 0, "", "", 101)];
        assert!(LevelTable::new(big).is_err());
    }

    #[test]
    fn custom_table_round_trips_through_levels() {
        let levels = vec![
            LevelDefinition::new("starter", "Starter", 0, "*", "#000", 0),
            LevelDefinition::new("pro", "Pro", 50, "**", "#111", 20),
        ];
        let Ok(table) = LevelTable::new(levels.clone()) else {
            panic!("valid table rejected");
        };
        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
        assert_eq!(table.levels().cloned().collect::<Vec<_>>(), levels);
        assert_eq!(table.get("pro").map(|l| l.discount_percent), Some(20));
    }
}
