use chrono::{DateTime, Duration, Utc};

/// Days until the next review, indexed by mastery level 0..4.
/// A level past the end of the table means the item is fully mastered
/// and leaves the review rotation.
pub const REVIEW_INTERVALS_DAYS: [i64; 5] = [0, 1, 3, 5, 7];

/// Highest mastery level an item can reach.
pub const MAX_LEVEL: i32 = 5;

/// Apply a 1-5 self-rating to the current mastery level.
///
/// 4-5 promotes (capped at 5), 1-2 demotes (floored at 0), 3 keeps the
/// level unchanged.
pub fn update_level(level: i32, rating: i32) -> i32 {
    if rating >= 4 {
        (level + 1).min(MAX_LEVEL)
    } else if rating <= 2 {
        (level - 1).max(0)
    } else {
        level
    }
}

/// Compute the next due timestamp for an item at `level`.
///
/// Returns `None` once the level is past the interval table (level 5):
/// mastered items are no longer scheduled.
pub fn next_due(level: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if level < 0 || level as usize >= REVIEW_INTERVALS_DAYS.len() {
        return None;
    }
    Some(now + Duration::days(REVIEW_INTERVALS_DAYS[level as usize]))
}

#[cfg(test)]
mod tests {
    use super::*;

    mod update_level_tests {
        use super::*;

        #[test]
        fn high_rating_promotes() {
            for level in 0..=4 {
                assert_eq!(update_level(level, 4), level + 1);
                assert_eq!(update_level(level, 5), level + 1);
            }
        }

        #[test]
        fn promotion_caps_at_five() {
            assert_eq!(update_level(5, 4), 5);
            assert_eq!(update_level(5, 5), 5);
        }

        #[test]
        fn low_rating_demotes() {
            for level in 1..=5 {
                assert_eq!(update_level(level, 1), level - 1);
                assert_eq!(update_level(level, 2), level - 1);
            }
        }

        #[test]
        fn demotion_floors_at_zero() {
            assert_eq!(update_level(0, 1), 0);
            assert_eq!(update_level(0, 2), 0);
        }

        #[test]
        fn middle_rating_keeps_level() {
            for level in 0..=5 {
                assert_eq!(update_level(level, 3), level);
            }
        }
    }

    mod next_due_tests {
        use super::*;

        #[test]
        fn mastered_level_is_never_scheduled() {
            let now = Utc::now();
            assert!(next_due(5, now).is_none());
            assert!(next_due(6, now).is_none());
        }

        #[test]
        fn due_follows_interval_table() {
            let now = Utc::now();
            for (level, days) in REVIEW_INTERVALS_DAYS.iter().enumerate() {
                let due = next_due(level as i32, now).unwrap();
                assert_eq!(due, now + Duration::days(*days));
            }
        }

        #[test]
        fn level_zero_is_due_immediately() {
            let now = Utc::now();
            assert_eq!(next_due(0, now), Some(now));
        }

        #[test]
        fn exact_table_values() {
            let now = Utc::now();
            assert_eq!(next_due(1, now), Some(now + Duration::days(1)));
            assert_eq!(next_due(2, now), Some(now + Duration::days(3)));
            assert_eq!(next_due(3, now), Some(now + Duration::days(5)));
            assert_eq!(next_due(4, now), Some(now + Duration::days(7)));
        }
    }
}
