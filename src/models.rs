use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A question/answer pair the learner drills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub prompt: String,
    pub reference_answer: Option<String>,
    pub category: Option<String>,
    pub difficulty: Difficulty,
    /// Mastery score, 0..=5. 5 means fully mastered.
    pub level: i32,
    pub last_reviewed: Option<String>,
    /// Absent for brand-new items and for mastered (level 5) items;
    /// `level` disambiguates the two.
    pub next_due: Option<String>,
    pub created_at: String,
}

impl Item {
    pub fn level_label(&self) -> &'static str {
        match self.level {
            0 => "New",
            1 => "Learning",
            2 => "Familiar",
            3 => "Comfortable",
            4 => "Proficient",
            5 => "Mastered",
            _ => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "e" => Some(Difficulty::Easy),
            "medium" | "m" => Some(Difficulty::Medium),
            "hard" | "h" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    /// Parse with the documented fallback: missing or unrecognized
    /// difficulty is treated as medium.
    pub fn from_str_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or(Difficulty::Medium)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

/// One submitted review, immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: i64,
    pub item_id: i64,
    pub user_id: Option<i64>,
    pub user_answer: Option<String>,
    /// Self-rating, 1..=5.
    pub rating: i32,
    pub duration_seconds: Option<i64>,
    pub reviewed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

/// Count and duration aggregates for one category or difficulty bucket.
/// Duration fields only cover events that carried a duration; an empty
/// bucket averages to 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub count: i64,
    pub total_duration_seconds: i64,
    pub avg_duration_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Counts per mastery level; all keys 0..=5 are always present.
    pub level_distribution: BTreeMap<i32, i64>,
    pub today_review_count: i64,
    pub category_stats: BTreeMap<String, DurationStats>,
    pub difficulty_stats: BTreeMap<String, DurationStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: i64,
    /// Still global: mastery belongs to the item, not the user.
    pub level_distribution: BTreeMap<i32, i64>,
    pub today_review_count: i64,
    pub category_stats: BTreeMap<String, DurationStats>,
    pub difficulty_stats: BTreeMap<String, DurationStats>,
    pub total_duration_seconds_today: i64,
    pub avg_duration_seconds_overall: f64,
}

/// Stats come in two deliberately different shapes: duration metrics are
/// a per-user feature and never appear on the global report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum StatsReport {
    Global(GlobalStats),
    User(UserStats),
}

impl StatsReport {
    pub fn empty(user_id: Option<i64>) -> Self {
        let level_distribution = zeroed_level_distribution();
        match user_id {
            None => StatsReport::Global(GlobalStats {
                level_distribution,
                ..Default::default()
            }),
            Some(user_id) => StatsReport::User(UserStats {
                user_id,
                level_distribution,
                ..Default::default()
            }),
        }
    }

    pub fn level_distribution(&self) -> &BTreeMap<i32, i64> {
        match self {
            StatsReport::Global(g) => &g.level_distribution,
            StatsReport::User(u) => &u.level_distribution,
        }
    }

    pub fn today_review_count(&self) -> i64 {
        match self {
            StatsReport::Global(g) => g.today_review_count,
            StatsReport::User(u) => u.today_review_count,
        }
    }
}

pub fn zeroed_level_distribution() -> BTreeMap<i32, i64> {
    (0..=5).map(|level| (level, 0)).collect()
}

/// Outcome counts from a CSV bulk import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub skipped: usize,
    pub failed: Vec<ImportFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    pub line: usize,
    pub reason: String,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod difficulty_tests {
        use super::*;

        #[test]
        fn as_str_returns_correct_values() {
            assert_eq!(Difficulty::Easy.as_str(), "easy");
            assert_eq!(Difficulty::Medium.as_str(), "medium");
            assert_eq!(Difficulty::Hard.as_str(), "hard");
        }

        #[test]
        fn from_str_valid_inputs() {
            assert_eq!(Difficulty::from_str("easy"), Some(Difficulty::Easy));
            assert_eq!(Difficulty::from_str("medium"), Some(Difficulty::Medium));
            assert_eq!(Difficulty::from_str("hard"), Some(Difficulty::Hard));
        }

        #[test]
        fn from_str_case_insensitive_and_trimmed() {
            assert_eq!(Difficulty::from_str("EASY"), Some(Difficulty::Easy));
            assert_eq!(Difficulty::from_str("  Hard "), Some(Difficulty::Hard));
        }

        #[test]
        fn from_str_invalid_returns_none() {
            assert_eq!(Difficulty::from_str("brutal"), None);
            assert_eq!(Difficulty::from_str(""), None);
        }

        #[test]
        fn from_str_or_default_falls_back_to_medium() {
            assert_eq!(Difficulty::from_str_or_default("hard"), Difficulty::Hard);
            assert_eq!(Difficulty::from_str_or_default(""), Difficulty::Medium);
            assert_eq!(Difficulty::from_str_or_default("nope"), Difficulty::Medium);
        }

        #[test]
        fn default_is_medium() {
            assert_eq!(Difficulty::default(), Difficulty::Medium);
        }
    }

    mod item_tests {
        use super::*;

        fn make_item(level: i32) -> Item {
            Item {
                id: 1,
                prompt: "What is ownership?".to_string(),
                reference_answer: None,
                category: None,
                difficulty: Difficulty::Medium,
                level,
                last_reviewed: None,
                next_due: None,
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
            }
        }

        #[test]
        fn level_labels() {
            assert_eq!(make_item(0).level_label(), "New");
            assert_eq!(make_item(3).level_label(), "Comfortable");
            assert_eq!(make_item(5).level_label(), "Mastered");
        }

        #[test]
        fn level_label_out_of_range() {
            assert_eq!(make_item(-1).level_label(), "Unknown");
            assert_eq!(make_item(9).level_label(), "Unknown");
        }
    }

    mod stats_report_tests {
        use super::*;

        #[test]
        fn empty_global_has_all_levels() {
            let report = StatsReport::empty(None);
            let dist = report.level_distribution();
            assert_eq!(dist.len(), 6);
            for level in 0..=5 {
                assert_eq!(dist[&level], 0);
            }
            assert_eq!(report.today_review_count(), 0);
        }

        #[test]
        fn empty_user_carries_user_id() {
            match StatsReport::empty(Some(7)) {
                StatsReport::User(u) => {
                    assert_eq!(u.user_id, 7);
                    assert_eq!(u.total_duration_seconds_today, 0);
                    assert_eq!(u.avg_duration_seconds_overall, 0.0);
                }
                StatsReport::Global(_) => panic!("expected user-scoped report"),
            }
        }

        #[test]
        fn global_report_omits_duration_fields() {
            let json = serde_json::to_string(&StatsReport::empty(None)).unwrap();
            assert!(json.contains("\"scope\":\"global\""));
            assert!(!json.contains("total_duration_seconds_today"));
            assert!(!json.contains("avg_duration_seconds_overall"));
        }

        #[test]
        fn user_report_includes_duration_fields() {
            let json = serde_json::to_string(&StatsReport::empty(Some(3))).unwrap();
            assert!(json.contains("\"scope\":\"user\""));
            assert!(json.contains("\"user_id\":3"));
            assert!(json.contains("total_duration_seconds_today"));
            assert!(json.contains("avg_duration_seconds_overall"));
        }
    }

    mod json_output_tests {
        use super::*;

        #[test]
        fn ok_with_string() {
            let output = JsonOutput::ok("test data");
            assert!(output.success);
            assert_eq!(output.data, Some("test data"));
            assert!(output.error.is_none());
        }

        #[test]
        fn err_with_string() {
            let output = JsonOutput::<()>::err("something went wrong");
            assert!(!output.success);
            assert!(output.data.is_none());
            assert_eq!(output.error, Some("something went wrong".to_string()));
        }

        #[test]
        fn serializes_ok_correctly() {
            let output = JsonOutput::ok("test");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains("\"success\":true"));
            assert!(json.contains("\"data\":\"test\""));
            assert!(json.contains("\"error\":null"));
        }

        #[test]
        fn serializes_err_correctly() {
            let output = JsonOutput::<()>::err("error");
            let json = serde_json::to_string(&output).unwrap();
            assert!(json.contains("\"success\":false"));
            assert!(json.contains("\"data\":null"));
            assert!(json.contains("\"error\":\"error\""));
        }
    }
}
