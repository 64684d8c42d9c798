//! Data models for review scheduling

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::config::SchedulerConfig;

/// The two kinds of reviewable items.
///
/// A summary is authored directly; flashcards are derived from a summary
/// and keep a link back to it. Review outcomes flow between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Summary,
    Flashcard,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Summary => "summary",
            ItemKind::Flashcard => "flashcard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "summary" => Some(ItemKind::Summary),
            "flashcard" => Some(ItemKind::Flashcard),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle addressing one reviewable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub id: Uuid,
    pub kind: ItemKind,
}

impl ItemRef {
    pub fn summary(id: Uuid) -> Self {
        Self {
            id,
            kind: ItemKind::Summary,
        }
    }

    pub fn flashcard(id: Uuid) -> Self {
        Self {
            id,
            kind: ItemKind::Flashcard,
        }
    }
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Error for a difficulty rating outside the accepted range.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("grade must be between 1 and 5, got {0}")]
pub struct InvalidGrade(pub i32);

/// A validated 1-5 difficulty rating.
///
/// One convention everywhere: 1 = easiest (best recall), 5 = hardest
/// (worst recall). The scheduler works on the derived quality
/// `q = 6 - grade`, where higher means better recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Grade(i32);

impl Grade {
    pub fn new(value: i32) -> Result<Self, InvalidGrade> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidGrade(value))
        }
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    /// Recall quality on the SM-2 scale (1-5, higher = better recall).
    pub fn quality(&self) -> f32 {
        (6 - self.0) as f32
    }
}

impl TryFrom<i32> for Grade {
    type Error = InvalidGrade;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Grade::new(value)
    }
}

impl From<Grade> for i32 {
    fn from(grade: Grade) -> i32 {
        grade.0
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single review submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEvent {
    pub item: ItemRef,
    pub grade: Grade,
    /// When the review happened. Due dates are computed from this, never
    /// from a clock read inside the scheduler.
    pub reviewed_at: DateTime<Utc>,
}

/// The prior scheduling state the scheduler computes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingState {
    pub ease_factor: f32,
    pub interval_days: i32,
    pub review_count: i32,
}

/// One child flashcard's latest grade with its confidence weight.
///
/// Weight saturates at 1.0 once the flashcard has been reviewed
/// `weight_saturation_reviews` times; a barely-reviewed card contributes
/// little to its parent's effective quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedGrade {
    pub grade: Grade,
    pub weight: f32,
}

/// Cross-item signal gathered before scheduling. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum CouplingSignal {
    /// Grading a flashcard: the parent summary's most recent grade.
    ParentSummary { grade: Grade },
    /// Grading a summary: the latest grades of its reviewed flashcards.
    /// `all_easiest` is true when every one of them is grade 1.
    ChildFlashcards {
        grades: Vec<WeightedGrade>,
        all_easiest: bool,
    },
}

/// What the caller gets back from a completed grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingResult {
    pub next_review: DateTime<Utc>,
    pub new_interval: i32,
    pub new_ease_factor: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_weight_multiplier: Option<f32>,
    pub is_completed: bool,
}

/// Absolute values written back to a session after a grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub ease_factor: f32,
    pub interval_days: i32,
    pub review_count: i32,
    pub difficulty_rating: Grade,
    pub last_reviewed: DateTime<Utc>,
    pub next_review: DateTime<Utc>,
    pub is_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_weight_multiplier: Option<f32>,
}

fn default_review_frequency() -> i32 {
    1
}

/// Persisted review record, one per summary or flashcard.
///
/// Created the moment the item is authored and mutated only through
/// grading, reset, or frequency updates. Never hard-deleted; the owning
/// item carries a tombstone and tombstoned sessions drop out of queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSession {
    pub item: ItemRef,
    pub ease_factor: f32,
    pub interval_days: i32,
    #[serde(default)]
    pub review_count: i32,
    /// Grade from the most recent review, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty_rating: Option<Grade>,
    pub next_review: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reviewed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_weight_multiplier: Option<f32>,
    #[serde(default = "default_review_frequency")]
    pub review_frequency_days: i32,
    pub created_at: DateTime<Utc>,
}

impl ReviewSession {
    /// Fresh session for a just-authored item.
    ///
    /// The first review date is set one second in the past so the item
    /// shows up as pending immediately.
    pub fn new(item: ItemRef, config: &SchedulerConfig, now: DateTime<Utc>) -> Self {
        Self {
            item,
            ease_factor: config.initial_ease_factor,
            interval_days: 1,
            review_count: 0,
            difficulty_rating: None,
            next_review: now - Duration::seconds(1),
            last_reviewed: None,
            is_completed: false,
            last_weight_multiplier: None,
            review_frequency_days: default_review_frequency(),
            created_at: now,
        }
    }

    /// Check if the session is due for review.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_completed && self.next_review <= now
    }

    pub fn state(&self) -> SchedulingState {
        SchedulingState {
            ease_factor: self.ease_factor,
            interval_days: self.interval_days,
            review_count: self.review_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_accepts_full_range() {
        for v in 1..=5 {
            assert!(Grade::new(v).is_ok(), "grade {} should be valid", v);
        }
    }

    #[test]
    fn grade_rejects_out_of_range() {
        for v in [-1, 0, 6, 100] {
            assert_eq!(Grade::new(v), Err(InvalidGrade(v)));
        }
    }

    #[test]
    fn quality_inverts_grade() {
        assert_eq!(Grade::new(1).unwrap().quality(), 5.0);
        assert_eq!(Grade::new(3).unwrap().quality(), 3.0);
        assert_eq!(Grade::new(5).unwrap().quality(), 1.0);
    }

    #[test]
    fn grade_deserialization_validates() {
        let ok: Grade = serde_json::from_str("2").unwrap();
        assert_eq!(ok.value(), 2);
        assert!(serde_json::from_str::<Grade>("0").is_err());
        assert!(serde_json::from_str::<Grade>("9").is_err());
    }

    #[test]
    fn new_session_is_immediately_due() {
        let now = Utc::now();
        let session = ReviewSession::new(
            ItemRef::summary(Uuid::new_v4()),
            &SchedulerConfig::default(),
            now,
        );
        assert!(session.is_due(now));
        assert_eq!(session.review_count, 0);
        assert_eq!(session.interval_days, 1);
        assert!(session.last_reviewed.is_none());
    }

    #[test]
    fn completed_session_is_not_due() {
        let now = Utc::now();
        let mut session = ReviewSession::new(
            ItemRef::flashcard(Uuid::new_v4()),
            &SchedulerConfig::default(),
            now,
        );
        session.is_completed = true;
        assert!(!session.is_due(now));
    }

    #[test]
    fn scheduling_result_serializes_camel_case() {
        let result = SchedulingResult {
            next_review: Utc::now(),
            new_interval: 6,
            new_ease_factor: 2.5,
            new_weight_multiplier: None,
            is_completed: false,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"nextReview\""));
        assert!(json.contains("\"newInterval\":6"));
        assert!(json.contains("\"isCompleted\":false"));
        // absent multiplier is omitted entirely
        assert!(!json.contains("newWeightMultiplier"));
    }
}
