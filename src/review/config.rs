//! Scheduler configuration
//!
//! Every tunable the scheduler and resolver consult lives here and is
//! passed in explicitly, so test suites can sweep parameter sets without
//! touching global state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("{0} must be within 0.0 and 1.0")]
    OutsideUnitInterval(&'static str),
}

/// Tunables for the review scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Floor for the ease factor; intervals can shrink but never collapse.
    #[serde(default = "default_min_ease_factor")]
    pub min_ease_factor: f32,
    /// Ease factor assigned to a freshly created session.
    #[serde(default = "default_initial_ease_factor")]
    pub initial_ease_factor: f32,
    /// Subtracted from the ease factor after a failed recall.
    #[serde(default = "default_lapse_ease_penalty")]
    pub lapse_ease_penalty: f32,
    /// Effective quality at or above which a review counts as a success.
    #[serde(default = "default_success_quality")]
    pub success_quality: f32,
    /// Own-grade quality at or above which the session is marked completed.
    #[serde(default = "default_completion_quality")]
    pub completion_quality: f32,
    /// Interval after the second consecutive success (the first is 1 day).
    #[serde(default = "default_second_interval_days")]
    pub second_interval_days: i32,
    /// Reviews needed before a flashcard's coupling weight saturates at 1.0.
    #[serde(default = "default_weight_saturation_reviews")]
    pub weight_saturation_reviews: i32,
    /// Maximum share of a summary's effective quality taken from its
    /// flashcards' grades.
    #[serde(default = "default_summary_blend")]
    pub summary_blend: f32,
    /// Share of a flashcard's effective quality taken from its parent
    /// summary's last grade.
    #[serde(default = "default_flashcard_blend")]
    pub flashcard_blend: f32,
    /// Quality bonus when every child flashcard was last graded easiest.
    #[serde(default = "default_mastery_bonus")]
    pub mastery_bonus: f32,
}

fn default_min_ease_factor() -> f32 {
    1.3
}

fn default_initial_ease_factor() -> f32 {
    2.5
}

fn default_lapse_ease_penalty() -> f32 {
    0.2
}

fn default_success_quality() -> f32 {
    3.0
}

fn default_completion_quality() -> f32 {
    4.0
}

fn default_second_interval_days() -> i32 {
    6
}

fn default_weight_saturation_reviews() -> i32 {
    3
}

fn default_summary_blend() -> f32 {
    0.3
}

fn default_flashcard_blend() -> f32 {
    0.25
}

fn default_mastery_bonus() -> f32 {
    0.5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_ease_factor: default_min_ease_factor(),
            initial_ease_factor: default_initial_ease_factor(),
            lapse_ease_penalty: default_lapse_ease_penalty(),
            success_quality: default_success_quality(),
            completion_quality: default_completion_quality(),
            second_interval_days: default_second_interval_days(),
            weight_saturation_reviews: default_weight_saturation_reviews(),
            summary_blend: default_summary_blend(),
            flashcard_blend: default_flashcard_blend(),
            mastery_bonus: default_mastery_bonus(),
        }
    }
}

impl SchedulerConfig {
    /// Validate host-supplied values before they reach the scheduler.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ease_factor <= 0.0 {
            return Err(ConfigError::NotPositive("minEaseFactor"));
        }
        if self.weight_saturation_reviews <= 0 {
            return Err(ConfigError::NotPositive("weightSaturationReviews"));
        }
        if !(0.0..=1.0).contains(&self.summary_blend) {
            return Err(ConfigError::OutsideUnitInterval("summaryBlend"));
        }
        if !(0.0..=1.0).contains(&self.flashcard_blend) {
            return Err(ConfigError::OutsideUnitInterval("flashcardBlend"));
        }
        Ok(())
    }

    /// Confidence weight of one flashcard's grade, from its review count.
    pub fn confidence_weight(&self, review_count: i32) -> f32 {
        (review_count as f32 / self.weight_saturation_reviews as f32).min(1.0)
    }
}
