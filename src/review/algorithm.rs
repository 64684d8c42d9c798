//! SM-2 variant with summary-flashcard coupling
//!
//! Computes the next review interval and ease factor from a grade,
//! optionally blended with a cross-item coupling signal.
//!
//! Grades (1-5, difficulty convention):
//! - 1: very easy, instant recall
//! - 2: easy recall
//! - 3: correct with effort
//! - 4: hard, mostly forgotten
//! - 5: very hard, no recall
//!
//! Internally everything runs on quality `q = 6 - grade` (higher = better
//! recall). A blended effective quality below `success_quality` resets the
//! interval to one day; at or above it the interval grows by the classic
//! 1 / 6 / round(interval * ease) ladder.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use super::config::SchedulerConfig;
use super::models::{CouplingSignal, GradeEvent, SchedulingState};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// Prior state is malformed. Indicates a persistence bug upstream;
    /// never silently corrected.
    #[error("invalid scheduling state: ease_factor={ease_factor}, interval_days={interval_days}")]
    InvalidState { ease_factor: f32, interval_days: i32 },
}

/// Result of computing the next review.
#[derive(Debug, Clone)]
pub struct NextReview {
    pub interval_days: i32,
    pub ease_factor: f32,
    pub next_review: DateTime<Utc>,
    /// Coupling share that was blended in, if a signal was available.
    /// Persisted on the session for transparency.
    pub weight_multiplier: Option<f32>,
    pub is_completed: bool,
}

/// Calculate the next review from the prior state and a new grade.
///
/// Pure: no I/O, no clock access (the due date is anchored to
/// `event.reviewed_at`), safe to call concurrently from anywhere.
pub fn compute_next_review(
    state: &SchedulingState,
    event: &GradeEvent,
    coupling: Option<&CouplingSignal>,
    config: &SchedulerConfig,
) -> Result<NextReview, ScheduleError> {
    if state.ease_factor <= 0.0 || state.interval_days < 0 {
        return Err(ScheduleError::InvalidState {
            ease_factor: state.ease_factor,
            interval_days: state.interval_days,
        });
    }

    let quality = event.grade.quality();
    let (effective_quality, weight_multiplier) = match coupling {
        Some(signal) => {
            let (q, m) = blend_quality(quality, signal, config);
            (q, Some(m))
        }
        None => (quality, None),
    };

    let mut ease_factor = state.ease_factor;
    let mut interval;

    if effective_quality >= config.success_quality {
        interval = match state.review_count {
            0 => 1,
            1 => config.second_interval_days,
            _ => (state.interval_days as f32 * ease_factor).round() as i32,
        };

        // EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02))
        let miss = 5.0 - effective_quality;
        ease_factor += 0.1 - miss * (0.08 + miss * 0.02);
        ease_factor = ease_factor.max(config.min_ease_factor);
    } else {
        // Failed recall: scheduling restarts from one day
        interval = 1;
        ease_factor = (ease_factor - config.lapse_ease_penalty).max(config.min_ease_factor);
    }

    interval = interval.max(1);

    Ok(NextReview {
        interval_days: interval,
        ease_factor,
        next_review: event.reviewed_at + Duration::days(interval as i64),
        weight_multiplier,
        // Completion follows the item's own grade; coupling never
        // completes an item on its neighbors' behalf.
        is_completed: event.grade.quality() >= config.completion_quality,
    })
}

/// Blend the item's own quality with the coupling signal.
///
/// Returns the effective quality and the applied multiplier (within
/// [0, 1]). Weight of zero means the own grade passed through untouched.
fn blend_quality(own: f32, signal: &CouplingSignal, config: &SchedulerConfig) -> (f32, f32) {
    match signal {
        CouplingSignal::ParentSummary { grade } => {
            let m = config.flashcard_blend.clamp(0.0, 1.0);
            ((1.0 - m) * own + m * grade.quality(), m)
        }
        CouplingSignal::ChildFlashcards {
            grades,
            all_easiest,
        } => {
            let total_weight: f32 = grades.iter().map(|g| g.weight).sum();
            let confidence = if grades.is_empty() {
                0.0
            } else {
                total_weight / grades.len() as f32
            };
            let m = (config.summary_blend * confidence).clamp(0.0, 1.0);

            let mut blended = if total_weight > 0.0 {
                let child_avg = grades
                    .iter()
                    .map(|g| g.weight * g.grade.quality())
                    .sum::<f32>()
                    / total_weight;
                (1.0 - m) * own + m * child_avg
            } else {
                own
            };

            if *all_easiest {
                blended = (blended + config.mastery_bonus).min(5.0);
            }

            (blended, m)
        }
    }
}
