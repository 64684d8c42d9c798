//! Grading orchestration
//!
//! The entry point an API layer drives: validate the grade, gather the
//! coupling signal, run the scheduler, persist, and hand back the result.

use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use super::algorithm::{compute_next_review, ScheduleError};
use super::config::{ConfigError, SchedulerConfig};
use super::coupling::{CouplingResolver, DEFAULT_LOOKUP_TIMEOUT};
use super::models::{
    Grade, GradeEvent, InvalidGrade, ItemKind, ItemRef, ReviewSession, SchedulingResult,
    SessionUpdate,
};
use crate::store::{ItemStore, SessionStore, StoreError};

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error(transparent)]
    InvalidGrade(#[from] InvalidGrade),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("review session not found for {0}")]
    SessionNotFound(ItemRef),

    #[error("review frequency must be at least 1 day, got {0}")]
    InvalidFrequency(i32),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ReviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(item) => ReviewError::SessionNotFound(item),
            other => ReviewError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;

/// Review scheduling service over an item store.
pub struct ReviewService<S> {
    store: S,
    config: SchedulerConfig,
    lookup_timeout: Duration,
}

impl<S> ReviewService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: SchedulerConfig::default(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_config(store: S, config: SchedulerConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        })
    }

    /// Cap each coupling lookup; grading never waits longer than this
    /// per read for the cross-item signal.
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: ItemStore> ReviewService<S> {
    /// Grade one item and schedule its next review.
    ///
    /// Out-of-range grades are rejected before anything is read or
    /// written. A coupling lookup failure never blocks the grading; the
    /// item is then scheduled on its own grade alone.
    pub async fn grade_item(
        &self,
        item_id: Uuid,
        kind: ItemKind,
        grade: i32,
    ) -> Result<SchedulingResult> {
        let grade = Grade::new(grade)?;
        let item = ItemRef { id: item_id, kind };

        let state = self.store.current_state(item).await?;

        let resolver =
            CouplingResolver::with_timeout(&self.store, &self.config, self.lookup_timeout);
        let coupling = resolver.resolve(item).await;

        let event = GradeEvent {
            item,
            grade,
            reviewed_at: Utc::now(),
        };
        let next = compute_next_review(&state, &event, coupling.as_ref(), &self.config)?;

        let update = SessionUpdate {
            ease_factor: next.ease_factor,
            interval_days: next.interval_days,
            review_count: state.review_count + 1,
            difficulty_rating: grade,
            last_reviewed: event.reviewed_at,
            next_review: next.next_review,
            is_completed: next.is_completed,
            last_weight_multiplier: next.weight_multiplier,
        };
        self.store.persist_update(item, &update).await?;

        log::debug!(
            "graded {} with {}: interval {} -> {} days",
            item,
            grade,
            state.interval_days,
            next.interval_days
        );

        Ok(SchedulingResult {
            next_review: next.next_review,
            new_interval: next.interval_days,
            new_ease_factor: next.ease_factor,
            new_weight_multiplier: next.weight_multiplier,
            is_completed: next.is_completed,
        })
    }
}

impl<S: ItemStore + SessionStore> ReviewService<S> {
    /// Open the review session for a just-authored summary. The item is
    /// pending immediately.
    pub async fn register_summary(&self, summary_id: Uuid) -> Result<ReviewSession> {
        let session = ReviewSession::new(ItemRef::summary(summary_id), &self.config, Utc::now());
        self.store.insert_session(&session).await?;
        Ok(session)
    }

    /// Open the review session for a flashcard derived from a summary.
    pub async fn register_flashcard(
        &self,
        flashcard_id: Uuid,
        summary_id: Uuid,
    ) -> Result<ReviewSession> {
        let session =
            ReviewSession::new(ItemRef::flashcard(flashcard_id), &self.config, Utc::now());
        self.store.insert_session(&session).await?;
        self.store.link_flashcard(flashcard_id, summary_id).await?;
        Ok(session)
    }

    /// Items of one kind due for review right now, oldest first.
    pub async fn pending_reviews(
        &self,
        kind: ItemKind,
        limit: Option<usize>,
    ) -> Result<Vec<ReviewSession>> {
        Ok(self.store.due_sessions(kind, Utc::now(), limit).await?)
    }

    /// Throw away an item's progress and schedule it fresh.
    pub async fn reset_progress(&self, item: ItemRef) -> Result<()> {
        self.store
            .reset_session(item, self.config.initial_ease_factor, Utc::now())
            .await?;
        Ok(())
    }

    pub async fn set_review_frequency(&self, item: ItemRef, days: i32) -> Result<()> {
        if days < 1 {
            return Err(ReviewError::InvalidFrequency(days));
        }
        self.store.set_review_frequency(item, days).await?;
        Ok(())
    }

    /// Soft-delete an item's session.
    pub async fn remove_item(&self, item: ItemRef) -> Result<()> {
        self.store.tombstone(item, Utc::now()).await?;
        Ok(())
    }
}
