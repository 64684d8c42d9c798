//! Item store contract and adapters
//!
//! The scheduling core never talks to a database directly; it goes
//! through the traits here. `ItemStore` is the narrow read-modify-write
//! contract grading needs, `SessionStore` adds the session lifecycle
//! (creation at authoring time, due listing, reset, tombstones). The
//! bundled SQLite adapter implements both.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::review::models::{
    Grade, ItemKind, ItemRef, ReviewSession, SchedulingState, SessionUpdate,
};

pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(ItemRef),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// An item's most recent review outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestGrade {
    pub grade: Grade,
    pub review_count: i32,
}

/// Read-modify-write contract for grading.
///
/// The integrating system must serialize concurrent updates per item
/// (read of the prior state atomic with the write of the new one, e.g. a
/// row-level update); the core assumes at most one in-flight update per
/// item and implements no locking of its own. No ordering is required
/// across different items.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Current scheduling state of an item. Tombstoned items are gone.
    async fn current_state(&self, item: ItemRef) -> Result<SchedulingState>;

    /// Ids of the non-tombstoned flashcards derived from a summary.
    async fn children(&self, summary_id: Uuid) -> Result<Vec<Uuid>>;

    /// Parent summary of a flashcard, if it has one.
    async fn parent(&self, flashcard_id: Uuid) -> Result<Option<Uuid>>;

    /// Most recent grade and review count, `None` if never reviewed.
    async fn latest_grade(&self, item: ItemRef) -> Result<Option<LatestGrade>>;

    /// Write the post-grading state back. All-or-nothing per item.
    async fn persist_update(&self, item: ItemRef, update: &SessionUpdate) -> Result<()>;
}

/// Session lifecycle operations around the grading core.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert the session created when an item is authored.
    async fn insert_session(&self, session: &ReviewSession) -> Result<()>;

    /// Fetch one session, tombstoned or not.
    async fn get_session(&self, item: ItemRef) -> Result<ReviewSession>;

    /// Pending reviews: not completed, not tombstoned, due at or before
    /// `now`, oldest first.
    async fn due_sessions(
        &self,
        kind: ItemKind,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<ReviewSession>>;

    /// Reset an item's progress back to a fresh schedule.
    async fn reset_session(
        &self,
        item: ItemRef,
        ease_factor: f32,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Change how often the item should come back once completed.
    async fn set_review_frequency(&self, item: ItemRef, days: i32) -> Result<()>;

    /// Record that a flashcard was derived from a summary.
    async fn link_flashcard(&self, flashcard_id: Uuid, summary_id: Uuid) -> Result<()>;

    /// Soft-delete: the session row survives but drops out of queries.
    async fn tombstone(&self, item: ItemRef, now: DateTime<Utc>) -> Result<()>;
}
