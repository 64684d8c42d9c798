//! Spaced-repetition scheduling core for a study backend.
//!
//! Users organize study material into summaries and flashcards derived
//! from them; both are reviewed on an SM-2-style schedule. This crate
//! owns the scheduling itself: the grade-to-interval computation, the
//! coupling that lets a summary's mastery influence its flashcards (and
//! vice versa), the store contract the scheduler reads and writes
//! through, and a bundled SQLite adapter. HTTP routing, authentication,
//! and content generation live in the enclosing application.

pub mod review;
pub mod store;

pub use review::{
    compute_next_review, CouplingResolver, Grade, GradeEvent, InvalidGrade, ItemKind, ItemRef,
    NextReview, ReviewError, ReviewService, ReviewSession, ScheduleError, SchedulerConfig,
    SchedulingResult, SchedulingState,
};
pub use store::{ItemStore, LatestGrade, SessionStore, SqliteStore, StoreError};
