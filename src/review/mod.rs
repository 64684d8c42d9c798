//! Review scheduling for summaries and their derived flashcards
//!
//! This module provides:
//! - SM-2 style interval and ease computation with cross-item coupling
//! - Review session models and scheduler configuration
//! - The coupling resolver that gathers signals from related items
//! - The grading service an API layer drives

pub mod algorithm;
pub mod config;
pub mod coupling;
pub mod models;
pub mod service;

pub use algorithm::{compute_next_review, NextReview, ScheduleError};
pub use config::{ConfigError, SchedulerConfig};
pub use coupling::CouplingResolver;
pub use models::*;
pub use service::{ReviewError, ReviewService};
