//! Coupling signal resolution
//!
//! Gathers the cross-item signal the scheduler blends in: a summary is
//! influenced by its flashcards' latest grades, a flashcard by its parent
//! summary's. All reads go to the external item store under a bounded
//! timeout; failures degrade to "no signal" so a grade submission never
//! blocks on coupling.

use std::future::Future;
use std::time::Duration;

use uuid::Uuid;

use super::config::SchedulerConfig;
use super::models::{CouplingSignal, ItemKind, ItemRef, WeightedGrade};
use crate::store::{ItemStore, StoreError};

/// Upper bound for a single store read during resolution.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Stateless lookup-and-aggregate over the item store. Read-only;
/// cancelling the enclosing request abandons in-flight reads without
/// side effects.
pub struct CouplingResolver<'a> {
    store: &'a dyn ItemStore,
    config: &'a SchedulerConfig,
    timeout: Duration,
}

impl<'a> CouplingResolver<'a> {
    pub fn new(store: &'a dyn ItemStore, config: &'a SchedulerConfig) -> Self {
        Self {
            store,
            config,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(
        store: &'a dyn ItemStore,
        config: &'a SchedulerConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            config,
            timeout,
        }
    }

    /// Resolve the coupling signal for the item about to be graded.
    ///
    /// Returns `None` when there is nothing to couple against (no related
    /// items, or none reviewed yet) and when the store could not be
    /// reached in time.
    pub async fn resolve(&self, item: ItemRef) -> Option<CouplingSignal> {
        match item.kind {
            ItemKind::Summary => self.child_signal(item.id).await,
            ItemKind::Flashcard => self.parent_signal(item.id).await,
        }
    }

    /// Parent summary's most recent grade, for a flashcard being graded.
    async fn parent_signal(&self, flashcard_id: Uuid) -> Option<CouplingSignal> {
        let summary_id = self
            .read("parent lookup", self.store.parent(flashcard_id))
            .await??;
        let latest = self
            .read(
                "summary grade lookup",
                self.store.latest_grade(ItemRef::summary(summary_id)),
            )
            .await??;

        Some(CouplingSignal::ParentSummary {
            grade: latest.grade,
        })
    }

    /// Weighted latest grades of the reviewed child flashcards, for a
    /// summary being graded.
    async fn child_signal(&self, summary_id: Uuid) -> Option<CouplingSignal> {
        let children = self
            .read("children lookup", self.store.children(summary_id))
            .await?;
        if children.is_empty() {
            return None;
        }

        let mut grades = Vec::with_capacity(children.len());
        let mut all_easiest = true;
        for flashcard_id in children {
            let latest = self
                .read(
                    "flashcard grade lookup",
                    self.store.latest_grade(ItemRef::flashcard(flashcard_id)),
                )
                .await?;
            // Never-reviewed children carry no signal
            let Some(latest) = latest else { continue };

            all_easiest &= latest.grade.value() == 1;
            grades.push(WeightedGrade {
                grade: latest.grade,
                weight: self.config.confidence_weight(latest.review_count),
            });
        }

        if grades.is_empty() {
            return None;
        }

        Some(CouplingSignal::ChildFlashcards {
            grades,
            all_easiest,
        })
    }

    /// One store read under the resolver timeout. Errors and timeouts are
    /// logged and absorbed; the caller sees them as a missing signal.
    async fn read<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                log::warn!("[coupling] {} failed: {}", what, e);
                None
            }
            Err(_) => {
                log::warn!("[coupling] {} timed out after {:?}", what, self.timeout);
                None
            }
        }
    }
}
