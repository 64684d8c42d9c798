//! Bundled SQLite implementation of the item store.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{ItemStore, LatestGrade, Result, SessionStore, StoreError};
use crate::review::models::{
    Grade, ItemKind, ItemRef, ReviewSession, SchedulingState, SessionUpdate,
};

/// Item store backed by a single SQLite database.
///
/// Queries are single-row or small-list and short-lived; the connection
/// sits behind a mutex, which also gives the per-item update atomicity
/// the grading path relies on.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and create if needed) the database at the given path.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }

        let conn = Connection::open(&db_path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fully in-memory store, handy for tests and ephemeral hosts.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- One review session per summary or flashcard
            CREATE TABLE IF NOT EXISTS review_sessions (
                item_id TEXT NOT NULL,
                item_kind TEXT NOT NULL,
                ease_factor REAL NOT NULL,
                interval_days INTEGER NOT NULL,
                review_count INTEGER NOT NULL DEFAULT 0,
                difficulty_rating INTEGER,
                next_review TEXT NOT NULL,
                last_reviewed TEXT,
                is_completed INTEGER NOT NULL DEFAULT 0,
                last_weight_multiplier REAL,
                review_frequency_days INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                deleted_at TEXT,
                PRIMARY KEY (item_id, item_kind)
            );

            -- Which summary each flashcard was derived from
            CREATE TABLE IF NOT EXISTS card_links (
                flashcard_id TEXT PRIMARY KEY,
                summary_id TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_next_review
                ON review_sessions(next_review);
            CREATE INDEX IF NOT EXISTS idx_links_summary
                ON card_links(summary_id);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
    }
}

// ==================== Row Mapping ====================

const SESSION_COLUMNS: &str = "item_id, item_kind, ease_factor, interval_days, review_count, \
     difficulty_rating, next_review, last_reviewed, is_completed, \
     last_weight_multiplier, review_frequency_days, created_at";

struct SessionRow {
    item_id: String,
    item_kind: String,
    ease_factor: f64,
    interval_days: i32,
    review_count: i32,
    difficulty_rating: Option<i32>,
    next_review: String,
    last_reviewed: Option<String>,
    is_completed: bool,
    last_weight_multiplier: Option<f64>,
    review_frequency_days: i32,
    created_at: String,
}

fn read_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        item_id: row.get(0)?,
        item_kind: row.get(1)?,
        ease_factor: row.get(2)?,
        interval_days: row.get(3)?,
        review_count: row.get(4)?,
        difficulty_rating: row.get(5)?,
        next_review: row.get(6)?,
        last_reviewed: row.get(7)?,
        is_completed: row.get(8)?,
        last_weight_multiplier: row.get(9)?,
        review_frequency_days: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("bad item id '{}': {}", s, e)))
}

impl TryFrom<SessionRow> for ReviewSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<ReviewSession> {
        let kind = ItemKind::from_str(&row.item_kind)
            .ok_or_else(|| StoreError::Corrupt(format!("bad item kind '{}'", row.item_kind)))?;
        let difficulty_rating = row
            .difficulty_rating
            .map(|v| Grade::new(v).map_err(|e| StoreError::Corrupt(e.to_string())))
            .transpose()?;

        Ok(ReviewSession {
            item: ItemRef {
                id: parse_id(&row.item_id)?,
                kind,
            },
            ease_factor: row.ease_factor as f32,
            interval_days: row.interval_days,
            review_count: row.review_count,
            difficulty_rating,
            next_review: parse_timestamp(&row.next_review)?,
            last_reviewed: row.last_reviewed.as_deref().map(parse_timestamp).transpose()?,
            is_completed: row.is_completed,
            last_weight_multiplier: row.last_weight_multiplier.map(|v| v as f32),
            review_frequency_days: row.review_frequency_days,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

// ==================== Store Contract ====================

#[async_trait]
impl ItemStore for SqliteStore {
    async fn current_state(&self, item: ItemRef) -> Result<SchedulingState> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT ease_factor, interval_days, review_count FROM review_sessions
                 WHERE item_id = ?1 AND item_kind = ?2 AND deleted_at IS NULL",
                params![item.id.to_string(), item.kind.as_str()],
                |row| {
                    Ok(SchedulingState {
                        ease_factor: row.get::<_, f64>(0)? as f32,
                        interval_days: row.get(1)?,
                        review_count: row.get(2)?,
                    })
                },
            )
            .optional()?;

        state.ok_or(StoreError::NotFound(item))
    }

    async fn children(&self, summary_id: Uuid) -> Result<Vec<Uuid>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT l.flashcard_id FROM card_links l
             JOIN review_sessions s
               ON s.item_id = l.flashcard_id AND s.item_kind = 'flashcard'
             WHERE l.summary_id = ?1 AND s.deleted_at IS NULL",
        )?;
        let ids = stmt
            .query_map(params![summary_id.to_string()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        ids.iter().map(|s| parse_id(s)).collect()
    }

    async fn parent(&self, flashcard_id: Uuid) -> Result<Option<Uuid>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT summary_id FROM card_links WHERE flashcard_id = ?1",
                params![flashcard_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        id.as_deref().map(parse_id).transpose()
    }

    async fn latest_grade(&self, item: ItemRef) -> Result<Option<LatestGrade>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT difficulty_rating, review_count FROM review_sessions
                 WHERE item_id = ?1 AND item_kind = ?2 AND deleted_at IS NULL
                   AND last_reviewed IS NOT NULL AND difficulty_rating IS NOT NULL",
                params![item.id.to_string(), item.kind.as_str()],
                |row| Ok((row.get::<_, i32>(0)?, row.get::<_, i32>(1)?)),
            )
            .optional()?;

        row.map(|(rating, review_count)| {
            let grade = Grade::new(rating).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            Ok(LatestGrade {
                grade,
                review_count,
            })
        })
        .transpose()
    }

    async fn persist_update(&self, item: ItemRef, update: &SessionUpdate) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE review_sessions SET
                 ease_factor = ?1,
                 interval_days = ?2,
                 review_count = ?3,
                 difficulty_rating = ?4,
                 last_reviewed = ?5,
                 next_review = ?6,
                 is_completed = ?7,
                 last_weight_multiplier = ?8
             WHERE item_id = ?9 AND item_kind = ?10 AND deleted_at IS NULL",
            params![
                update.ease_factor as f64,
                update.interval_days,
                update.review_count,
                update.difficulty_rating.value(),
                update.last_reviewed.to_rfc3339(),
                update.next_review.to_rfc3339(),
                update.is_completed,
                update.last_weight_multiplier.map(|v| v as f64),
                item.id.to_string(),
                item.kind.as_str(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(item));
        }
        Ok(())
    }
}

// ==================== Session Lifecycle ====================

#[async_trait]
impl SessionStore for SqliteStore {
    async fn insert_session(&self, session: &ReviewSession) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO review_sessions
                 (item_id, item_kind, ease_factor, interval_days, review_count,
                  difficulty_rating, next_review, last_reviewed, is_completed,
                  last_weight_multiplier, review_frequency_days, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                session.item.id.to_string(),
                session.item.kind.as_str(),
                session.ease_factor as f64,
                session.interval_days,
                session.review_count,
                session.difficulty_rating.map(|g| g.value()),
                session.next_review.to_rfc3339(),
                session.last_reviewed.map(|t| t.to_rfc3339()),
                session.is_completed,
                session.last_weight_multiplier.map(|v| v as f64),
                session.review_frequency_days,
                session.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn get_session(&self, item: ItemRef) -> Result<ReviewSession> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM review_sessions WHERE item_id = ?1 AND item_kind = ?2",
                    SESSION_COLUMNS
                ),
                params![item.id.to_string(), item.kind.as_str()],
                read_session_row,
            )
            .optional()?;

        row.ok_or(StoreError::NotFound(item))?.try_into()
    }

    async fn due_sessions(
        &self,
        kind: ItemKind,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<ReviewSession>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM review_sessions
             WHERE item_kind = ?1 AND is_completed = 0 AND deleted_at IS NULL
               AND next_review <= ?2
             ORDER BY next_review ASC
             LIMIT ?3",
            SESSION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![
                    kind.as_str(),
                    now.to_rfc3339(),
                    limit.map(|n| n as i64).unwrap_or(-1),
                ],
                read_session_row,
            )?
            .collect::<rusqlite::Result<Vec<SessionRow>>>()?;

        rows.into_iter().map(ReviewSession::try_from).collect()
    }

    async fn reset_session(
        &self,
        item: ItemRef,
        ease_factor: f32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE review_sessions SET
                 ease_factor = ?1,
                 interval_days = 1,
                 review_count = 0,
                 difficulty_rating = 3,
                 last_reviewed = ?2,
                 next_review = ?3,
                 is_completed = 0,
                 last_weight_multiplier = NULL
             WHERE item_id = ?4 AND item_kind = ?5 AND deleted_at IS NULL",
            params![
                ease_factor as f64,
                now.to_rfc3339(),
                (now + Duration::days(1)).to_rfc3339(),
                item.id.to_string(),
                item.kind.as_str(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(item));
        }
        Ok(())
    }

    async fn set_review_frequency(&self, item: ItemRef, days: i32) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE review_sessions SET review_frequency_days = ?1
             WHERE item_id = ?2 AND item_kind = ?3 AND deleted_at IS NULL",
            params![days, item.id.to_string(), item.kind.as_str()],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(item));
        }
        Ok(())
    }

    async fn link_flashcard(&self, flashcard_id: Uuid, summary_id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO card_links (flashcard_id, summary_id) VALUES (?1, ?2)",
            params![flashcard_id.to_string(), summary_id.to_string()],
        )?;
        Ok(())
    }

    async fn tombstone(&self, item: ItemRef, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE review_sessions SET deleted_at = ?1
             WHERE item_id = ?2 AND item_kind = ?3 AND deleted_at IS NULL",
            params![now.to_rfc3339(), item.id.to_string(), item.kind.as_str()],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(item));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::config::SchedulerConfig;

    fn new_session(item: ItemRef) -> ReviewSession {
        ReviewSession::new(item, &SchedulerConfig::default(), Utc::now())
    }

    fn update(grade: i32, now: DateTime<Utc>) -> SessionUpdate {
        SessionUpdate {
            ease_factor: 2.6,
            interval_days: 6,
            review_count: 1,
            difficulty_rating: Grade::new(grade).unwrap(),
            last_reviewed: now,
            next_review: now + Duration::days(6),
            is_completed: false,
            last_weight_multiplier: Some(0.25),
        }
    }

    #[tokio::test]
    async fn fresh_session_is_pending() {
        let store = SqliteStore::in_memory().unwrap();
        let item = ItemRef::summary(Uuid::new_v4());
        store.insert_session(&new_session(item)).await.unwrap();

        let state = store.current_state(item).await.unwrap();
        assert_eq!(state.ease_factor, 2.5);
        assert_eq!(state.review_count, 0);

        let due = store
            .due_sessions(ItemKind::Summary, Utc::now(), None)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].item, item);
        assert!(due[0].difficulty_rating.is_none());
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let item = ItemRef::flashcard(Uuid::new_v4());

        let err = store.current_state(item).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(i) if i == item));
    }

    #[tokio::test]
    async fn update_round_trips() {
        let store = SqliteStore::in_memory().unwrap();
        let item = ItemRef::flashcard(Uuid::new_v4());
        store.insert_session(&new_session(item)).await.unwrap();

        let now = Utc::now();
        store.persist_update(item, &update(2, now)).await.unwrap();

        let state = store.current_state(item).await.unwrap();
        assert_eq!(state.interval_days, 6);
        assert_eq!(state.review_count, 1);
        assert!((state.ease_factor - 2.6).abs() < 1e-6);

        let latest = store.latest_grade(item).await.unwrap().unwrap();
        assert_eq!(latest.grade.value(), 2);
        assert_eq!(latest.review_count, 1);

        let session = store.get_session(item).await.unwrap();
        assert_eq!(session.last_weight_multiplier, Some(0.25));
        assert!(session.last_reviewed.is_some());
    }

    #[tokio::test]
    async fn unreviewed_item_has_no_latest_grade() {
        let store = SqliteStore::in_memory().unwrap();
        let item = ItemRef::summary(Uuid::new_v4());
        store.insert_session(&new_session(item)).await.unwrap();

        assert!(store.latest_grade(item).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn due_listing_orders_and_filters() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();

        let older = ItemRef::summary(Uuid::new_v4());
        let newer = ItemRef::summary(Uuid::new_v4());
        let completed = ItemRef::summary(Uuid::new_v4());
        let future = ItemRef::summary(Uuid::new_v4());

        let mut session = new_session(older);
        session.next_review = now - Duration::days(3);
        store.insert_session(&session).await.unwrap();

        let mut session = new_session(newer);
        session.next_review = now - Duration::days(1);
        store.insert_session(&session).await.unwrap();

        let mut session = new_session(completed);
        session.next_review = now - Duration::days(5);
        session.is_completed = true;
        store.insert_session(&session).await.unwrap();

        let mut session = new_session(future);
        session.next_review = now + Duration::days(5);
        store.insert_session(&session).await.unwrap();

        let due = store
            .due_sessions(ItemKind::Summary, now, None)
            .await
            .unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].item, older);
        assert_eq!(due[1].item, newer);

        let limited = store
            .due_sessions(ItemKind::Summary, now, Some(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].item, older);
    }

    #[tokio::test]
    async fn children_excludes_tombstoned_flashcards() {
        let store = SqliteStore::in_memory().unwrap();
        let summary_id = Uuid::new_v4();
        let kept = Uuid::new_v4();
        let dropped = Uuid::new_v4();

        for id in [kept, dropped] {
            store
                .insert_session(&new_session(ItemRef::flashcard(id)))
                .await
                .unwrap();
            store.link_flashcard(id, summary_id).await.unwrap();
        }
        store
            .tombstone(ItemRef::flashcard(dropped), Utc::now())
            .await
            .unwrap();

        let children = store.children(summary_id).await.unwrap();
        assert_eq!(children, vec![kept]);
    }

    #[tokio::test]
    async fn parent_lookup() {
        let store = SqliteStore::in_memory().unwrap();
        let flashcard_id = Uuid::new_v4();
        let summary_id = Uuid::new_v4();
        store.link_flashcard(flashcard_id, summary_id).await.unwrap();

        assert_eq!(store.parent(flashcard_id).await.unwrap(), Some(summary_id));
        assert_eq!(store.parent(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn tombstoned_item_drops_out_of_grading() {
        let store = SqliteStore::in_memory().unwrap();
        let item = ItemRef::summary(Uuid::new_v4());
        store.insert_session(&new_session(item)).await.unwrap();
        store.tombstone(item, Utc::now()).await.unwrap();

        assert!(matches!(
            store.current_state(item).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.persist_update(item, &update(3, Utc::now())).await,
            Err(StoreError::NotFound(_))
        ));
        // the row itself survives the tombstone
        assert!(store.get_session(item).await.is_ok());
    }

    #[tokio::test]
    async fn reset_restores_fresh_schedule() {
        let store = SqliteStore::in_memory().unwrap();
        let item = ItemRef::summary(Uuid::new_v4());
        store.insert_session(&new_session(item)).await.unwrap();

        let now = Utc::now();
        store.persist_update(item, &update(1, now)).await.unwrap();
        store.reset_session(item, 2.5, now).await.unwrap();

        let state = store.current_state(item).await.unwrap();
        assert_eq!(state.interval_days, 1);
        assert_eq!(state.review_count, 0);
        assert_eq!(state.ease_factor, 2.5);

        let session = store.get_session(item).await.unwrap();
        assert!(!session.is_completed);
        assert!(session.last_weight_multiplier.is_none());
        assert_eq!(session.difficulty_rating.map(|g| g.value()), Some(3));
        assert!(session.next_review > now);
    }

    #[tokio::test]
    async fn review_frequency_updates() {
        let store = SqliteStore::in_memory().unwrap();
        let item = ItemRef::summary(Uuid::new_v4());
        store.insert_session(&new_session(item)).await.unwrap();

        store.set_review_frequency(item, 7).await.unwrap();
        let session = store.get_session(item).await.unwrap();
        assert_eq!(session.review_frequency_days, 7);
    }

    #[tokio::test]
    async fn persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("reviews").join("sessions.db");
        let item = ItemRef::summary(Uuid::new_v4());

        {
            let store = SqliteStore::new(db_path.clone()).unwrap();
            store.insert_session(&new_session(item)).await.unwrap();
        }

        let store = SqliteStore::new(db_path).unwrap();
        assert!(store.current_state(item).await.is_ok());
    }
}
