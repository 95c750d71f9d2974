//! Reference `CardStore` over `rusqlite`, wrapped the way the teacher wraps
//! its own connection pool: a `Mutex<Connection>` behind a `try_lock` helper
//! that turns mutex poisoning into a store error instead of panicking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{Card, CardSchedulingData, CardState, CardStatus, Rating, ReviewLog};
use crate::error::{CoreError, CoreResult};

use super::{CardStore, DeckStats};

pub type DbPool = Arc<Mutex<Connection>>;

/// Extension trait for logging errors before discarding them, mirroring the
/// teacher's `LogOnError` helper for best-effort operations.
pub trait LogOnError<T> {
    fn log_warn(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> LogOnError<T> for std::result::Result<T, E> {
    fn log_warn(self, context: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("{}: {}", context, e);
                None
            }
        }
    }
}

/// Error returned when the connection mutex cannot be acquired.
#[derive(Debug)]
pub struct DbLockError;

impl std::fmt::Display for DbLockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "database unavailable")
    }
}

impl std::error::Error for DbLockError {}

pub fn try_lock(pool: &DbPool) -> Result<MutexGuard<'_, Connection>, DbLockError> {
    pool.lock().map_err(|_: PoisonError<_>| {
        tracing::error!("database mutex poisoned - a thread panicked while holding the lock");
        DbLockError
    })
}

fn unavailable<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::StoreUnavailable(e.to_string())
}

const SCHEMA_VERSION: i32 = 2;

fn get_schema_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM db_version", [], |row| row.get(0))
}

fn record_version(conn: &Connection, version: i32, description: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO db_version (version, applied_at, description) VALUES (?1, ?2, ?3)",
        params![version, Utc::now().to_rfc3339(), description],
    )?;
    tracing::info!("recorded schema version {} - {}", version, description);
    Ok(())
}

fn migrate_v0_to_v1(conn: &Connection) -> rusqlite::Result<()> {
    tracing::info!("running migration v0->v1: create base tables");
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            deck_id INTEGER NOT NULL,
            note_id INTEGER,
            status TEXT NOT NULL,
            due TEXT NOT NULL,
            stability REAL NOT NULL DEFAULT 0,
            difficulty REAL NOT NULL DEFAULT 0,
            elapsed_days INTEGER NOT NULL DEFAULT 0,
            scheduled_days INTEGER NOT NULL DEFAULT 0,
            reps INTEGER NOT NULL DEFAULT 0,
            lapses INTEGER NOT NULL DEFAULT 0,
            state TEXT NOT NULL,
            last_review TEXT,
            step_index INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS card_tags (
            card_id INTEGER NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (card_id, tag)
        );

        CREATE TABLE IF NOT EXISTS review_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id INTEGER NOT NULL,
            rating INTEGER NOT NULL,
            scheduling_before TEXT NOT NULL,
            scheduling_after TEXT NOT NULL,
            due_before TEXT NOT NULL,
            due_after TEXT NOT NULL,
            reviewed_at TEXT NOT NULL,
            time_spent_ms INTEGER NOT NULL
        );
        "#,
    )?;
    record_version(conn, 1, "create base tables")
}

fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    tracing::info!("running migration v1->v2: add lookup indexes");
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_cards_due ON cards(due);
        CREATE INDEX IF NOT EXISTS idx_cards_deck ON cards(deck_id);
        CREATE INDEX IF NOT EXISTS idx_cards_note ON cards(note_id);
        CREATE INDEX IF NOT EXISTS idx_review_logs_card_id ON review_logs(card_id);
        CREATE INDEX IF NOT EXISTS idx_review_logs_reviewed_at ON review_logs(reviewed_at);
        "#,
    )?;
    record_version(conn, 2, "add lookup indexes")
}

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS db_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            description TEXT
        );
        "#,
    )?;
    let current = get_schema_version(conn)?;
    tracing::trace!("srs_core schema version: {}", current);
    if current < 1 {
        migrate_v0_to_v1(conn)?;
    }
    if current < 2 {
        migrate_v1_to_v2(conn)?;
    }
    Ok(())
}

pub fn init_db(path: &Path) -> rusqlite::Result<DbPool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(path)?;
    run_migrations(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_in_memory() -> rusqlite::Result<DbPool> {
    let conn = Connection::open_in_memory()?;
    run_migrations(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        Ok(Self { pool: init_db(path)? })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Ok(Self { pool: init_in_memory()? })
    }

    fn conn(&self) -> CoreResult<MutexGuard<'_, Connection>> {
        try_lock(&self.pool).map_err(unavailable)
    }
}

fn write_card(conn: &Connection, card: &Card) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO cards (id, deck_id, note_id, status, due, stability, difficulty,
                            elapsed_days, scheduled_days, reps, lapses, state, last_review,
                            step_index, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        ON CONFLICT(id) DO UPDATE SET
            deck_id = excluded.deck_id,
            note_id = excluded.note_id,
            status = excluded.status,
            due = excluded.due,
            stability = excluded.stability,
            difficulty = excluded.difficulty,
            elapsed_days = excluded.elapsed_days,
            scheduled_days = excluded.scheduled_days,
            reps = excluded.reps,
            lapses = excluded.lapses,
            state = excluded.state,
            last_review = excluded.last_review,
            step_index = excluded.step_index,
            updated_at = excluded.updated_at
        "#,
        params![
            card.id,
            card.deck_id,
            card.note_id,
            card.status.as_str(),
            card.due.to_rfc3339(),
            card.scheduling.stability,
            card.scheduling.difficulty,
            card.scheduling.elapsed_days,
            card.scheduling.scheduled_days,
            card.scheduling.reps,
            card.scheduling.lapses,
            card.scheduling.state.as_str(),
            card.scheduling.last_review.map(|t| t.to_rfc3339()),
            card.scheduling.step_index as i64,
            card.created_at.to_rfc3339(),
            card.updated_at.to_rfc3339(),
        ],
    )?;
    conn.execute("DELETE FROM card_tags WHERE card_id = ?1", params![card.id])?;
    for tag in &card.tags {
        conn.execute("INSERT INTO card_tags (card_id, tag) VALUES (?1, ?2)", params![card.id, tag])?;
    }
    Ok(())
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_card(conn: &Connection, row: &rusqlite::Row) -> rusqlite::Result<Card> {
    let id: i64 = row.get(0)?;
    let state_str: String = row.get(11)?;
    let status_str: String = row.get(3)?;
    let last_review_str: Option<String> = row.get(12)?;
    let due_str: String = row.get(4)?;
    let created_str: String = row.get(14)?;
    let updated_str: String = row.get(15)?;

    let mut tags_stmt = conn.prepare("SELECT tag FROM card_tags WHERE card_id = ?1")?;
    let tags = tags_stmt
        .query_map(params![id], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Card {
        id,
        deck_id: row.get(1)?,
        note_id: row.get(2)?,
        tags,
        status: CardStatus::from_str(&status_str).unwrap_or(CardStatus::Active),
        due: parse_timestamp(&due_str),
        scheduling: CardSchedulingData {
            stability: row.get(5)?,
            difficulty: row.get(6)?,
            elapsed_days: row.get(7)?,
            scheduled_days: row.get(8)?,
            reps: row.get(9)?,
            lapses: row.get(10)?,
            state: CardState::from_str(&state_str).unwrap_or(CardState::New),
            last_review: last_review_str.map(|s| parse_timestamp(&s)),
            step_index: row.get::<_, i64>(13)? as usize,
        },
        created_at: parse_timestamp(&created_str),
        updated_at: parse_timestamp(&updated_str),
    })
}

const CARD_COLUMNS: &str = "id, deck_id, note_id, status, due, stability, difficulty, elapsed_days, \
     scheduled_days, reps, lapses, state, last_review, step_index, created_at, updated_at";

fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<ReviewLog> {
    let rating: i64 = row.get(2)?;
    let scheduling_before: String = row.get(3)?;
    let scheduling_after: String = row.get(4)?;
    let due_before: String = row.get(5)?;
    let due_after: String = row.get(6)?;
    let reviewed_at: String = row.get(7)?;
    Ok(ReviewLog {
        id: row.get(0)?,
        card_id: row.get(1)?,
        rating: Rating::from_i64(rating).unwrap_or(Rating::Good),
        scheduling_before: serde_json::from_str(&scheduling_before).unwrap_or_default(),
        scheduling_after: serde_json::from_str(&scheduling_after).unwrap_or_default(),
        due_before: parse_timestamp(&due_before),
        due_after: parse_timestamp(&due_after),
        reviewed_at: parse_timestamp(&reviewed_at),
        time_spent_ms: row.get(8)?,
    })
}

fn insert_log(conn: &Connection, log: &ReviewLog) -> rusqlite::Result<i64> {
    conn.execute(
        r#"
        INSERT INTO review_logs (card_id, rating, scheduling_before, scheduling_after,
                                  due_before, due_after, reviewed_at, time_spent_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            log.card_id,
            log.rating.as_i64(),
            serde_json::to_string(&log.scheduling_before).unwrap_or_default(),
            serde_json::to_string(&log.scheduling_after).unwrap_or_default(),
            log.due_before.to_rfc3339(),
            log.due_after.to_rfc3339(),
            log.reviewed_at.to_rfc3339(),
            log.time_spent_ms,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl CardStore for SqliteStore {
    fn get_card(&self, id: i64) -> CoreResult<Option<Card>> {
        let conn = self.conn()?;
        let query = format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1");
        conn.query_row(&query, params![id], |row| row_to_card(&conn, row))
            .optional()
            .map_err(unavailable)
    }

    fn update_card(&self, card: &Card) -> CoreResult<()> {
        write_card(&self.conn()?, card).map_err(unavailable)
    }

    fn get_next_cards(&self, deck_id: Option<i64>, limit: usize, now: DateTime<Utc>) -> CoreResult<Vec<Card>> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE status = 'active' AND due <= ?1 \
             AND (?2 IS NULL OR deck_id = ?2) ORDER BY due ASC LIMIT ?3"
        );
        let mut stmt = conn.prepare(&query).map_err(unavailable)?;
        let cards = stmt
            .query_map(params![now.to_rfc3339(), deck_id, limit as i64], |row| row_to_card(&conn, row))
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(cards)
    }

    fn add_review_log(&self, log: &ReviewLog) -> CoreResult<i64> {
        insert_log(&self.conn()?, log).map_err(unavailable)
    }

    fn get_last_review_log(&self, card_id: i64) -> CoreResult<Option<ReviewLog>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, card_id, rating, scheduling_before, scheduling_after, due_before, due_after, \
             reviewed_at, time_spent_ms FROM review_logs WHERE card_id = ?1 ORDER BY reviewed_at DESC LIMIT 1",
            params![card_id],
            row_to_log,
        )
        .optional()
        .map_err(unavailable)
    }

    fn delete_review_log(&self, log_id: i64) -> CoreResult<()> {
        self.conn()?
            .execute("DELETE FROM review_logs WHERE id = ?1", params![log_id])
            .map_err(unavailable)?;
        Ok(())
    }

    fn get_sibling_cards(&self, card_id: i64) -> CoreResult<Vec<Card>> {
        let conn = self.conn()?;
        let Some(note_id): Option<i64> = conn
            .query_row("SELECT note_id FROM cards WHERE id = ?1", params![card_id], |r| r.get(0))
            .optional()
            .map_err(unavailable)?
            .flatten()
        else {
            return Ok(Vec::new());
        };
        let query = format!("SELECT {CARD_COLUMNS} FROM cards WHERE note_id = ?1 AND id != ?2");
        let mut stmt = conn.prepare(&query).map_err(unavailable)?;
        let cards = stmt
            .query_map(params![note_id, card_id], |row| row_to_card(&conn, row))
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(cards)
    }

    fn get_buried_cards(&self) -> CoreResult<Vec<Card>> {
        let conn = self.conn()?;
        let query = format!("SELECT {CARD_COLUMNS} FROM cards WHERE status = 'buried'");
        let mut stmt = conn.prepare(&query).map_err(unavailable)?;
        let cards = stmt
            .query_map([], |row| row_to_card(&conn, row))
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(cards)
    }

    fn get_deck_stats(&self, deck_id: Option<i64>, now: DateTime<Utc>) -> CoreResult<DeckStats> {
        let conn = self.conn()?;
        let mut stats = DeckStats::default();
        let query = "SELECT status, state, due FROM cards WHERE ?1 IS NULL OR deck_id = ?1";
        let mut stmt = conn.prepare(query).map_err(unavailable)?;
        let rows = stmt
            .query_map(params![deck_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })
            .map_err(unavailable)?;
        for row in rows {
            let (status, state, due) = row.map_err(unavailable)?;
            stats.total_count += 1;
            match status.as_str() {
                "buried" => stats.buried_count += 1,
                "suspended" => stats.suspended_count += 1,
                _ => {}
            }
            if status == "active" && parse_timestamp(&due) <= now {
                match state.as_str() {
                    "new" => stats.new_count += 1,
                    "learning" | "relearning" => stats.learning_count += 1,
                    "review" => stats.review_count += 1,
                    _ => {}
                }
            }
        }
        Ok(stats)
    }

    fn get_review_logs(&self, deck_id: Option<i64>, since: DateTime<Utc>, until: DateTime<Utc>) -> CoreResult<Vec<ReviewLog>> {
        let conn = self.conn()?;
        let query = "SELECT l.id, l.card_id, l.rating, l.scheduling_before, l.scheduling_after, \
                      l.due_before, l.due_after, l.reviewed_at, l.time_spent_ms \
                      FROM review_logs l JOIN cards c ON c.id = l.card_id \
                      WHERE l.reviewed_at >= ?1 AND l.reviewed_at <= ?2 AND (?3 IS NULL OR c.deck_id = ?3) \
                      ORDER BY l.reviewed_at ASC";
        let mut stmt = conn.prepare(query).map_err(unavailable)?;
        let logs = stmt
            .query_map(params![since.to_rfc3339(), until.to_rfc3339(), deck_id], row_to_log)
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(logs)
    }

    fn apply_review(&self, card: &Card, log: &ReviewLog) -> CoreResult<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(unavailable)?;
        write_card(&tx, card).map_err(unavailable)?;
        let id = insert_log(&tx, log).map_err(unavailable)?;
        tx.commit().map_err(unavailable)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-14T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    struct TestEnv {
        _dir: TempDir,
        store: SqliteStore,
    }

    fn test_env() -> TestEnv {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("srs.db");
        let store = SqliteStore::open(&path).unwrap();
        TestEnv { _dir: dir, store }
    }

    #[test]
    fn migrations_are_idempotent() {
        let env = test_env();
        let conn = env.store.conn().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn round_trips_a_card_with_tags() {
        let env = test_env();
        let mut card = Card::new(1, 1, now(), now());
        card.tags = vec!["verbs".into(), "tier1".into()];
        env.store.update_card(&card).unwrap();
        let loaded = env.store.get_card(1).unwrap().unwrap();
        assert_eq!(loaded.tags.len(), 2);
    }

    #[test]
    fn apply_review_is_atomic() {
        let env = test_env();
        let mut card = Card::new(1, 1, now(), now());
        env.store.update_card(&card).unwrap();
        card.scheduling.reps = 1;
        let log = ReviewLog {
            id: 0,
            card_id: 1,
            rating: Rating::Good,
            scheduling_before: CardSchedulingData::new(),
            scheduling_after: card.scheduling,
            due_before: now(),
            due_after: now(),
            reviewed_at: now(),
            time_spent_ms: 2000,
        };
        let log_id = env.store.apply_review(&card, &log).unwrap();
        assert!(log_id > 0);
        assert_eq!(env.store.get_card(1).unwrap().unwrap().scheduling.reps, 1);
        assert!(env.store.get_last_review_log(1).unwrap().is_some());
    }

    #[test]
    fn siblings_are_found_by_note_id() {
        let env = test_env();
        let mut a = Card::new(1, 1, now(), now());
        a.note_id = Some(9);
        let mut b = Card::new(2, 1, now(), now());
        b.note_id = Some(9);
        env.store.update_card(&a).unwrap();
        env.store.update_card(&b).unwrap();
        let siblings = env.store.get_sibling_cards(1).unwrap();
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].id, 2);
    }
}
