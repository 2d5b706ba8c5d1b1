use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{
    zeroed_level_distribution, Difficulty, DurationStats, GlobalStats, Item, ReviewEvent,
    StatsReport, User, UserStats,
};
use crate::scheduler;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(&path).map_err(|e| {
            log::error!("failed to open database at {}: {}", path.as_ref().display(), e);
            e
        })?;
        // ON DELETE CASCADE / SET NULL only hold with this pragma enabled
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prompt TEXT NOT NULL,
                reference_answer TEXT,
                category TEXT,
                difficulty TEXT NOT NULL DEFAULT 'medium' CHECK(difficulty IN ('easy', 'medium', 'hard')),
                level INTEGER NOT NULL DEFAULT 0,
                last_reviewed TEXT,
                next_due TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS review_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL,
                user_id INTEGER,
                user_answer TEXT,
                rating INTEGER NOT NULL,
                duration_seconds INTEGER,
                reviewed_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_next_due ON items(next_due);
            CREATE INDEX IF NOT EXISTS idx_items_category ON items(category);
            CREATE INDEX IF NOT EXISTS idx_items_difficulty ON items(difficulty);
            CREATE INDEX IF NOT EXISTS idx_events_item ON review_events(item_id);
            CREATE INDEX IF NOT EXISTS idx_events_user ON review_events(user_id);
            CREATE INDEX IF NOT EXISTS idx_events_reviewed_at ON review_events(reviewed_at);
            "#,
        )?;
        log::info!("database schema initialized");
        Ok(())
    }

    // Item operations
    pub fn add_item(
        &self,
        prompt: &str,
        reference_answer: Option<&str>,
        category: Option<&str>,
        difficulty: Difficulty,
    ) -> Result<i64> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::validation("prompt must not be empty"));
        }
        if self.item_exists(prompt)? {
            return Err(Error::Duplicate(prompt.to_string()));
        }

        let reference_answer = reference_answer.map(str::trim).filter(|s| !s.is_empty());
        let category = category.map(str::trim).filter(|s| !s.is_empty());

        self.conn.execute(
            r#"
            INSERT INTO items (prompt, reference_answer, category, difficulty, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                prompt,
                reference_answer,
                category,
                difficulty.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Duplicate predicate used by interactive add and bulk import:
    /// an exact prompt match, ignoring case and surrounding whitespace.
    pub fn item_exists(&self, prompt: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM items WHERE lower(trim(prompt)) = lower(trim(?1)))",
            params![prompt],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, prompt, reference_answer, category, difficulty,
                   level, last_reviewed, next_due, created_at
            FROM items
            WHERE id = ?1
            "#,
        )?;

        let item = stmt.query_row(params![id], item_from_row);
        match item {
            Ok(i) => Ok(Some(i)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_items(&self) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, prompt, reference_answer, category, difficulty,
                   level, last_reviewed, next_due, created_at
            FROM items
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], item_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // Selector: pick the next item to present.
    //
    // Candidates are items never scheduled (next_due NULL, below level 5)
    // or past due. NULLs sort first under ASC, so brand-new items are
    // offered before merely-overdue ones; ties fall to RANDOM(). Mastered
    // items carry a NULL next_due too and are filtered out by level.
    // Read-only: two concurrent callers may be served the same item.
    pub fn next_due_item(&self) -> Result<Option<Item>> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, prompt, reference_answer, category, difficulty,
                   level, last_reviewed, next_due, created_at
            FROM items
            WHERE (next_due IS NULL AND level < 5) OR next_due <= ?1
            ORDER BY next_due ASC, RANDOM()
            LIMIT 1
            "#,
        )?;

        let item = stmt.query_row(params![now], item_from_row);
        match item {
            Ok(i) => Ok(Some(i)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a review and reschedule the item, atomically.
    ///
    /// The event insert and item update share one transaction: if either
    /// fails nothing persists. Returns the new event's id.
    pub fn record_review(
        &self,
        item_id: i64,
        user_answer: Option<&str>,
        rating: i32,
        user_id: Option<i64>,
        duration_seconds: Option<i64>,
    ) -> Result<i64> {
        if !(1..=5).contains(&rating) {
            return Err(Error::validation(format!(
                "rating must be between 1 and 5, got {}",
                rating
            )));
        }
        if duration_seconds.is_some_and(|d| d < 0) {
            return Err(Error::validation("duration must not be negative"));
        }

        let now = Utc::now();
        let tx = self.conn.unchecked_transaction()?;

        let level: i32 = match tx.query_row(
            "SELECT level FROM items WHERE id = ?1",
            params![item_id],
            |row| row.get(0),
        ) {
            Ok(level) => level,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Err(Error::ItemNotFound(item_id)),
            Err(e) => return Err(e.into()),
        };

        tx.execute(
            r#"
            INSERT INTO review_events (item_id, user_id, user_answer, rating, duration_seconds, reviewed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![item_id, user_id, user_answer, rating, duration_seconds, now.to_rfc3339()],
        )?;
        let event_id = tx.last_insert_rowid();

        let new_level = scheduler::update_level(level, rating);
        let next_due = scheduler::next_due(new_level, now).map(|d| d.to_rfc3339());

        tx.execute(
            "UPDATE items SET level = ?1, last_reviewed = ?2, next_due = ?3 WHERE id = ?4",
            params![new_level, now.to_rfc3339(), next_due, item_id],
        )?;

        tx.commit()?;
        Ok(event_id)
    }

    pub fn get_review_event(&self, id: i64) -> Result<Option<ReviewEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, item_id, user_id, user_answer, rating, duration_seconds, reviewed_at
            FROM review_events
            WHERE id = ?1
            "#,
        )?;

        let event = stmt.query_row(params![id], |row| {
            Ok(ReviewEvent {
                id: row.get(0)?,
                item_id: row.get(1)?,
                user_id: row.get(2)?,
                user_answer: row.get(3)?,
                rating: row.get(4)?,
                duration_seconds: row.get(5)?,
                reviewed_at: row.get(6)?,
            })
        });
        match event {
            Ok(e) => Ok(Some(e)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // Stats aggregation. Always computed fresh; nothing here mutates.
    pub fn overall_stats(&self, user_id: Option<i64>) -> Result<StatsReport> {
        let level_distribution = self.level_distribution()?;
        let today_review_count = self.today_review_count(user_id)?;
        let category_stats = self.bucket_stats(
            "COALESCE(NULLIF(trim(i.category), ''), 'uncategorized')",
            user_id,
        )?;
        let difficulty_stats = self.bucket_stats("i.difficulty", user_id)?;

        match user_id {
            None => Ok(StatsReport::Global(GlobalStats {
                level_distribution,
                today_review_count,
                category_stats,
                difficulty_stats,
            })),
            Some(uid) => {
                let total_duration_seconds_today: i64 = self.conn.query_row(
                    r#"
                    SELECT COALESCE(SUM(duration_seconds), 0)
                    FROM review_events
                    WHERE user_id = ?1 AND date(reviewed_at) = date('now')
                    "#,
                    params![uid],
                    |row| row.get(0),
                )?;
                let avg_duration_seconds_overall: f64 = self.conn.query_row(
                    "SELECT COALESCE(AVG(duration_seconds), 0) FROM review_events WHERE user_id = ?1",
                    params![uid],
                    |row| row.get(0),
                )?;
                Ok(StatsReport::User(UserStats {
                    user_id: uid,
                    level_distribution,
                    today_review_count,
                    category_stats,
                    difficulty_stats,
                    total_duration_seconds_today,
                    avg_duration_seconds_overall,
                }))
            }
        }
    }

    // Mastery is a property of the item, so the distribution ignores scope.
    fn level_distribution(&self) -> Result<BTreeMap<i32, i64>> {
        let mut distribution = zeroed_level_distribution();
        let mut stmt = self
            .conn
            .prepare("SELECT level, COUNT(*) FROM items GROUP BY level")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i32>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (level, count) = row?;
            distribution.insert(level, count);
        }
        Ok(distribution)
    }

    fn today_review_count(&self, user_id: Option<i64>) -> Result<i64> {
        let count = match user_id {
            Some(uid) => self.conn.query_row(
                r#"
                SELECT COUNT(*) FROM review_events
                WHERE user_id = ?1 AND date(reviewed_at) = date('now')
                "#,
                params![uid],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM review_events WHERE date(reviewed_at) = date('now')",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(count)
    }

    // Per-bucket review counts and durations, joined to items. Duration
    // aggregates only cover events that recorded a duration.
    fn bucket_stats(
        &self,
        key_expr: &str,
        user_id: Option<i64>,
    ) -> Result<BTreeMap<String, DurationStats>> {
        let query = format!(
            r#"
            SELECT {key} AS bucket,
                   COUNT(*),
                   COALESCE(SUM(r.duration_seconds), 0),
                   COUNT(r.duration_seconds)
            FROM review_events r
            JOIN items i ON r.item_id = i.id
            {filter}
            GROUP BY bucket
            "#,
            key = key_expr,
            filter = if user_id.is_some() {
                "WHERE r.user_id = ?1"
            } else {
                ""
            },
        );

        let mut stmt = self.conn.prepare(&query)?;
        let map_row = |row: &Row| -> rusqlite::Result<(String, i64, i64, i64)> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        };
        let rows: Vec<(String, i64, i64, i64)> = match user_id {
            Some(uid) => stmt
                .query_map(params![uid], map_row)?
                .collect::<rusqlite::Result<_>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<rusqlite::Result<_>>()?,
        };

        let mut buckets = BTreeMap::new();
        for (bucket, count, total, timed) in rows {
            let avg = if timed > 0 {
                total as f64 / timed as f64
            } else {
                0.0
            };
            buckets.insert(
                bucket,
                DurationStats {
                    count,
                    total_duration_seconds: total,
                    avg_duration_seconds: avg,
                },
            );
        }
        Ok(buckets)
    }

    // User operations. The core only needs user_id as an opaque key on
    // review events; account management lives here so the CLI has a
    // counterpart to register/login.
    pub fn create_user(&self, username: &str, password: &str) -> Result<i64> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::validation("username must not be empty"));
        }
        if password.is_empty() {
            return Err(Error::validation("password must not be empty"));
        }
        if self.find_user(username)?.is_some() {
            return Err(Error::Duplicate(username.to_string()));
        }

        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        self.conn.execute(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
            params![username, password_hash, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn verify_user(&self, username: &str, password: &str) -> Result<Option<User>> {
        let user = match self.find_user(username)? {
            Some(user) => user,
            None => return Ok(None),
        };
        if bcrypt::verify(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    pub fn find_user(&self, username: &str) -> Result<Option<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
        )?;
        let user = stmt.query_row(params![username.trim()], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
                created_at: row.get(3)?,
            })
        });
        match user {
            Ok(u) => Ok(Some(u)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn item_from_row(row: &Row) -> rusqlite::Result<Item> {
    let difficulty_str: String = row.get(4)?;
    Ok(Item {
        id: row.get(0)?,
        prompt: row.get(1)?,
        reference_answer: row.get(2)?,
        category: row.get(3)?,
        difficulty: Difficulty::from_str_or_default(&difficulty_str),
        level: row.get(5)?,
        last_reviewed: row.get(6)?,
        next_due: row.get(7)?,
        created_at: row.get(8)?,
    })
}
