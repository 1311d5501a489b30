//! SQLite storage layer for the problem catalog
//!
//! This module handles persistent storage of:
//! - Chapters and the groups they own
//! - Problems, their tags and metadata documents
//! - Problem aliases and alias resolution
//!
//! Every write goes through a method here, which sets `updated_at` (and
//! `created_at` on insert) to the current UTC time. Uniqueness, foreign keys,
//! length bounds and cascades are enforced by SQLite itself.

mod aliases;
mod problems;
mod schema;

pub use schema::schema;

use crate::config::{AliasConflictPolicy, CascadeConfig, CascadePolicy, CatalogConfig};
use crate::error::{CatalogError, Result};
use crate::model::{Chapter, ChapterUpdate, Group, GroupUpdate, NewChapter, NewGroup};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

const CHAPTER_COLUMNS: &str = "id, title, order_index, created_at, updated_at";
const GROUP_COLUMNS: &str = "id, chapter_id, title, order_index, created_at, updated_at";

const SAVEPOINT: &str = "catalog_write";

/// Database connection wrapper
pub struct Database {
    conn: Connection,
    cascade: CascadeConfig,
    alias_conflict: AliasConflictPolicy,
}

impl Database {
    /// Open or create a database at the given path with default settings
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = CatalogConfig {
            database_path: path.as_ref().to_path_buf(),
            ..CatalogConfig::default()
        };
        Self::open_with_config(&config)
    }

    /// Open or create the database described by a configuration
    pub fn open_with_config(config: &CatalogConfig) -> Result<Self> {
        let conn = Connection::open(&config.database_path)?;
        info!(path = ?config.database_path, "Opened catalog database");
        Self::from_connection(conn, config)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(&CatalogConfig::default())
    }

    /// Open an in-memory database with explicit settings
    pub fn open_in_memory_with(config: &CatalogConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, config)
    }

    fn from_connection(conn: Connection, config: &CatalogConfig) -> Result<Self> {
        let db = Self {
            conn,
            cascade: config.cascade,
            alias_conflict: config.alias_conflict,
        };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema and pin the cascade settings
    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(&schema(&self.cascade))?;

        self.pin_setting("cascade.chapter_groups", self.cascade.chapter_groups)?;
        self.pin_setting("cascade.group_problems", self.cascade.group_problems)?;

        Ok(())
    }

    /// Record a cascade policy on first open and refuse a different one afterwards
    fn pin_setting(&self, key: &str, policy: CascadePolicy) -> Result<()> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM catalog_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        let Some(value) = stored else {
            self.conn.execute(
                "INSERT INTO catalog_settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, policy.as_str(), now()],
            )?;
            return Ok(());
        };

        match CascadePolicy::parse(&value) {
            Some(pinned) if pinned == policy => Ok(()),
            Some(pinned) => Err(CatalogError::Config(format!(
                "{key} is {pinned} in this database but {policy} was requested"
            ))),
            None => Err(CatalogError::Corrupt(format!(
                "unknown cascade policy {value:?} stored for {key}"
            ))),
        }
    }

    /// Cascade policy this database was created with
    pub fn cascade(&self) -> CascadeConfig {
        self.cascade
    }

    pub fn alias_conflict(&self) -> AliasConflictPolicy {
        self.alias_conflict
    }

    /// Run `f` inside a savepoint: all of its writes commit together or not at all.
    /// Savepoints nest, so atomic operations can call each other.
    pub fn atomically<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))?;

        match f(self) {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {SAVEPOINT}"))?;
                Ok(value)
            }
            Err(err) => {
                let rollback = format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}");
                if let Err(e) = self.conn.execute_batch(&rollback) {
                    warn!("Failed to roll back catalog write: {}", e);
                }
                Err(err)
            }
        }
    }

    // ==================== Chapters ====================

    /// Insert a chapter
    pub fn create_chapter(&self, chapter: &NewChapter) -> Result<Chapter> {
        let now = now();
        self.conn.execute(
            "INSERT INTO chapters (title, order_index, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![chapter.title, chapter.order_index, now],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, title = %chapter.title, "Created chapter");

        self.require_chapter(id)
    }

    /// Get a chapter by ID
    pub fn get_chapter(&self, id: i64) -> Result<Option<Chapter>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = ?1"),
                params![id],
                ChapterRow::read,
            )
            .optional()?;

        row.map(ChapterRow::into_chapter).transpose()
    }

    pub(crate) fn require_chapter(&self, id: i64) -> Result<Chapter> {
        self.get_chapter(id)?
            .ok_or_else(|| CatalogError::not_found("chapter", id))
    }

    /// All chapters in display order
    pub fn list_chapters(&self) -> Result<Vec<Chapter>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters ORDER BY order_index, id"
        ))?;

        let rows = stmt.query_map([], ChapterRow::read)?;

        let mut chapters = Vec::new();
        for row in rows {
            chapters.push(row?.into_chapter()?);
        }

        Ok(chapters)
    }

    /// First chapter in display order with the given title
    pub fn find_chapter_by_title(&self, title: &str) -> Result<Option<Chapter>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE title = ?1 ORDER BY order_index, id LIMIT 1"
                ),
                params![title],
                ChapterRow::read,
            )
            .optional()?;

        row.map(ChapterRow::into_chapter).transpose()
    }

    /// Apply a patch to a chapter
    pub fn update_chapter(&self, id: i64, update: &ChapterUpdate) -> Result<Chapter> {
        let current = self.require_chapter(id)?;

        let title = update.title.as_deref().unwrap_or(&current.title);
        let order_index = update.order_index.unwrap_or(current.order_index);

        self.conn.execute(
            "UPDATE chapters SET title = ?1, order_index = ?2, updated_at = ?3 WHERE id = ?4",
            params![title, order_index, now(), id],
        )?;
        debug!(id, "Updated chapter");

        self.require_chapter(id)
    }

    /// Delete a chapter. Its groups follow the `chapter_groups` cascade policy.
    pub fn delete_chapter(&self, id: i64) -> Result<()> {
        let count = self
            .conn
            .execute("DELETE FROM chapters WHERE id = ?1", params![id])?;

        if count == 0 {
            return Err(CatalogError::not_found("chapter", id));
        }

        debug!(id, "Deleted chapter");
        Ok(())
    }

    /// Give the listed chapters order_index 0, 1, 2, ... in the order given
    pub fn reorder_chapters(&self, ids: &[i64]) -> Result<()> {
        ensure_distinct("chapter", ids)?;
        self.atomically(|db| {
            let now = now();
            for (position, id) in ids.iter().enumerate() {
                let count = db.conn.execute(
                    "UPDATE chapters SET order_index = ?1, updated_at = ?2 WHERE id = ?3",
                    params![position as i64, now, id],
                )?;
                if count == 0 {
                    return Err(CatalogError::InvalidInput(format!(
                        "chapter {id} does not exist"
                    )));
                }
            }
            Ok(())
        })
    }

    // ==================== Groups ====================

    /// Insert a group under a chapter
    pub fn create_group(&self, group: &NewGroup) -> Result<Group> {
        let now = now();
        self.conn.execute(
            r#"
            INSERT INTO groups (chapter_id, title, order_index, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
            params![group.chapter_id, group.title, group.order_index, now],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, chapter_id = group.chapter_id, title = %group.title, "Created group");

        self.require_group(id)
    }

    /// Get a group by ID
    pub fn get_group(&self, id: i64) -> Result<Option<Group>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?1"),
                params![id],
                GroupRow::read,
            )
            .optional()?;

        row.map(GroupRow::into_group).transpose()
    }

    pub(crate) fn require_group(&self, id: i64) -> Result<Group> {
        self.get_group(id)?
            .ok_or_else(|| CatalogError::not_found("group", id))
    }

    /// Groups of a chapter in display order
    pub fn list_groups(&self, chapter_id: i64) -> Result<Vec<Group>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE chapter_id = ?1 ORDER BY order_index, id"
        ))?;

        let rows = stmt.query_map(params![chapter_id], GroupRow::read)?;

        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?.into_group()?);
        }

        Ok(groups)
    }

    /// Look up a group by its unique (chapter, title) pair
    pub fn find_group(&self, chapter_id: i64, title: &str) -> Result<Option<Group>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM groups WHERE chapter_id = ?1 AND title = ?2"),
                params![chapter_id, title],
                GroupRow::read,
            )
            .optional()?;

        row.map(GroupRow::into_group).transpose()
    }

    /// Apply a patch to a group
    pub fn update_group(&self, id: i64, update: &GroupUpdate) -> Result<Group> {
        let current = self.require_group(id)?;

        let chapter_id = update.chapter_id.unwrap_or(current.chapter_id);
        let title = update.title.as_deref().unwrap_or(&current.title);
        let order_index = update.order_index.unwrap_or(current.order_index);

        self.conn.execute(
            r#"
            UPDATE groups SET chapter_id = ?1, title = ?2, order_index = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![chapter_id, title, order_index, now(), id],
        )?;
        debug!(id, chapter_id, "Updated group");

        self.require_group(id)
    }

    /// Delete a group. Its problems follow the `group_problems` cascade policy.
    pub fn delete_group(&self, id: i64) -> Result<()> {
        let count = self
            .conn
            .execute("DELETE FROM groups WHERE id = ?1", params![id])?;

        if count == 0 {
            return Err(CatalogError::not_found("group", id));
        }

        debug!(id, "Deleted group");
        Ok(())
    }

    /// Give the listed groups of a chapter order_index 0, 1, 2, ... in the order given
    pub fn reorder_groups(&self, chapter_id: i64, ids: &[i64]) -> Result<()> {
        ensure_distinct("group", ids)?;
        self.atomically(|db| {
            let now = now();
            for (position, id) in ids.iter().enumerate() {
                let count = db.conn.execute(
                    "UPDATE groups SET order_index = ?1, updated_at = ?2 WHERE id = ?3 AND chapter_id = ?4",
                    params![position as i64, now, id, chapter_id],
                )?;
                if count == 0 {
                    return Err(CatalogError::InvalidInput(format!(
                        "group {id} is not in chapter {chapter_id}"
                    )));
                }
            }
            Ok(())
        })
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(DatabaseStats {
            chapters: count("SELECT COUNT(*) FROM chapters")?,
            groups: count("SELECT COUNT(*) FROM groups")?,
            problems: count("SELECT COUNT(*) FROM problems")?,
            aliases: count("SELECT COUNT(*) FROM problem_aliases")?,
            distinct_tags: count("SELECT COUNT(DISTINCT tag) FROM problem_tags")?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    pub chapters: usize,
    pub groups: usize,
    pub problems: usize,
    pub aliases: usize,
    pub distinct_tags: usize,
}

/// Current UTC time in the stored text form
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Reject an id sequence that names the same row twice
fn ensure_distinct(entity: &str, ids: &[i64]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    match ids.iter().find(|id| !seen.insert(**id)) {
        Some(id) => Err(CatalogError::InvalidInput(format!(
            "{entity} {id} is listed more than once"
        ))),
        None => Ok(()),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CatalogError::Corrupt(format!("bad timestamp {value:?}: {e}")))
}

// Internal row types for database mapping

struct ChapterRow {
    id: i64,
    title: String,
    order_index: i64,
    created_at: String,
    updated_at: String,
}

impl ChapterRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            order_index: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_chapter(self) -> Result<Chapter> {
        Ok(Chapter {
            id: self.id,
            title: self.title,
            order_index: self.order_index,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

struct GroupRow {
    id: i64,
    chapter_id: i64,
    title: String,
    order_index: i64,
    created_at: String,
    updated_at: String,
}

impl GroupRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            chapter_id: row.get(1)?,
            title: row.get(2)?,
            order_index: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_group(self) -> Result<Group> {
        Ok(Group {
            id: self.id,
            chapter_id: self.chapter_id,
            title: self.title,
            order_index: self.order_index,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}
