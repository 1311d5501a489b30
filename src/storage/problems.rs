//! Problem rows, their tags and the (source, external_id) identity key

use super::{ensure_distinct, now, parse_timestamp, Database};
use crate::error::{CatalogError, Result};
use crate::model::{Meta, NewProblem, Problem, ProblemUpdate, ResolvedProblem, UpsertOutcome};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const PROBLEM_COLUMNS: &str = "p.id, p.group_id, p.title, p.source, p.external_id, p.url, \
                               p.level, p.order_index, p.meta, p.created_at, p.updated_at";

impl Database {
    /// Insert a problem. Fails with a uniqueness violation if its
    /// (source, external_id) pair is already registered.
    pub fn create_problem(&self, problem: &NewProblem) -> Result<Problem> {
        let meta = serde_json::to_string(&problem.meta)?;

        let id = self.atomically(|db| {
            let now = now();
            db.conn.execute(
                r#"
                INSERT INTO problems (
                    group_id, title, source, external_id, url, level,
                    order_index, meta, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                "#,
                params![
                    problem.group_id,
                    problem.title,
                    problem.source,
                    problem.external_id,
                    problem.url,
                    problem.level,
                    problem.order_index,
                    meta,
                    now,
                ],
            )?;

            let id = db.conn.last_insert_rowid();
            db.replace_tags(id, &problem.tags)?;
            Ok(id)
        })?;

        debug!(id, key = %problem.external_key(), "Created problem");
        self.require_problem(id)
    }

    /// Get a problem by ID
    pub fn get_problem(&self, id: i64) -> Result<Option<Problem>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {PROBLEM_COLUMNS} FROM problems p WHERE p.id = ?1"),
                params![id],
                ProblemRow::read,
            )
            .optional()?;

        row.map(|r| self.hydrate(r)).transpose()
    }

    pub(crate) fn require_problem(&self, id: i64) -> Result<Problem> {
        self.get_problem(id)?
            .ok_or_else(|| CatalogError::not_found("problem", id))
    }

    /// Look up a problem by its origin platform identity
    pub fn find_problem_by_external(&self, source: &str, external_id: &str) -> Result<Option<Problem>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {PROBLEM_COLUMNS} FROM problems p WHERE p.source = ?1 AND p.external_id = ?2"
                ),
                params![source, external_id],
                ProblemRow::read,
            )
            .optional()?;

        row.map(|r| self.hydrate(r)).transpose()
    }

    /// Problems of a group in display order
    pub fn list_problems(&self, group_id: i64) -> Result<Vec<Problem>> {
        self.query_problems(
            &format!(
                "SELECT {PROBLEM_COLUMNS} FROM problems p WHERE p.group_id = ?1 ORDER BY p.order_index, p.id"
            ),
            params![group_id],
        )
    }

    /// Problems of every group in a chapter, groups in display order
    pub fn list_chapter_problems(&self, chapter_id: i64) -> Result<Vec<Problem>> {
        self.query_problems(
            &format!(
                r#"
                SELECT {PROBLEM_COLUMNS} FROM problems p
                JOIN groups g ON g.id = p.group_id
                WHERE g.chapter_id = ?1
                ORDER BY g.order_index, g.id, p.order_index, p.id
                "#
            ),
            params![chapter_id],
        )
    }

    /// Problems carrying a tag, by ID. A problem tagged twice is listed once.
    pub fn list_problems_with_tag(&self, tag: &str) -> Result<Vec<Problem>> {
        self.query_problems(
            &format!(
                r#"
                SELECT {PROBLEM_COLUMNS} FROM problems p
                WHERE EXISTS (
                    SELECT 1 FROM problem_tags t WHERE t.problem_id = p.id AND t.tag = ?1
                )
                ORDER BY p.id
                "#
            ),
            params![tag],
        )
    }

    /// Apply a patch to a problem
    pub fn update_problem(&self, id: i64, update: &ProblemUpdate) -> Result<Problem> {
        self.atomically(|db| {
            let current = db.require_problem(id)?;

            let group_id = update.group_id.unwrap_or(current.group_id);
            let title = update.title.as_deref().unwrap_or(&current.title);
            let source = update.source.as_deref().unwrap_or(&current.source);
            let external_id = update.external_id.as_deref().unwrap_or(&current.external_id);
            let url = update.url.clone().unwrap_or(current.url.clone());
            let level = update.level.unwrap_or(current.level);
            let order_index = update.order_index.unwrap_or(current.order_index);
            let meta = serde_json::to_string(update.meta.as_ref().unwrap_or(&current.meta))?;

            db.conn.execute(
                r#"
                UPDATE problems SET
                    group_id = ?1, title = ?2, source = ?3, external_id = ?4, url = ?5,
                    level = ?6, order_index = ?7, meta = ?8, updated_at = ?9
                WHERE id = ?10
                "#,
                params![
                    group_id,
                    title,
                    source,
                    external_id,
                    url,
                    level,
                    order_index,
                    meta,
                    now(),
                    id,
                ],
            )?;

            if let Some(tags) = &update.tags {
                db.replace_tags(id, tags)?;
            }

            debug!(id, "Updated problem");
            db.require_problem(id)
        })
    }

    /// Delete a problem together with its aliases and tags
    pub fn delete_problem(&self, id: i64) -> Result<()> {
        let count = self
            .conn
            .execute("DELETE FROM problems WHERE id = ?1", params![id])?;

        if count == 0 {
            return Err(CatalogError::not_found("problem", id));
        }

        debug!(id, "Deleted problem");
        Ok(())
    }

    /// Give the listed problems of a group order_index 0, 1, 2, ... in the order given
    pub fn reorder_problems(&self, group_id: i64, ids: &[i64]) -> Result<()> {
        ensure_distinct("problem", ids)?;
        self.atomically(|db| {
            let now = now();
            for (position, id) in ids.iter().enumerate() {
                let count = db.conn.execute(
                    "UPDATE problems SET order_index = ?1, updated_at = ?2 WHERE id = ?3 AND group_id = ?4",
                    params![position as i64, now, id, group_id],
                )?;
                if count == 0 {
                    return Err(CatalogError::InvalidInput(format!(
                        "problem {id} is not in group {group_id}"
                    )));
                }
            }
            Ok(())
        })
    }

    /// Insert the problem, or update the one already registered under its
    /// (source, external_id). The existing row keeps its id and `created_at`.
    pub fn upsert_problem(&self, problem: &NewProblem) -> Result<(Problem, UpsertOutcome)> {
        self.atomically(|db| {
            match db.find_problem_by_external(&problem.source, &problem.external_id)? {
                Some(existing) => {
                    let updated =
                        db.update_problem(existing.id, &ProblemUpdate::replace_with(problem))?;
                    Ok((updated, UpsertOutcome::Updated))
                }
                None => Ok((db.create_problem(problem)?, UpsertOutcome::Inserted)),
            }
        })
    }

    /// A problem with the group and chapter that own it
    pub fn resolve_path(&self, problem_id: i64) -> Result<ResolvedProblem> {
        let problem = self.require_problem(problem_id)?;
        let group = self.require_group(problem.group_id)?;
        let chapter = self.require_chapter(group.chapter_id)?;

        Ok(ResolvedProblem {
            chapter,
            group,
            problem,
        })
    }

    fn query_problems(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Problem>> {
        let rows = {
            let mut stmt = self.conn.prepare(sql)?;
            let mapped = stmt.query_map(params, ProblemRow::read)?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()?
        };

        rows.into_iter().map(|r| self.hydrate(r)).collect()
    }

    /// Attach tags to a problem row
    fn hydrate(&self, row: ProblemRow) -> Result<Problem> {
        let tags = self.tags_for(row.id)?;
        row.into_problem(tags)
    }

    fn tags_for(&self, problem_id: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM problem_tags WHERE problem_id = ?1 ORDER BY position")?;

        let tags = stmt
            .query_map(params![problem_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(tags)
    }

    /// Store the labels exactly as given, repeats and order included
    fn replace_tags(&self, problem_id: i64, tags: &[String]) -> Result<()> {
        self.conn
            .execute("DELETE FROM problem_tags WHERE problem_id = ?1", params![problem_id])?;

        let mut stmt = self
            .conn
            .prepare("INSERT INTO problem_tags (problem_id, position, tag) VALUES (?1, ?2, ?3)")?;
        for (position, tag) in tags.iter().enumerate() {
            stmt.execute(params![problem_id, position as i64, tag])?;
        }

        Ok(())
    }
}

// Internal row type for database mapping

struct ProblemRow {
    id: i64,
    group_id: i64,
    title: String,
    source: String,
    external_id: String,
    url: Option<String>,
    level: Option<i64>,
    order_index: i64,
    meta: String,
    created_at: String,
    updated_at: String,
}

impl ProblemRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            group_id: row.get(1)?,
            title: row.get(2)?,
            source: row.get(3)?,
            external_id: row.get(4)?,
            url: row.get(5)?,
            level: row.get(6)?,
            order_index: row.get(7)?,
            meta: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_problem(self, tags: Vec<String>) -> Result<Problem> {
        let meta: Meta = serde_json::from_str(&self.meta)
            .map_err(|e| CatalogError::Corrupt(format!("problem {} meta: {e}", self.id)))?;

        Ok(Problem {
            id: self.id,
            group_id: self.group_id,
            title: self.title,
            source: self.source,
            external_id: self.external_id,
            url: self.url,
            level: self.level,
            order_index: self.order_index,
            tags,
            meta,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewChapter, NewGroup};
    use serde_json::json;

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let chapter = db.create_chapter(&NewChapter::new("Chapter 1")).unwrap();
        let group = db.create_group(&NewGroup::new(chapter.id, "Group A")).unwrap();
        (db, group.id)
    }

    #[test]
    fn test_tags_and_meta_round_trip() {
        let (db, group_id) = setup();

        let mut meta = Meta::new();
        meta.insert("year".to_string(), json!(2021));

        let created = db
            .create_problem(
                &NewProblem::new(group_id, "Two Sum", "boj", "1000")
                    .with_tags(["graph", "dp"])
                    .with_meta(meta.clone())
                    .with_url("https://www.acmicpc.net/problem/1000")
                    .with_level(3),
            )
            .unwrap();

        let fetched = db.get_problem(created.id).unwrap().unwrap();
        assert_eq!(fetched.tags, vec!["graph".to_string(), "dp".to_string()]);
        assert_eq!(fetched.meta, meta);
        assert_eq!(fetched.level, Some(3));
        assert!(fetched.has_tag("dp"));
        assert!(!fetched.has_tag("greedy"));
    }

    #[test]
    fn test_meta_defaults_to_empty_document() {
        let (db, group_id) = setup();
        let problem = db
            .create_problem(&NewProblem::new(group_id, "A+B", "boj", "1001"))
            .unwrap();
        assert!(problem.meta.is_empty());
        assert!(problem.tags.is_empty());
        assert!(problem.url.is_none());
    }

    #[test]
    fn test_duplicate_external_key_fails() {
        let (db, group_id) = setup();
        db.create_problem(&NewProblem::new(group_id, "Two Sum", "boj", "1000"))
            .unwrap();

        let err = db
            .create_problem(&NewProblem::new(group_id, "Copy", "boj", "1000"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::UniqueViolation(_)));

        // Same id on another platform is a different problem
        db.create_problem(&NewProblem::new(group_id, "Two Sum", "programmers", "1000"))
            .unwrap();
        assert_eq!(db.get_stats().unwrap().problems, 2);
    }

    #[test]
    fn test_repeated_tags_are_kept() {
        let (db, group_id) = setup();
        let created = db
            .create_problem(
                &NewProblem::new(group_id, "Two Sum", "boj", "1000").with_tags(["dp", "dp", "graph"]),
            )
            .unwrap();

        let fetched = db.get_problem(created.id).unwrap().unwrap();
        assert_eq!(fetched.tags, vec!["dp", "dp", "graph"]);
        assert_eq!(db.get_stats().unwrap().distinct_tags, 2);

        let tagged = db.list_problems_with_tag("dp").unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].tags, vec!["dp", "dp", "graph"]);
    }

    #[test]
    fn test_empty_tag_is_a_label() {
        let (db, group_id) = setup();
        let created = db
            .create_problem(&NewProblem::new(group_id, "A+B", "boj", "1001").with_tags(["", "math"]))
            .unwrap();

        assert_eq!(created.tags, vec!["", "math"]);
        assert!(created.has_tag(""));
        assert_eq!(db.list_problems_with_tag("").unwrap().len(), 1);
    }

    #[test]
    fn test_failed_insert_leaves_no_tags() {
        let (db, group_id) = setup();
        let err = db
            .create_problem(
                &NewProblem::new(group_id, "Bad", "boj", "1").with_tags(["dp".to_string(), "x".repeat(65)]),
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::CheckViolation(_)));

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.problems, 0);
        assert_eq!(stats.distinct_tags, 0);
    }

    #[test]
    fn test_problem_requires_existing_group() {
        let (db, _) = setup();
        let err = db
            .create_problem(&NewProblem::new(404, "Lost", "boj", "1000"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::ForeignKeyViolation(_)));
    }

    #[test]
    fn test_list_problems_with_tag() {
        let (db, group_id) = setup();
        let a = db
            .create_problem(&NewProblem::new(group_id, "A", "boj", "1").with_tags(["dp"]))
            .unwrap();
        db.create_problem(&NewProblem::new(group_id, "B", "boj", "2").with_tags(["graph"]))
            .unwrap();
        let c = db
            .create_problem(&NewProblem::new(group_id, "C", "boj", "3").with_tags(["dp", "graph"]))
            .unwrap();

        let ids: Vec<_> = db
            .list_problems_with_tag("dp")
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![a.id, c.id]);
        assert!(db.list_problems_with_tag("math").unwrap().is_empty());
    }

    #[test]
    fn test_update_problem_patch() {
        let (db, group_id) = setup();
        let problem = db
            .create_problem(
                &NewProblem::new(group_id, "A", "boj", "1")
                    .with_url("https://example.com")
                    .with_tags(["dp"]),
            )
            .unwrap();

        let updated = db
            .update_problem(
                problem.id,
                &ProblemUpdate {
                    url: Some(None),
                    tags: Some(vec!["greedy".to_string()]),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.title, "A");
        assert!(updated.url.is_none());
        assert_eq!(updated.tags, vec!["greedy".to_string()]);
        assert_eq!(updated.created_at, problem.created_at);
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn test_upsert_keeps_identity() {
        let (db, group_id) = setup();

        let (first, outcome) = db
            .upsert_problem(&NewProblem::new(group_id, "Two Sum", "boj", "1000").with_level(1))
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let (second, outcome) = db
            .upsert_problem(
                &NewProblem::new(group_id, "Two Sum (rev)", "boj", "1000")
                    .with_level(2)
                    .with_tags(["math"]),
            )
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.title, "Two Sum (rev)");
        assert_eq!(second.level, Some(2));
        assert_eq!(second.tags, vec!["math".to_string()]);
        assert_eq!(db.get_stats().unwrap().problems, 1);
    }

    #[test]
    fn test_reorder_problems() {
        let (db, group_id) = setup();
        let a = db.create_problem(&NewProblem::new(group_id, "A", "boj", "1")).unwrap();
        let b = db.create_problem(&NewProblem::new(group_id, "B", "boj", "2")).unwrap();
        let c = db.create_problem(&NewProblem::new(group_id, "C", "boj", "3")).unwrap();

        db.reorder_problems(group_id, &[c.id, a.id, b.id]).unwrap();
        let titles: Vec<_> = db
            .list_problems(group_id)
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["C", "A", "B"]);

        db.reorder_problems(group_id, &[b.id, c.id, a.id]).unwrap();
        let titles: Vec<_> = db
            .list_problems(group_id)
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["B", "C", "A"]);

        let err = db.reorder_problems(group_id, &[a.id, a.id, b.id]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidInput(_)));
        assert_eq!(db.require_problem(b.id).unwrap().order_index, 0);
    }

    #[test]
    fn test_resolve_path() {
        let (db, group_id) = setup();
        let problem = db
            .create_problem(&NewProblem::new(group_id, "Two Sum", "boj", "1000"))
            .unwrap();

        let path = db.resolve_path(problem.id).unwrap();
        assert_eq!(path.chapter.title, "Chapter 1");
        assert_eq!(path.group.title, "Group A");
        assert_eq!(path.problem.id, problem.id);
    }
}
