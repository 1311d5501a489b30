//! Problem aliases and alias resolution

use super::{now, parse_timestamp, Database};
use crate::config::AliasConflictPolicy;
use crate::error::{CatalogError, Result};
use crate::model::{AliasUpdate, Problem, ProblemAlias, ResolvedProblem};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, warn};

const ALIAS_COLUMNS: &str = "id, problem_id, alias, alias_type, created_at, updated_at";

impl Database {
    /// Attach an alias to a problem. The same alias may not be attached to
    /// one problem twice, but may appear on several problems.
    pub fn add_alias(
        &self,
        problem_id: i64,
        alias: &str,
        alias_type: Option<&str>,
    ) -> Result<ProblemAlias> {
        let now = now();
        self.conn.execute(
            r#"
            INSERT INTO problem_aliases (problem_id, alias, alias_type, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
            params![problem_id, alias, alias_type, now],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, problem_id, alias, "Added alias");

        self.get_alias(id)?
            .ok_or_else(|| CatalogError::not_found("alias", id))
    }

    /// Get an alias by ID
    pub fn get_alias(&self, id: i64) -> Result<Option<ProblemAlias>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ALIAS_COLUMNS} FROM problem_aliases WHERE id = ?1"),
                params![id],
                AliasRow::read,
            )
            .optional()?;

        row.map(AliasRow::into_alias).transpose()
    }

    /// The alias row attaching `alias` to a specific problem, if any
    pub fn find_alias(&self, problem_id: i64, alias: &str) -> Result<Option<ProblemAlias>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ALIAS_COLUMNS} FROM problem_aliases WHERE problem_id = ?1 AND alias = ?2"
                ),
                params![problem_id, alias],
                AliasRow::read,
            )
            .optional()?;

        row.map(AliasRow::into_alias).transpose()
    }

    /// All aliases of a problem, oldest first
    pub fn list_aliases(&self, problem_id: i64) -> Result<Vec<ProblemAlias>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALIAS_COLUMNS} FROM problem_aliases WHERE problem_id = ?1 ORDER BY id"
        ))?;

        let rows = stmt.query_map(params![problem_id], AliasRow::read)?;

        let mut aliases = Vec::new();
        for row in rows {
            aliases.push(row?.into_alias()?);
        }

        Ok(aliases)
    }

    /// Rename an alias or change its type
    pub fn update_alias(&self, id: i64, update: &AliasUpdate) -> Result<ProblemAlias> {
        let current = self
            .get_alias(id)?
            .ok_or_else(|| CatalogError::not_found("alias", id))?;

        let alias = update.alias.as_deref().unwrap_or(&current.alias);
        let alias_type = update.alias_type.clone().unwrap_or(current.alias_type.clone());

        self.conn.execute(
            "UPDATE problem_aliases SET alias = ?1, alias_type = ?2, updated_at = ?3 WHERE id = ?4",
            params![alias, alias_type, now(), id],
        )?;
        debug!(id, "Updated alias");

        self.get_alias(id)?
            .ok_or_else(|| CatalogError::not_found("alias", id))
    }

    pub fn delete_alias(&self, id: i64) -> Result<()> {
        let count = self
            .conn
            .execute("DELETE FROM problem_aliases WHERE id = ?1", params![id])?;

        if count == 0 {
            return Err(CatalogError::not_found("alias", id));
        }

        debug!(id, "Deleted alias");
        Ok(())
    }

    // ==================== Resolution ====================

    /// Resolve an externally supplied identifier to its canonical problem.
    ///
    /// With `alias_type` set, only aliases of that type match. When the alias is
    /// attached to several problems the configured [`AliasConflictPolicy`]
    /// decides between failing with [`CatalogError::AmbiguousAlias`] and taking
    /// the lowest problem id.
    pub fn resolve_alias(&self, alias: &str, alias_type: Option<&str>) -> Result<Problem> {
        let ids = self.alias_problem_ids(alias, alias_type)?;

        let id = match ids.len() {
            0 => return Err(CatalogError::not_found("alias", alias)),
            1 => ids[0],
            _ => match self.alias_conflict {
                AliasConflictPolicy::Reject => {
                    return Err(CatalogError::AmbiguousAlias {
                        alias: alias.to_string(),
                        problem_ids: ids,
                    })
                }
                AliasConflictPolicy::FirstById => {
                    warn!(alias, candidates = ?ids, "Ambiguous alias, using lowest problem id");
                    ids[0]
                }
            },
        };

        self.require_problem(id)
    }

    /// Every problem an alias is attached to, by ID
    pub fn resolve_alias_all(&self, alias: &str, alias_type: Option<&str>) -> Result<Vec<Problem>> {
        self.alias_problem_ids(alias, alias_type)?
            .into_iter()
            .map(|id| self.require_problem(id))
            .collect()
    }

    /// Resolve an alias to its problem, group and chapter
    pub fn resolve_alias_path(&self, alias: &str, alias_type: Option<&str>) -> Result<ResolvedProblem> {
        let problem = self.resolve_alias(alias, alias_type)?;
        self.resolve_path(problem.id)
    }

    fn alias_problem_ids(&self, alias: &str, alias_type: Option<&str>) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT problem_id FROM problem_aliases
            WHERE alias = ?1 AND (?2 IS NULL OR alias_type = ?2)
            ORDER BY problem_id
            "#,
        )?;

        let ids = stmt
            .query_map(params![alias, alias_type], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        Ok(ids)
    }
}

// Internal row type for database mapping

struct AliasRow {
    id: i64,
    problem_id: i64,
    alias: String,
    alias_type: Option<String>,
    created_at: String,
    updated_at: String,
}

impl AliasRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            problem_id: row.get(1)?,
            alias: row.get(2)?,
            alias_type: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_alias(self) -> Result<ProblemAlias> {
        Ok(ProblemAlias {
            id: self.id,
            problem_id: self.problem_id,
            alias: self.alias,
            alias_type: self.alias_type,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}
