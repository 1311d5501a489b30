//! Error type for catalog storage
//!
//! Constraint enforcement lives in SQLite. This module only classifies the
//! engine's failures so callers can tell a duplicate key from a dangling
//! reference without string matching.

use rusqlite::ffi;
use thiserror::Error;

/// Result alias used throughout the storage layer
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors produced by catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A unique key would be duplicated
    #[error("uniqueness violation: {0}")]
    UniqueViolation(String),

    /// A reference points at a missing parent, or a restricted parent still has children
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A required column was left empty
    #[error("not-null violation: {0}")]
    NotNullViolation(String),

    /// A length bound or document check failed
    #[error("check violation: {0}")]
    CheckViolation(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// More than one problem carries the alias
    #[error("alias {alias:?} is attached to several problems: {problem_ids:?}")]
    AmbiguousAlias { alias: String, problem_ids: Vec<i64> },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// A stored value could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlite(rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Whether this error is a constraint rejected by the storage engine
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::UniqueViolation(_)
                | Self::ForeignKeyViolation(_)
                | Self::NotNullViolation(_)
                | Self::CheckViolation(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        let rusqlite::Error::SqliteFailure(ref failure, ref message) = err else {
            return Self::Sqlite(err);
        };

        if failure.code != ffi::ErrorCode::ConstraintViolation {
            return Self::Sqlite(err);
        }

        let extended_code = failure.extended_code;
        let detail = message
            .clone()
            .unwrap_or_else(|| failure.to_string());

        match extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                Self::UniqueViolation(detail)
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Self::ForeignKeyViolation(detail),
            ffi::SQLITE_CONSTRAINT_NOTNULL => Self::NotNullViolation(detail),
            ffi::SQLITE_CONSTRAINT_CHECK => Self::CheckViolation(detail),
            _ => Self::Sqlite(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn violation(sql: &str) -> CatalogError {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                 id INTEGER PRIMARY KEY,
                 parent_id INTEGER NOT NULL REFERENCES parent(id),
                 name TEXT NOT NULL UNIQUE CHECK (length(name) <= 3)
             );
             INSERT INTO parent (id) VALUES (1);
             INSERT INTO child (parent_id, name) VALUES (1, 'a');",
        )
        .unwrap();
        conn.execute(sql, []).unwrap_err().into()
    }

    #[test]
    fn test_classifies_constraint_failures() {
        assert!(matches!(
            violation("INSERT INTO child (parent_id, name) VALUES (1, 'a')"),
            CatalogError::UniqueViolation(_)
        ));
        assert!(matches!(
            violation("INSERT INTO child (parent_id, name) VALUES (9, 'b')"),
            CatalogError::ForeignKeyViolation(_)
        ));
        assert!(matches!(
            violation("INSERT INTO child (parent_id, name) VALUES (1, NULL)"),
            CatalogError::NotNullViolation(_)
        ));
        assert!(matches!(
            violation("INSERT INTO child (parent_id, name) VALUES (1, 'long')"),
            CatalogError::CheckViolation(_)
        ));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = violation("INSERT INTO missing_table VALUES (1)");
        assert!(matches!(err, CatalogError::Sqlite(_)));
        assert!(!err.is_constraint_violation());
    }
}
