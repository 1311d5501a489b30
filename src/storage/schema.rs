//! Database schema definition

use crate::config::CascadeConfig;

const CHAPTER_GROUPS_ACTION: &str = "@CHAPTER_GROUPS_ON_DELETE@";
const GROUP_PROBLEMS_ACTION: &str = "@GROUP_PROBLEMS_ON_DELETE@";

/// SQL schema for the catalog. The two `@..._ON_DELETE@` markers are filled in
/// from the cascade configuration by [`schema`].
pub(crate) const SCHEMA: &str = r#"
-- Settings fixed when the database is created
CREATE TABLE IF NOT EXISTS catalog_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Top-level sections
CREATE TABLE IF NOT EXISTS chapters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL CHECK (length(title) <= 200),
    order_index INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ix_chapters_order ON chapters(order_index, id);

-- Sections within a chapter
CREATE TABLE IF NOT EXISTS groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chapter_id INTEGER NOT NULL,
    title TEXT NOT NULL CHECK (length(title) <= 200),
    order_index INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE @CHAPTER_GROUPS_ON_DELETE@,
    CONSTRAINT uq_group_chapter_title UNIQUE (chapter_id, title)
);

CREATE INDEX IF NOT EXISTS ix_groups_chapter_order ON groups(chapter_id, order_index, id);

-- Catalog entries
CREATE TABLE IF NOT EXISTS problems (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    title TEXT NOT NULL CHECK (length(title) <= 300),
    source TEXT NOT NULL CHECK (length(source) <= 32),
    external_id TEXT NOT NULL CHECK (length(external_id) <= 64),
    url TEXT,
    level INTEGER,
    order_index INTEGER NOT NULL DEFAULT 0,
    meta TEXT NOT NULL DEFAULT '{}' CHECK (json_valid(meta) AND json_type(meta) = 'object'),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE @GROUP_PROBLEMS_ON_DELETE@,
    CONSTRAINT uq_problem_source_external UNIQUE (source, external_id)
);

CREATE INDEX IF NOT EXISTS ix_problem_external ON problems(source, external_id);
CREATE INDEX IF NOT EXISTS ix_problems_group_order ON problems(group_id, order_index, id);

-- Tag labels, one row per written label (repeats allowed)
CREATE TABLE IF NOT EXISTS problem_tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    problem_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    tag TEXT NOT NULL CHECK (length(tag) <= 64),
    FOREIGN KEY (problem_id) REFERENCES problems(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS ix_problem_tags_problem ON problem_tags(problem_id, tag);
CREATE INDEX IF NOT EXISTS ix_problem_tags_tag ON problem_tags(tag);

-- Alternate identifiers
CREATE TABLE IF NOT EXISTS problem_aliases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    problem_id INTEGER NOT NULL,
    alias TEXT NOT NULL CHECK (length(alias) <= 128),
    alias_type TEXT CHECK (alias_type IS NULL OR length(alias_type) <= 32),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (problem_id) REFERENCES problems(id) ON DELETE CASCADE,
    CONSTRAINT uq_problem_alias UNIQUE (problem_id, alias)
);

CREATE INDEX IF NOT EXISTS ix_problem_alias_alias ON problem_aliases(alias);
"#;

/// Render the schema for a cascade configuration
pub fn schema(cascade: &CascadeConfig) -> String {
    SCHEMA
        .replace(CHAPTER_GROUPS_ACTION, cascade.chapter_groups.sql_action())
        .replace(GROUP_PROBLEMS_ACTION, cascade.group_problems.sql_action())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_fills_every_marker() {
        let sql = schema(&CascadeConfig::restricting());
        assert!(!sql.contains('@'));
        assert!(sql.contains("REFERENCES chapters(id) ON DELETE RESTRICT"));
        assert!(sql.contains("REFERENCES groups(id) ON DELETE RESTRICT"));
        assert!(sql.contains("REFERENCES problems(id) ON DELETE CASCADE"));
    }

    #[test]
    fn test_default_schema_cascades() {
        let sql = schema(&CascadeConfig::default());
        assert!(sql.contains("REFERENCES chapters(id) ON DELETE CASCADE"));
        assert!(sql.contains("REFERENCES groups(id) ON DELETE CASCADE"));
    }

    #[test]
    fn test_tag_rows_allow_repeats() {
        let sql = schema(&CascadeConfig::default());
        assert!(sql.contains("ix_problem_tags_problem ON problem_tags(problem_id, tag)"));
        assert!(!sql.contains("PRIMARY KEY (problem_id, tag)"));
        assert!(!sql.contains("CREATE UNIQUE INDEX"));
    }
}
