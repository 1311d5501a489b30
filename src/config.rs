//! Catalog configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for opening a catalog database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path of the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// What alias resolution does when several problems share an alias
    #[serde(default)]
    pub alias_conflict: AliasConflictPolicy,

    /// Delete behaviour of the ownership relationships
    #[serde(default)]
    pub cascade: CascadeConfig,
}

/// Delete behaviour for a parent/child relationship
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    /// Deleting the parent deletes its children
    #[default]
    Cascade,
    /// Deleting a parent that still has children fails
    Restrict,
}

impl CascadePolicy {
    /// The `ON DELETE` action for this policy
    pub fn sql_action(self) -> &'static str {
        match self {
            CascadePolicy::Cascade => "CASCADE",
            CascadePolicy::Restrict => "RESTRICT",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CascadePolicy::Cascade => "cascade",
            CascadePolicy::Restrict => "restrict",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cascade" => Some(CascadePolicy::Cascade),
            "restrict" => Some(CascadePolicy::Restrict),
            _ => None,
        }
    }
}

impl std::fmt::Display for CascadePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cascade policy per relationship. Aliases and tags always follow their problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Chapter -> Group
    #[serde(default)]
    pub chapter_groups: CascadePolicy,

    /// Group -> Problem
    #[serde(default)]
    pub group_problems: CascadePolicy,
}

impl CascadeConfig {
    /// Cascade on every relationship
    pub fn cascading() -> Self {
        Self::default()
    }

    /// Refuse to delete any parent that still has children
    pub fn restricting() -> Self {
        Self {
            chapter_groups: CascadePolicy::Restrict,
            group_problems: CascadePolicy::Restrict,
        }
    }
}

/// Tie-break for an alias attached to more than one problem
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasConflictPolicy {
    /// Report the ambiguity as an error
    #[default]
    Reject,
    /// Pick the problem with the lowest id
    FirstById,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("catalog.db")
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            alias_conflict: AliasConflictPolicy::default(),
            cascade: CascadeConfig::default(),
        }
    }
}

impl CatalogConfig {
    /// Load configuration from a TOML file, or return defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let config: CatalogConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.database_path, PathBuf::from("catalog.db"));
        assert_eq!(config.cascade.chapter_groups, CascadePolicy::Cascade);
        assert_eq!(config.cascade.group_problems, CascadePolicy::Cascade);
        assert_eq!(config.alias_conflict, AliasConflictPolicy::Reject);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CatalogConfig = toml::from_str(
            r#"
            alias_conflict = "first_by_id"

            [cascade]
            group_problems = "restrict"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("catalog.db"));
        assert_eq!(config.cascade.chapter_groups, CascadePolicy::Cascade);
        assert_eq!(config.cascade.group_problems, CascadePolicy::Restrict);
        assert_eq!(config.alias_conflict, AliasConflictPolicy::FirstById);
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let result: std::result::Result<CatalogConfig, _> =
            toml::from_str("[cascade]\nchapter_groups = \"sometimes\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_names() {
        for policy in [CascadePolicy::Cascade, CascadePolicy::Restrict] {
            assert_eq!(CascadePolicy::parse(policy.as_str()), Some(policy));
        }
        assert_eq!(CascadePolicy::Restrict.sql_action(), "RESTRICT");
        assert_eq!(CascadePolicy::parse("nope"), None);
    }
}
