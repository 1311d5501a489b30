//! Idempotent catalog import
//!
//! A manifest describes a catalog tree. Importing it matches chapters by
//! title, groups by (chapter, title) and problems by (source, external_id), so
//! importing the same manifest twice leaves the catalog unchanged apart from
//! `updated_at`.

use crate::error::Result;
use crate::model::{
    AliasUpdate, ChapterUpdate, GroupUpdate, Meta, NewChapter, NewGroup, NewProblem, UpsertOutcome,
};
use crate::storage::Database;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// A catalog tree in import form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogManifest {
    #[serde(default)]
    pub chapters: Vec<ChapterManifest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterManifest {
    pub title: String,
    #[serde(default)]
    pub groups: Vec<GroupManifest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupManifest {
    pub title: String,
    #[serde(default)]
    pub problems: Vec<ProblemManifest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemManifest {
    pub title: String,
    pub source: String,
    pub external_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub aliases: Vec<AliasManifest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliasManifest {
    pub alias: String,
    #[serde(default)]
    pub alias_type: Option<String>,
}

/// What an import changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub chapters_created: usize,
    pub groups_created: usize,
    pub problems_inserted: usize,
    pub problems_updated: usize,
    pub aliases_added: usize,
    /// Attached aliases whose type was changed to the manifest's
    pub aliases_updated: usize,
}

impl CatalogManifest {
    /// Load a manifest from a `.toml` or `.json` file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {:?}", path))?;

        let manifest = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON manifest: {:?}", path))?,
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML manifest: {:?}", path))?,
            other => anyhow::bail!("Unsupported manifest format {:?} for {:?}", other, path),
        };

        Ok(manifest)
    }

    /// Number of problems in the manifest
    pub fn problem_count(&self) -> usize {
        self.chapters
            .iter()
            .flat_map(|c| &c.groups)
            .map(|g| g.problems.len())
            .sum()
    }
}

/// Import a manifest in one transaction. Positions in the manifest become
/// `order_index` values. Any failure rolls back the whole import.
pub fn import_manifest(db: &Database, manifest: &CatalogManifest) -> Result<ImportReport> {
    let report = db.atomically(|db| {
        let mut report = ImportReport::default();

        for (chapter_pos, chapter_doc) in manifest.chapters.iter().enumerate() {
            let chapter_order = chapter_pos as i64;
            let chapter = match db.find_chapter_by_title(&chapter_doc.title)? {
                Some(existing) if existing.order_index == chapter_order => existing,
                Some(existing) => db.update_chapter(
                    existing.id,
                    &ChapterUpdate {
                        order_index: Some(chapter_order),
                        ..Default::default()
                    },
                )?,
                None => {
                    report.chapters_created += 1;
                    db.create_chapter(&NewChapter::new(&chapter_doc.title).with_order(chapter_order))?
                }
            };

            for (group_pos, group_doc) in chapter_doc.groups.iter().enumerate() {
                let group_order = group_pos as i64;
                let group = match db.find_group(chapter.id, &group_doc.title)? {
                    Some(existing) if existing.order_index == group_order => existing,
                    Some(existing) => db.update_group(
                        existing.id,
                        &GroupUpdate {
                            order_index: Some(group_order),
                            ..Default::default()
                        },
                    )?,
                    None => {
                        report.groups_created += 1;
                        db.create_group(
                            &NewGroup::new(chapter.id, &group_doc.title).with_order(group_order),
                        )?
                    }
                };

                for (problem_pos, problem_doc) in group_doc.problems.iter().enumerate() {
                    let new_problem = NewProblem {
                        group_id: group.id,
                        title: problem_doc.title.clone(),
                        source: problem_doc.source.clone(),
                        external_id: problem_doc.external_id.clone(),
                        url: problem_doc.url.clone(),
                        level: problem_doc.level,
                        order_index: problem_pos as i64,
                        tags: problem_doc.tags.clone(),
                        meta: problem_doc.meta.clone(),
                    };

                    let (problem, outcome) = db.upsert_problem(&new_problem)?;
                    match outcome {
                        UpsertOutcome::Inserted => report.problems_inserted += 1,
                        UpsertOutcome::Updated => report.problems_updated += 1,
                    }

                    for alias_doc in &problem_doc.aliases {
                        match db.find_alias(problem.id, &alias_doc.alias)? {
                            Some(existing) if existing.alias_type == alias_doc.alias_type => {}
                            Some(existing) => {
                                db.update_alias(
                                    existing.id,
                                    &AliasUpdate {
                                        alias_type: Some(alias_doc.alias_type.clone()),
                                        ..Default::default()
                                    },
                                )?;
                                report.aliases_updated += 1;
                            }
                            None => {
                                db.add_alias(
                                    problem.id,
                                    &alias_doc.alias,
                                    alias_doc.alias_type.as_deref(),
                                )?;
                                report.aliases_added += 1;
                            }
                        }
                    }
                }
            }
        }

        Ok(report)
    })?;

    info!(
        chapters_created = report.chapters_created,
        groups_created = report.groups_created,
        problems_inserted = report.problems_inserted,
        problems_updated = report.problems_updated,
        aliases_added = report.aliases_added,
        aliases_updated = report.aliases_updated,
        "Imported catalog manifest"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;

    const MANIFEST: &str = r#"
[[chapters]]
title = "Chapter 1"

[[chapters.groups]]
title = "Group A"

[[chapters.groups.problems]]
title = "Two Sum"
source = "boj"
external_id = "1000"
tags = ["dp", "graph"]
meta = { year = 2021 }
aliases = [{ alias = "boj1000", alias_type = "boj_id" }, { alias = "two-sum" }]

[[chapters.groups.problems]]
title = "A-B"
source = "boj"
external_id = "1001"
"#;

    fn manifest() -> CatalogManifest {
        toml::from_str(MANIFEST).unwrap()
    }

    #[test]
    fn test_parse_manifest() {
        let manifest = manifest();
        assert_eq!(manifest.chapters.len(), 1);
        assert_eq!(manifest.problem_count(), 2);

        let two_sum = &manifest.chapters[0].groups[0].problems[0];
        assert_eq!(two_sum.aliases.len(), 2);
        assert_eq!(two_sum.aliases[1].alias_type, None);
        assert_eq!(two_sum.meta["year"], 2021);
    }

    #[test]
    fn test_import_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let manifest = manifest();

        let first = import_manifest(&db, &manifest).unwrap();
        assert_eq!(
            first,
            ImportReport {
                chapters_created: 1,
                groups_created: 1,
                problems_inserted: 2,
                problems_updated: 0,
                aliases_added: 2,
                aliases_updated: 0,
            }
        );

        let second = import_manifest(&db, &manifest).unwrap();
        assert_eq!(second.chapters_created, 0);
        assert_eq!(second.groups_created, 0);
        assert_eq!(second.problems_inserted, 0);
        assert_eq!(second.problems_updated, 2);
        assert_eq!(second.aliases_added, 0);
        assert_eq!(second.aliases_updated, 0);

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.problems, 2);
        assert_eq!(stats.aliases, 2);

        let problem = db.resolve_alias("boj1000", Some("boj_id")).unwrap();
        assert_eq!(problem.title, "Two Sum");
        assert_eq!(problem.order_index, 0);
    }

    #[test]
    fn test_reimport_applies_changed_alias_type() {
        let db = Database::open_in_memory().unwrap();
        let mut manifest = manifest();
        import_manifest(&db, &manifest).unwrap();

        let aliases = &mut manifest.chapters[0].groups[0].problems[0].aliases;
        aliases[0].alias_type = Some("acmicpc".to_string());
        aliases[1].alias_type = Some("slug".to_string());

        let report = import_manifest(&db, &manifest).unwrap();
        assert_eq!(report.aliases_added, 0);
        assert_eq!(report.aliases_updated, 2);
        assert_eq!(db.get_stats().unwrap().aliases, 2);

        assert_eq!(db.resolve_alias("boj1000", Some("acmicpc")).unwrap().title, "Two Sum");
        assert!(db.resolve_alias("boj1000", Some("boj_id")).unwrap_err().is_not_found());
        assert_eq!(db.resolve_alias("two-sum", Some("slug")).unwrap().title, "Two Sum");
    }

    #[test]
    fn test_failed_import_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let mut manifest = manifest();
        manifest.chapters[0].groups[0].problems[1].title = "x".repeat(301);

        let err = import_manifest(&db, &manifest).unwrap_err();
        assert!(matches!(err, CatalogError::CheckViolation(_)));

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.chapters, 0);
        assert_eq!(stats.problems, 0);
        assert_eq!(stats.aliases, 0);
    }
}
