//! Catalog entities
//!
//! Plain records for the four catalog tables plus the inputs used to create
//! and patch them. Constraints live in the schema, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open key/value document attached to a problem
pub type Meta = Map<String, Value>;

/// Top-level catalog section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub title: String,
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Section of problems within a chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub chapter_id: i64,
    pub title: String,
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single coding problem from an external judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: i64,
    pub group_id: i64,
    pub title: String,
    /// Origin platform, e.g. `boj` or `programmers`
    pub source: String,
    /// Platform-native identifier
    pub external_id: String,
    pub url: Option<String>,
    pub level: Option<i64>,
    pub order_index: i64,
    /// Labels in the order they were written; a label may repeat
    pub tags: Vec<String>,
    pub meta: Meta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Problem {
    /// The (source, external_id) identity of this problem
    pub fn external_key(&self) -> ExternalKey {
        ExternalKey::new(&self.source, &self.external_id)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// How many times a label was attached
    pub fn tag_count(&self, tag: &str) -> usize {
        self.tags.iter().filter(|t| *t == tag).count()
    }
}

/// Alternate identifier mapped to a canonical problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemAlias {
    pub id: i64,
    pub problem_id: i64,
    pub alias: String,
    /// Kind of alias, e.g. `boj_id` or `short`
    pub alias_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Globally unique identity of a problem on its origin platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalKey {
    pub source: String,
    pub external_id: String,
}

impl ExternalKey {
    pub fn new(source: &str, external_id: &str) -> Self {
        Self {
            source: source.to_string(),
            external_id: external_id.to_string(),
        }
    }
}

impl std::fmt::Display for ExternalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.external_id)
    }
}

/// A problem together with the group and chapter that own it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProblem {
    pub chapter: Chapter,
    pub group: Group,
    pub problem: Problem,
}

/// Result of an upsert keyed on (source, external_id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

impl std::fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpsertOutcome::Inserted => write!(f, "inserted"),
            UpsertOutcome::Updated => write!(f, "updated"),
        }
    }
}

// ==================== Inputs ====================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewChapter {
    pub title: String,
    #[serde(default)]
    pub order_index: i64,
}

impl NewChapter {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            order_index: 0,
        }
    }

    pub fn with_order(mut self, order_index: i64) -> Self {
        self.order_index = order_index;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterUpdate {
    pub title: Option<String>,
    pub order_index: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewGroup {
    pub chapter_id: i64,
    pub title: String,
    #[serde(default)]
    pub order_index: i64,
}

impl NewGroup {
    pub fn new(chapter_id: i64, title: &str) -> Self {
        Self {
            chapter_id,
            title: title.to_string(),
            order_index: 0,
        }
    }

    pub fn with_order(mut self, order_index: i64) -> Self {
        self.order_index = order_index;
        self
    }
}

/// Patch for a group. Setting `chapter_id` moves the group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupUpdate {
    pub chapter_id: Option<i64>,
    pub title: Option<String>,
    pub order_index: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProblem {
    pub group_id: i64,
    pub title: String,
    pub source: String,
    pub external_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: Meta,
}

impl NewProblem {
    pub fn new(group_id: i64, title: &str, source: &str, external_id: &str) -> Self {
        Self {
            group_id,
            title: title.to_string(),
            source: source.to_string(),
            external_id: external_id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_level(mut self, level: i64) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_order(mut self, order_index: i64) -> Self {
        self.order_index = order_index;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    pub fn external_key(&self) -> ExternalKey {
        ExternalKey::new(&self.source, &self.external_id)
    }
}

/// Patch for a problem. Nested options distinguish "leave as is" from "clear".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemUpdate {
    pub group_id: Option<i64>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub external_id: Option<String>,
    pub url: Option<Option<String>>,
    pub level: Option<Option<i64>>,
    pub order_index: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub meta: Option<Meta>,
}

impl ProblemUpdate {
    /// Patch that overwrites every mutable field except the external key
    pub(crate) fn replace_with(new: &NewProblem) -> Self {
        Self {
            group_id: Some(new.group_id),
            title: Some(new.title.clone()),
            source: None,
            external_id: None,
            url: Some(new.url.clone()),
            level: Some(new.level),
            order_index: Some(new.order_index),
            tags: Some(new.tags.clone()),
            meta: Some(new.meta.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliasUpdate {
    pub alias: Option<String>,
    pub alias_type: Option<Option<String>>,
}
