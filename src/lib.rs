//! Problem catalog - relational catalog of coding problems
//!
//! Chapters own groups, groups own problems, and problems carry tags, a
//! metadata document and aliases used by external judges. Storage is SQLite;
//! constraints are enforced by the engine and surfaced as [`CatalogError`].

pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod model;
pub mod storage;

/// Re-export commonly used types
pub use config::{AliasConflictPolicy, CascadeConfig, CascadePolicy, CatalogConfig};
pub use error::{CatalogError, Result};
pub use import::{import_manifest, CatalogManifest, ImportReport};
pub use model::{
    AliasUpdate, Chapter, ChapterUpdate, ExternalKey, Group, GroupUpdate, Meta, NewChapter,
    NewGroup, NewProblem, Problem, ProblemAlias, ProblemUpdate, ResolvedProblem, UpsertOutcome,
};
pub use storage::{Database, DatabaseStats};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "problem-catalog";
