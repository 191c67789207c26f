//! Project data model.
//!
//! Projects are the buildable units of a run. Each one owns its own task
//! graph and may depend on other projects by name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A buildable unit with its own task set and project-level dependencies.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique name within the run.
    pub name: String,
    /// Names of the projects that must build before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Opaque build metadata, passed through to task bodies.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Project {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            depends_on: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Builder-style helper adding a project dependency.
    pub fn depends_on(mut self, dependency: &str) -> Self {
        self.depends_on.push(dependency.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Final status of a project in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Every task in the project's graph succeeded.
    Success,
    /// At least one task failed.
    Failed,
    /// Not built because a dependency project failed.
    Skipped,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Success => write!(f, "SUCCESS"),
            ProjectStatus::Failed => write!(f, "FAILED"),
            ProjectStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}
