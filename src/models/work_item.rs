use serde::{Deserialize, Serialize};

/// How hard a target is to complete unattended.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// One target to execute within a job. Immutable once resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    #[serde(alias = "id")]
    pub item_id: String,
    pub name: String,
    /// Opaque locator handed to the execution target (usually a URL).
    #[serde(alias = "url", alias = "submissionUrl")]
    pub target: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl WorkItem {
    pub fn new(
        item_id: impl Into<String>,
        name: impl Into<String>,
        target: impl Into<String>,
        category: impl Into<String>,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
            target: target.into(),
            category: category.into(),
            difficulty,
        }
    }
}
