use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::work_item::WorkItem;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Recorded result of attempting one work item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub item_id: String,
    pub item_name: String,
    pub status: OutcomeStatus,
    /// Success notes or the error message.
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_fields: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

impl Outcome {
    pub fn success(item: &WorkItem, detail: impl Into<String>, filled_fields: Option<u32>) -> Self {
        Self {
            item_id: item.item_id.clone(),
            item_name: item.name.clone(),
            status: OutcomeStatus::Success,
            detail: detail.into(),
            filled_fields,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(item: &WorkItem, detail: impl Into<String>) -> Self {
        Self {
            item_id: item.item_id.clone(),
            item_name: item.name.clone(),
            status: OutcomeStatus::Failed,
            detail: detail.into(),
            filled_fields: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
