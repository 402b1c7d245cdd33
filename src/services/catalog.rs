//! Tier -> work item catalog resolution with a built-in fallback table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Difficulty, Job, Tier, WorkItem};
use crate::services::queue::RemoteQueue;

/// Built-in catalog used when the remote catalog cannot be loaded.
#[derive(Debug, Clone, Default)]
pub struct FallbackCatalog {
    tiers: HashMap<Tier, TierDefaults>,
}

#[derive(Debug, Clone)]
struct TierDefaults {
    limit: usize,
    items: Vec<WorkItem>,
}

impl FallbackCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Default table: each tier gets a prefix of the shared default list.
    pub fn builtin() -> Self {
        let defaults = default_items();
        let mut catalog = Self::empty();
        for (tier, prefix) in [
            (Tier::Starter, 3),
            (Tier::Growth, 5),
            (Tier::Professional, defaults.len()),
            (Tier::Enterprise, defaults.len()),
        ] {
            catalog = catalog.with_tier(tier, tier.item_limit(), defaults[..prefix].to_vec());
        }
        catalog
    }

    pub fn with_tier(mut self, tier: Tier, limit: usize, items: Vec<WorkItem>) -> Self {
        self.tiers.insert(tier, TierDefaults { limit, items });
        self
    }

    /// Item-count limit for a tier, if it is known to the table.
    pub fn limit(&self, tier: Tier) -> Option<usize> {
        self.tiers.get(&tier).map(|d| d.limit)
    }

    /// Default items for a tier, truncated to its limit.
    pub fn items(&self, tier: Tier) -> Vec<WorkItem> {
        self.tiers
            .get(&tier)
            .map(|d| d.items.iter().take(d.limit).cloned().collect())
            .unwrap_or_default()
    }
}

fn default_items() -> Vec<WorkItem> {
    vec![
        WorkItem::new(
            "google-business",
            "Google Business Profile",
            "https://business.google.com/create",
            "search",
            Difficulty::Medium,
        ),
        WorkItem::new(
            "bing-places",
            "Bing Places",
            "https://www.bingplaces.com/",
            "search",
            Difficulty::Easy,
        ),
        WorkItem::new(
            "yelp",
            "Yelp for Business",
            "https://biz.yelp.com/signup",
            "reviews",
            Difficulty::Hard,
        ),
        WorkItem::new(
            "yellow-pages",
            "Yellow Pages",
            "https://www.yellowpages.com/free-listing",
            "general",
            Difficulty::Medium,
        ),
        WorkItem::new(
            "foursquare",
            "Foursquare",
            "https://foursquare.com/add-place",
            "local",
            Difficulty::Easy,
        ),
        WorkItem::new(
            "manta",
            "Manta",
            "https://www.manta.com/claim",
            "general",
            Difficulty::Easy,
        ),
        WorkItem::new(
            "hotfrog",
            "Hotfrog",
            "https://www.hotfrog.com/add-your-business",
            "general",
            Difficulty::Easy,
        ),
        WorkItem::new(
            "better-business-bureau",
            "Better Business Bureau",
            "https://www.bbb.org/get-listed",
            "trust",
            Difficulty::Hard,
        ),
    ]
}

/// Resolves a job's tier into its ordered work item list.
pub struct CatalogProvider {
    queue: Arc<dyn RemoteQueue>,
    fallback: FallbackCatalog,
}

impl CatalogProvider {
    pub fn new(queue: Arc<dyn RemoteQueue>, fallback: FallbackCatalog) -> Self {
        Self { queue, fallback }
    }

    /// Resolve a job's tier, never failing: a remote error or an empty remote
    /// list falls back to the built-in table, and an unknown tier with no
    /// remote data resolves to an empty list.
    pub async fn resolve(&self, job: &Job) -> Vec<WorkItem> {
        let tier = job.tier.as_str();
        let known = job.known_tier();
        let limit = known.and_then(|t| self.fallback.limit(t));

        match self.queue.fetch_catalog(tier).await {
            Ok(items) if !items.is_empty() => {
                let mut items = items;
                if let Some(limit) = limit {
                    items.truncate(limit);
                }
                tracing::debug!(tier = %tier, count = items.len(), "Resolved remote catalog");
                return items;
            }
            Ok(_) => {
                tracing::warn!(tier = %tier, "Remote catalog empty, using built-in defaults");
            }
            Err(e) => {
                tracing::warn!(tier = %tier, error = %e, "Remote catalog unavailable, using built-in defaults");
            }
        }

        let items = known.map(|t| self.fallback.items(t)).unwrap_or_default();
        tracing::info!(tier = %tier, count = items.len(), "Resolved fallback catalog");
        items
    }
}
