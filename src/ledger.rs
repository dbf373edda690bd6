use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Counts how often each canonical package name was credited
///
/// Shared by all credit tasks of one orchestrator. Every increment runs
/// under the write lock, so concurrent records of the same name never lose
/// an update.
#[derive(Debug, Default)]
pub struct UsageLedger {
    counts: RwLock<HashMap<String, u64>>,
}

impl UsageLedger {
    /// Creates an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one credit of `name` and returns the new count
    ///
    /// Counts above one are logged as duplicate usage.
    pub async fn record(&self, name: &str) -> u64 {
        let count = {
            let mut counts = self.counts.write().await;
            let entry = counts.entry(name.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if count > 1 {
            warn!(package = name, count, "duplicate usage of library");
        } else {
            debug!(package = name, "first usage of library recorded");
        }
        count
    }

    /// Gets the current count for `name`
    pub async fn count(&self, name: &str) -> Option<u64> {
        self.counts.read().await.get(name).copied()
    }

    /// Names recorded more than once, sorted by name
    pub async fn duplicates(&self) -> Vec<(String, u64)> {
        let counts = self.counts.read().await;
        let mut dups: Vec<_> = counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(name, &count)| (name.clone(), count))
            .collect();
        dups.sort();
        dups
    }

    /// Copy of every entry in name order
    pub async fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counts
            .read()
            .await
            .iter()
            .map(|(name, &count)| (name.clone(), count))
            .collect()
    }
}
