use std::collections::BTreeSet;

use crate::model::material::MaterialId;
use crate::project::config::QuotaConfig;

/// Storage-side view of a stored material blob.
#[derive(Clone, Copy, Debug)]
pub struct StoreEntry {
    pub id: MaterialId,
    pub bytes: u64,
    pub last_used_ms: u64,
}

/// Contract over the persistent material store. The engine never touches the
/// store's encoding; it only observes usage and requests removals.
pub trait MaterialStore {
    fn capacity_bytes(&self) -> u64;
    fn used_bytes(&self) -> u64;
    fn entries(&self) -> Vec<StoreEntry>;
    fn remove(&mut self, id: MaterialId) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaStatus {
    Ok,
    Warning,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    NotNeeded,
    Freed { removed: usize },
    /// Only pinned materials remain; the caller should refuse further ingest.
    CannotFree,
}

/// Quota supervision: watches usage thresholds and runs LRU sweeps that never
/// touch materials pinned by live clips.
pub struct QuotaManager {
    config: QuotaConfig,
}

impl QuotaManager {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    pub fn usage_ratio(store: &dyn MaterialStore) -> f64 {
        let capacity = store.capacity_bytes();
        if capacity == 0 {
            return 0.0;
        }
        store.used_bytes() as f64 / capacity as f64
    }

    pub fn status(&self, store: &dyn MaterialStore) -> QuotaStatus {
        let ratio = Self::usage_ratio(store);
        if ratio >= self.config.critical_threshold {
            QuotaStatus::Critical
        } else if ratio >= self.config.warning_threshold {
            QuotaStatus::Warning
        } else {
            QuotaStatus::Ok
        }
    }

    /// Sweep least-recently-used unpinned materials until usage drops to the
    /// target free fraction. Pinned ids are never candidates.
    pub fn ensure_capacity(
        &self,
        store: &mut dyn MaterialStore,
        pinned: &BTreeSet<MaterialId>,
    ) -> SweepOutcome {
        if self.status(store) != QuotaStatus::Critical {
            return SweepOutcome::NotNeeded;
        }

        let target_ratio = (1.0 - self.config.target_free_percent).clamp(0.0, 1.0);
        let mut candidates: Vec<StoreEntry> = store
            .entries()
            .into_iter()
            .filter(|e| !pinned.contains(&e.id))
            .collect();
        candidates.sort_by_key(|e| e.last_used_ms);

        if candidates.is_empty() {
            return SweepOutcome::CannotFree;
        }

        let mut removed = 0usize;
        for entry in candidates {
            if Self::usage_ratio(store) <= target_ratio {
                break;
            }
            if store.remove(entry.id) {
                tracing::debug!(material = ?entry.id, bytes = entry.bytes, "quota sweep evicted");
                removed += 1;
            }
        }

        if Self::usage_ratio(store) > target_ratio && removed == 0 {
            return SweepOutcome::CannotFree;
        }
        SweepOutcome::Freed { removed }
    }
}
