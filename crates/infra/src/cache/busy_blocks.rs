//! In-memory store for pulled external busy blocks.
//!
//! Each pull cycle replaces an integration's blocks wholesale, so entries
//! never need eviction or TTLs. An integration that is disconnected is
//! cleared explicitly.

use std::collections::HashMap;

use bookline_core::BusyBlockStore;
use bookline_domain::ExternalBusyBlock;
use dashmap::DashMap;
use uuid::Uuid;

/// Concurrent map of provider -> integration -> busy blocks.
///
/// Readers (slot generation) and the writer (the pull worker) touch
/// disjoint shards most of the time; a provider's entry is locked only
/// while its own blocks are swapped.
#[derive(Default)]
pub struct BusyBlockCache {
    by_provider: DashMap<Uuid, HashMap<Uuid, Vec<ExternalBusyBlock>>>,
    // Reverse index so clearing an integration does not scan every provider
    provider_of: DashMap<Uuid, Uuid>,
}

impl BusyBlockCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BusyBlockStore for BusyBlockCache {
    fn replace_blocks(
        &self,
        provider_id: Uuid,
        integration_id: Uuid,
        blocks: Vec<ExternalBusyBlock>,
    ) {
        if let Some(previous) = self.provider_of.insert(integration_id, provider_id) {
            if previous != provider_id {
                if let Some(mut entry) = self.by_provider.get_mut(&previous) {
                    entry.remove(&integration_id);
                }
            }
        }

        self.by_provider
            .entry(provider_id)
            .or_default()
            .insert(integration_id, blocks);
    }

    fn blocks_for_provider(&self, provider_id: Uuid) -> Vec<ExternalBusyBlock> {
        let Some(entry) = self.by_provider.get(&provider_id) else {
            return Vec::new();
        };

        let mut blocks: Vec<ExternalBusyBlock> =
            entry.values().flatten().copied().collect();
        blocks.sort_by_key(|block| block.start);
        blocks
    }

    fn clear_integration(&self, integration_id: Uuid) {
        if let Some((_, provider_id)) = self.provider_of.remove(&integration_id) {
            if let Some(mut entry) = self.by_provider.get_mut(&provider_id) {
                entry.remove(&integration_id);
            }
        }
    }
}
