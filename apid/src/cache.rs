//! The published snapshot and its single-writer cache.

use crate::types::*;
use pool_store::types::{BlockCounts, BlockRow, PaymentCounts, PaymentRow};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Every derived metric the engine publishes.
///
/// The field set is closed: collectors write into an existing field or
/// nowhere. Readers only ever see a `Snapshot` behind an [`Arc`], so a
/// published value is immutable for its whole lifetime.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub event_counter: EventCounter,

    pub network_info: NetworkInfo,
    pub payoutd_info: PayoutdInfo,
    pub price_info: PriceInfo,

    pub pool_hashrate: PoolHashrates,
    pub pool_hashrate_graphs: GraphSet,
    pub network_hashrate_graphs: GraphSet,

    pub pplns_window: PplnsWindow,
    pub current_shares: CurrentShares,

    pub active: ActiveCounts,
    pub top_miners: Vec<TopMiner>,

    pub blocks: Vec<BlockRow>,
    pub blocks_count: i64,
    pub blocks_per_hour: Vec<GraphPoint>,
    pub blocks_count_by_type: BlockCounts,

    pub payments: Vec<PaymentRow>,
    pub payments_count: i64,
    pub payments_count_by_type: PaymentCounts,

    pub average_efforts: AverageEfforts,

    pub users: BTreeMap<i64, UserRecord>,

    pub users_hashrate_15m: UserMap<HashrateEntry>,
    pub users_hashrate_1hr: UserMap<HashrateEntry>,
    pub users_hashrate_6hr: UserMap<HashrateEntry>,
    pub users_hashrate_24hr: UserMap<HashrateEntry>,

    pub users_rigs: UserMap<Vec<RigEntry>>,
    pub users_balance: UserMap<BalanceEntry>,
    pub users_shares: UserMap<i64>,
}

/// Latest published snapshot; single writer, any number of readers.
///
/// The writer builds a full candidate off to the side and swaps one
/// reference, so a reader sees either the whole pre-tick snapshot or the
/// whole post-tick snapshot, never a mix.
pub struct SnapshotCache {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Current published snapshot. Cheap: clones the `Arc`, not the data.
    pub fn get(&self) -> Arc<Snapshot> {
        self.current.read().unwrap().clone()
    }

    /// Swap in a new snapshot. Only the scheduler pipeline calls this.
    pub fn publish(&self, snapshot: Snapshot) {
        let mut guard = self.current.write().unwrap();
        *guard = Arc::new(snapshot);
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: i64) -> BlockRow {
        BlockRow {
            blk_id: height,
            txid: None,
            height,
            time: 0,
            reward: 0,
            total_shares: 0,
            difficulty: 0,
            status: 1,
            miner: String::new(),
        }
    }

    #[test]
    fn test_publish_replaces_whole_snapshot() {
        let cache = SnapshotCache::new();

        let mut first = Snapshot::default();
        first.blocks = vec![block(1)];
        first.blocks_count = 1;
        cache.publish(first);

        let mut second = Snapshot::default();
        second.blocks = vec![block(2), block(1)];
        second.blocks_count = 2;
        cache.publish(second);

        let snap = cache.get();
        assert_eq!(snap.blocks.len(), 2);
        assert_eq!(snap.blocks_count, 2);
    }

    #[test]
    fn test_reader_keeps_consistent_old_view() {
        let cache = SnapshotCache::new();

        let mut first = Snapshot::default();
        first.blocks = vec![block(1)];
        first.blocks_count = 1;
        cache.publish(first);

        // A reader grabs the snapshot, then a new tick publishes.
        let held = cache.get();

        let mut second = Snapshot::default();
        second.blocks = vec![block(2), block(1)];
        second.blocks_count = 2;
        cache.publish(second);

        // The held view still agrees with itself.
        assert_eq!(held.blocks.len(), 1);
        assert_eq!(held.blocks_count, 1);
        // And fresh readers see the new consistent pair.
        let fresh = cache.get();
        assert_eq!(fresh.blocks.len() as i64, fresh.blocks_count);
    }
}
