//! Hybrid page reader: shallow pages from the snapshot, deep pages from
//! the store.

use crate::cache::Snapshot;
use crate::error::Result;
use pool_store::types::{BlockRow, LedgerRow, PaymentRow};
use pool_store::PoolStore;
use serde::Serialize;

/// One page of records plus the total the pager renders against.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            total: 0,
        }
    }
}

fn cache_slice<T: Clone>(cached: &[T], page: usize, page_size: usize, total: i64) -> Page<T> {
    Page {
        data: cached
            .iter()
            .skip(page * page_size)
            .take(page_size)
            .cloned()
            .collect(),
        total,
    }
}

/// Whether a page lies entirely inside the cached depth.
fn cache_served(page: usize, page_size: usize, cache_depth: usize) -> bool {
    (page + 1) * page_size <= cache_depth
}

pub async fn blocks(
    snapshot: &Snapshot,
    store: &dyn PoolStore,
    page: usize,
    page_size: usize,
    cache_depth: usize,
) -> Result<Page<BlockRow>> {
    if cache_served(page, page_size, cache_depth) {
        return Ok(cache_slice(
            &snapshot.blocks,
            page,
            page_size,
            snapshot.blocks_count,
        ));
    }

    let (data, total) = store
        .blocks_page(page_size as i64, (page * page_size) as i64)
        .await?;
    Ok(Page { data, total })
}

pub async fn payments(
    snapshot: &Snapshot,
    store: &dyn PoolStore,
    page: usize,
    page_size: usize,
    cache_depth: usize,
) -> Result<Page<PaymentRow>> {
    if cache_served(page, page_size, cache_depth) {
        return Ok(cache_slice(
            &snapshot.payments,
            page,
            page_size,
            snapshot.payments_count,
        ));
    }

    let (data, total) = store
        .payments_page(page_size as i64, (page * page_size) as i64)
        .await?;
    Ok(Page { data, total })
}

/// Per-user merged credits/debits ledger. Never cached: the merge is
/// per-user and the running balance comes from the store.
pub async fn credits_debits(
    store: &dyn PoolStore,
    uid: i64,
    page: usize,
    page_size: usize,
) -> Result<Page<LedgerRow>> {
    let (data, total) = store
        .ledger_entries(uid, page_size as i64, (page * page_size) as i64)
        .await?;
    Ok(Page { data, total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_store::SqliteStore;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, SqliteStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (temp_dir, store)
    }

    fn cached_block(height: i64) -> BlockRow {
        BlockRow {
            blk_id: height,
            txid: None,
            height,
            time: 0,
            reward: 0,
            total_shares: 0,
            difficulty: 0,
            status: 1,
            miner: "cached".to_string(),
        }
    }

    #[tokio::test]
    async fn test_blocks_page_boundary() {
        let (_tmp, store) = open_store().await;
        // 310 blocks in the store, the newest 300 mirrored in the cache.
        for height in 1..=310 {
            sqlx::query("INSERT INTO mined_blocks (blk_id, height, time, status) VALUES (?, ?, ?, 1)")
                .bind(height)
                .bind(height)
                .bind(height * 10)
                .execute(store.pool())
                .await
                .unwrap();
        }

        let mut snapshot = Snapshot::default();
        snapshot.blocks = (0..300).map(|i| cached_block(310 - i)).collect();
        snapshot.blocks_count = 310;

        // Page 19 (records 285..300) fits in the cache.
        let page = blocks(&snapshot, &store, 19, 15, 300).await.unwrap();
        assert_eq!(page.total, 310);
        assert_eq!(page.data.len(), 15);
        assert!(page.data.iter().all(|b| b.miner == "cached"));
        assert_eq!(page.data[0].height, 25);

        // Page 20 (records 300..315) goes to the store.
        let page = blocks(&snapshot, &store, 20, 15, 300).await.unwrap();
        assert_eq!(page.total, 310);
        assert_eq!(page.data.len(), 10);
        assert!(page.data.iter().all(|b| b.miner != "cached"));
        assert_eq!(page.data[0].height, 10);
    }

    #[tokio::test]
    async fn test_payments_page_cache_slice() {
        let (_tmp, store) = open_store().await;
        let mut snapshot = Snapshot::default();
        snapshot.payments = (0..30)
            .map(|i| PaymentRow {
                payment_number: 30 - i,
                txid: format!("tx{}", i),
                status: 1,
                paid: 0,
                fee: 0,
                payees: 1,
                time: 0,
            })
            .collect();
        snapshot.payments_count = 30;

        let page = payments(&snapshot, &store, 1, 15, 300).await.unwrap();
        assert_eq!(page.data.len(), 15);
        assert_eq!(page.data[0].txid, "tx15");
        assert_eq!(page.total, 30);
    }

    #[tokio::test]
    async fn test_ledger_always_queries_store() {
        let (_tmp, store) = open_store().await;
        sqlx::query(
            "INSERT INTO credits (uid, blk_id, amount_reward, time, status) VALUES (1, 5, 100, 10, 1)",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let page = credits_debits(&store, 1, 0, 15).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].amount, 100);
        // Another user's ledger is empty.
        let page = credits_debits(&store, 2, 0, 15).await.unwrap();
        assert_eq!(page.total, 0);
    }
}
