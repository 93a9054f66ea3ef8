//! Accessor surface consumed by the transport layer.
//!
//! Everything here reads the published snapshot; only deep pages and
//! user graphs touch the store. None of it returns errors to callers —
//! failures degrade to empty payloads and get logged.

use crate::config::PayoutsInfo;
use crate::error::Result;
use crate::graphs;
use crate::pages::{self, Page};
use crate::scheduler::StatsEngine;
use crate::types::*;
use pool_store::time;
use pool_store::types::{BlockCounts, BlockRow, LedgerRow, PaymentCounts, PaymentRow};
use serde::Serialize;
use tracing::error;

/// Which series a graph request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    PoolHashrate,
    NetworkHashrate,
    UserHashrate,
}

impl GraphKind {
    /// Kind name as the frontend sends it.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pool_hashrate_graph" => Some(GraphKind::PoolHashrate),
            "network_hashrate_graph" => Some(GraphKind::NetworkHashrate),
            "user_hashrate_graph" => Some(GraphKind::UserHashrate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphData {
    pub data: Vec<GraphPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HashrateSummary {
    pub current: u64,
    pub average_1hr: u64,
    pub average_6hr: u64,
    pub average_24hr: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolInfo {
    pub hashrate: HashrateSummary,
    pub users_count: usize,
    pub active: ActiveCounts,
    pub top_miners: Vec<TopMiner>,
    pub current_shares: CurrentShares,
    pub average_efforts: AverageEfforts,
    pub blocks_recent: Vec<BlockRow>,
    pub blocks_count: BlockCounts,
    pub blocks_graph: Vec<GraphPoint>,
    pub payments_count: PaymentCounts,
    pub pplns_window: i64,
    pub pplns_window_relative: i64,
    pub payouts: PayoutsInfo,
}

/// Global stats payload, refreshed on the frontend every 30s.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub coin: String,
    pub network_info: NetworkInfo,
    pub price_info: PriceInfo,
    pub pool_info: PoolInfo,
    pub events: EventCounter,
}

/// Account info safe to hand to its owner: rig arrays and internal
/// grouping are stripped.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub uid: i64,
    pub username: String,
    pub wallet: String,
    pub diff_target: i64,
    pub payment_threshold: i64,
    pub anon_leader: bool,
    pub ban_lift_time: Vec<i64>,
    pub ban_msg: Vec<String>,
    pub is_banned: bool,
}

impl From<&UserRecord> for UserInfo {
    fn from(record: &UserRecord) -> Self {
        Self {
            uid: record.uid,
            username: record.username.clone(),
            wallet: record.wallet.clone(),
            diff_target: record.diff_target,
            payment_threshold: record.payment_threshold,
            anon_leader: record.anon_leader,
            ban_lift_time: record.ban_lift_time.clone(),
            ban_msg: record.ban_msg.clone(),
            is_banned: record.is_banned,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserHashrates {
    pub current: HashrateEntry,
    pub average_1hr: HashrateEntry,
    pub average_6hr: HashrateEntry,
    pub average_24hr: HashrateEntry,
}

/// Per-user stats payload.
#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub info: Option<UserInfo>,
    pub balances: BalanceEntry,
    pub rigs: Vec<RigEntry>,
    pub shares: i64,
    pub hashrate: UserHashrates,
}

impl StatsEngine {
    /// Global stats, straight off the published snapshot.
    pub fn get_stats(&self) -> GlobalStats {
        let snap = self.cache.get();

        GlobalStats {
            coin: self.config.coin_name.clone(),
            network_info: snap.network_info.clone(),
            price_info: snap.price_info.clone(),
            pool_info: PoolInfo {
                hashrate: HashrateSummary {
                    current: snap.pool_hashrate.m15,
                    average_1hr: snap.pool_hashrate.h1,
                    average_6hr: snap.pool_hashrate.h6,
                    average_24hr: snap.pool_hashrate.h24,
                },
                users_count: snap.users.len(),
                active: snap.active.clone(),
                top_miners: snap.top_miners.clone(),
                current_shares: snap.current_shares.clone(),
                average_efforts: snap.average_efforts.clone(),
                blocks_recent: snap.blocks.iter().take(1).cloned().collect(),
                blocks_count: snap.blocks_count_by_type.clone(),
                blocks_graph: snap.blocks_per_hour.clone(),
                payments_count: snap.payments_count_by_type.clone(),
                pplns_window: snap.pplns_window.utc,
                pplns_window_relative: snap.pplns_window.relative,
                payouts: self.config.payouts.clone(),
            },
            events: snap.event_counter.clone(),
        }
    }

    /// Per-user stats, straight off the published snapshot. Unknown uids
    /// get the pool-aggregate defaults and no account info.
    pub fn get_user_stats(&self, uid: i64) -> UserStats {
        let snap = self.cache.get();

        UserStats {
            info: snap.users.get(&uid).map(UserInfo::from),
            balances: snap.users_balance.get_or_pool(uid).clone(),
            rigs: snap.users_rigs.get_or_pool(uid).clone(),
            shares: *snap.users_shares.get_or_pool(uid),
            hashrate: UserHashrates {
                current: snap.users_hashrate_15m.get_or_pool(uid).clone(),
                average_1hr: snap.users_hashrate_1hr.get_or_pool(uid).clone(),
                average_6hr: snap.users_hashrate_6hr.get_or_pool(uid).clone(),
                average_24hr: snap.users_hashrate_24hr.get_or_pool(uid).clone(),
            },
        }
    }

    pub async fn get_blocks_page(&self, page: usize) -> Page<BlockRow> {
        let snap = self.cache.get();
        let result = pages::blocks(
            &snap,
            self.store.as_ref(),
            page,
            self.config.block_page,
            self.config.block_cache,
        )
        .await;
        unwrap_page(result, "blocks")
    }

    pub async fn get_payments_page(&self, page: usize) -> Page<PaymentRow> {
        let snap = self.cache.get();
        let result = pages::payments(
            &snap,
            self.store.as_ref(),
            page,
            self.config.payment_page,
            self.config.payment_cache,
        )
        .await;
        unwrap_page(result, "payments")
    }

    pub async fn get_credits_debits_page(&self, page: usize, uid: i64) -> Page<LedgerRow> {
        let result =
            pages::credits_debits(self.store.as_ref(), uid, page, self.config.ledger_page).await;
        unwrap_page(result, "credits/debits")
    }

    /// One named hashrate series. Pool and network graphs come from the
    /// snapshot; user graphs read the rollup store. An empty series is
    /// replaced with a flat two-point range so charts stay drawable.
    pub async fn get_hashrate_graph(
        &self,
        kind: GraphKind,
        window: GraphWindow,
        uid: Option<i64>,
    ) -> GraphData {
        let now = time::now();

        let data = match kind {
            GraphKind::PoolHashrate => self.cache.get().pool_hashrate_graphs.get(window).clone(),
            GraphKind::NetworkHashrate => {
                self.cache.get().network_hashrate_graphs.get(window).clone()
            }
            GraphKind::UserHashrate => match uid {
                None => Vec::new(),
                Some(uid) => graphs::rollup_graph(
                    self.store.as_ref(),
                    window,
                    UserKey::from_uid(uid),
                    now,
                )
                .await
                .unwrap_or_else(|e| {
                    error!("Failed to get hashrate graph for uid {}: {}", uid, e);
                    Vec::new()
                }),
            },
        };

        let data = if data.is_empty() {
            graphs::empty_graph(window, now)
        } else {
            data
        };

        GraphData { data }
    }
}

fn unwrap_page<T>(result: Result<Page<T>>, what: &str) -> Page<T> {
    result.unwrap_or_else(|e| {
        error!("Error getting {} page: {}", what, e);
        Page::empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::global::ExternalApis;
    use crate::config::Config;
    use pool_store::SqliteStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn engine() -> (TempDir, Arc<SqliteStore>, StatsEngine) {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");
        let store = Arc::new(SqliteStore::new(&db_path).await.unwrap());
        let config = Config::for_tests(db_path.display().to_string());
        let apis = ExternalApis::new(&config);
        let engine = StatsEngine::new(store.clone(), apis, config);
        (tmp, store, engine)
    }

    #[tokio::test]
    async fn test_get_stats_shape_before_first_tick() {
        let (_tmp, _store, engine) = engine().await;
        let stats = engine.get_stats();
        assert_eq!(stats.coin, "monero");
        assert_eq!(stats.pool_info.users_count, 0);
        assert!(stats.pool_info.blocks_recent.is_empty());
        // The payload serializes cleanly.
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json["pool_info"]["hashrate"]["current"].is_u64());
        assert!(json["events"]["1m"].is_u64());
    }

    #[tokio::test]
    async fn test_get_user_stats_unknown_uid_gets_pool_defaults() {
        let (_tmp, _store, engine) = engine().await;
        let stats = engine.get_user_stats(42);
        assert!(stats.info.is_none());
        assert_eq!(stats.balances.credits_pending, 0);
        assert!(stats.rigs.is_empty());
        assert_eq!(stats.shares, 0);
        assert_eq!(stats.hashrate.current.total, 0);
    }

    #[tokio::test]
    async fn test_graph_requests_never_return_empty_series() {
        let (_tmp, _store, engine) = engine().await;

        let graph = engine
            .get_hashrate_graph(GraphKind::PoolHashrate, GraphWindow::Day, None)
            .await;
        assert_eq!(graph.data.len(), 2);
        assert_eq!(graph.data[0].y, 0.0);
        assert_eq!(
            graph.data[1].t - graph.data[0].t,
            GraphWindow::Day.length()
        );

        // User graphs without a uid degrade the same way.
        let graph = engine
            .get_hashrate_graph(GraphKind::UserHashrate, GraphWindow::Month, None)
            .await;
        assert_eq!(graph.data.len(), 2);
    }

    #[test]
    fn test_graph_kind_parse() {
        assert_eq!(
            GraphKind::parse("pool_hashrate_graph"),
            Some(GraphKind::PoolHashrate)
        );
        assert_eq!(
            GraphKind::parse("network_hashrate_graph"),
            Some(GraphKind::NetworkHashrate)
        );
        assert_eq!(
            GraphKind::parse("user_hashrate_graph"),
            Some(GraphKind::UserHashrate)
        );
        assert_eq!(GraphKind::parse("other"), None);
    }
}
