//! Tiered collection scheduler.
//!
//! A 1-second loop drives tick(); real collection happens at most once
//! per 30-second bucket, with the 1m/5m/1hr tiers firing when their
//! buckets roll over. Tiers run sequentially and each successful tier
//! publishes a fresh snapshot.

use crate::cache::{Snapshot, SnapshotCache};
use crate::collectors::global::{self, ExternalApis};
use crate::collectors::{or_cached, users};
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::graphs;
use crate::types::{GraphWindow, UserKey};
use pool_store::time;
use pool_store::types::Resolution;
use pool_store::PoolStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info};

/// Scratch state owned by the collection pipeline. Readers never see it;
/// they get whole published copies.
struct Working {
    snap: Snapshot,
    last_network_height: i64,
    last_payoutd_height: i64,
}

/// The collection/aggregation engine: store, external APIs, snapshot
/// cache and the working state the tiers mutate.
pub struct StatsEngine {
    pub(crate) store: Arc<dyn PoolStore>,
    pub(crate) apis: ExternalApis,
    pub(crate) config: Config,
    pub(crate) cache: SnapshotCache,
    writer: Mutex<Working>,
}

impl StatsEngine {
    pub fn new(store: Arc<dyn PoolStore>, apis: ExternalApis, config: Config) -> Self {
        let mut snap = Snapshot::default();
        snap.price_info.insert("BTC".to_string(), 0.0);

        Self {
            store,
            apis,
            config,
            cache: SnapshotCache::new(),
            writer: Mutex::new(Working {
                snap,
                last_network_height: 0,
                last_payoutd_height: 0,
            }),
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.cache.get()
    }

    /// Run the tiers due at `now`. Holds the writer lock for the whole
    /// tick so out-of-band refreshes cannot interleave.
    pub(crate) async fn collect(&self, now: i64, last_run: i64, first_run: bool) -> Result<()> {
        let mut w = self.writer.lock().await;

        self.run_30s(&mut w, now, first_run).await?;
        self.cache.publish(w.snap.clone());

        if first_run || now / 60 != last_run / 60 {
            info!("Collecting 1 min stats...");
            self.run_1m(&mut w).await?;
            self.cache.publish(w.snap.clone());
        }

        if first_run || now / 300 != last_run / 300 {
            info!("Collecting 5 min stats...");
            self.run_5m(&mut w, now).await?;
            self.cache.publish(w.snap.clone());
        }

        if first_run || now / 3600 != last_run / 3600 {
            info!("Collecting 1 hour stats...");
            self.run_1hr(&mut w, now).await?;
            self.cache.publish(w.snap.clone());
        }

        self.run_after(&mut w).await?;

        Ok(())
    }

    async fn run_30s(&self, w: &mut Working, now: i64, first_run: bool) -> Result<()> {
        let store = self.store.as_ref();

        // Check if the network or the payout daemon saw a new block.
        let network_info = global::network_info(
            store,
            &self.apis,
            self.config.difficulty_target,
            &w.snap.network_info,
        )
        .await;
        w.snap.network_info = network_info;
        w.snap.payoutd_info = global::payoutd_info(store).await;

        let mut seen_network_block = w.snap.network_info.height > w.last_network_height;
        if seen_network_block {
            w.last_network_height = w.snap.network_info.height;
        }
        let mut seen_payoutd_block = w.snap.payoutd_info.height > w.last_payoutd_height;
        if seen_payoutd_block {
            w.last_payoutd_height = w.snap.payoutd_info.height;
        }
        if first_run {
            seen_network_block = true;
            seen_payoutd_block = true;
        }

        w.snap.event_counter.block = w.last_network_height.max(w.last_payoutd_height);

        // The user directory is replaced every 30s because of ban status
        // updates; serving with an empty directory is worse than dying.
        match users::user_directory(store, now).await {
            Ok(directory) => w.snap.users = directory,
            Err(e) => {
                if w.snap.users.is_empty() {
                    return Err(EngineError::Fatal(format!(
                        "error getting users from store: {}",
                        e
                    )));
                }
                error!("Error getting users from store: {}", e);
            }
        }

        let res = global::pool_hashrate(store, 15 * 60).await;
        or_cached(&mut w.snap.pool_hashrate.m15, "pool hashrate 15m", res);
        let res = global::pool_hashrate(store, 60 * 60).await;
        or_cached(&mut w.snap.pool_hashrate.h1, "pool hashrate 1hr", res);
        let res = global::pool_hashrate(store, 6 * 60 * 60).await;
        or_cached(&mut w.snap.pool_hashrate.h6, "pool hashrate 6hr", res);
        let res = global::pool_hashrate(store, 24 * 60 * 60).await;
        or_cached(&mut w.snap.pool_hashrate.h24, "pool hashrate 24hr", res);

        let res = users::hashrates(store, 15 * 60).await;
        or_cached(&mut w.snap.users_hashrate_15m, "user hashrates 15m", res);
        let res = users::hashrates(store, 60 * 60).await;
        or_cached(&mut w.snap.users_hashrate_1hr, "user hashrates 1hr", res);
        let res = users::hashrates(store, 6 * 60 * 60).await;
        or_cached(&mut w.snap.users_hashrate_6hr, "user hashrates 6hr", res);
        let res = users::hashrates(store, 24 * 60 * 60).await;
        or_cached(&mut w.snap.users_hashrate_24hr, "user hashrates 24hr", res);

        match users::rigs(store, now).await {
            Ok((active, users_rigs)) => {
                w.snap.active = active;
                w.snap.users_rigs = users_rigs;
            }
            Err(e) => error!("Error collecting user rigs: {}", e),
        }

        w.snap.top_miners = users::top_miners(
            &w.snap.users,
            &w.snap.users_rigs,
            &w.snap.users_hashrate_15m,
            self.config.top_miners,
        );

        // The block cache only moves when one of the daemons saw a block.
        if seen_network_block || seen_payoutd_block {
            if !self.config.secondary {
                match store.generate_total_shares().await {
                    Ok(updated) => info!("Generated total shares for {} blocks", updated),
                    Err(e) => error!("Failed to generate total shares: {}", e),
                }
            }
            match store.blocks_page(self.config.block_cache as i64, 0).await {
                Ok((blocks, total)) => {
                    w.snap.blocks = blocks;
                    w.snap.blocks_count = total;
                }
                Err(e) => error!("Error getting blocks: {}", e),
            }
            let res = global::blocks_count(store).await;
            or_cached(&mut w.snap.blocks_count_by_type, "blocks count", res);
            let res = global::payments_count(store).await;
            or_cached(&mut w.snap.payments_count_by_type, "payments count", res);
            let res = graphs::blocks_per_hour(store, now).await;
            or_cached(&mut w.snap.blocks_per_hour, "blocks per hour", res);
        }

        // Balances and payments only change when payoutd advances.
        if seen_payoutd_block {
            match store.payments_page(self.config.payment_cache as i64, 0).await {
                Ok((payments, total)) => {
                    w.snap.payments = payments;
                    w.snap.payments_count = total;
                }
                Err(e) => error!("Error getting payments: {}", e),
            }
            let res = users::balances(store).await;
            or_cached(&mut w.snap.users_balance, "user balances", res);
        }

        let res = global::pplns_window(store, w.snap.network_info.difficulty, now).await;
        or_cached(&mut w.snap.pplns_window, "pplns window", res);

        let res = global::total_shares_since(store, w.snap.pplns_window.utc).await;
        or_cached(&mut w.snap.current_shares.pplns, "pplns shares", res);

        let res = users::shares_since(store, w.snap.pplns_window.utc).await;
        or_cached(&mut w.snap.users_shares, "user shares", res);

        let last_block_time = w.snap.blocks.first().map(|block| block.time).unwrap_or(0);
        let res = global::total_shares_since(store, last_block_time).await;
        or_cached(&mut w.snap.current_shares.block, "current block shares", res);

        let res = global::average_efforts(store).await;
        or_cached(&mut w.snap.average_efforts, "average efforts", res);

        Ok(())
    }

    async fn run_1m(&self, w: &mut Working) -> Result<()> {
        w.snap.event_counter.one_min = w.snap.event_counter.one_min.wrapping_add(1);
        Ok(())
    }

    async fn run_5m(&self, w: &mut Working, now: i64) -> Result<()> {
        let store = self.store.as_ref();
        w.snap.event_counter.five_min = w.snap.event_counter.five_min.wrapping_add(1);

        if !self.config.secondary {
            if let Err(e) = graphs::generate(store, Resolution::FiveMin).await {
                error!("Failed to generate 5m hashrate graphs: {}", e);
            }
        }

        let res = graphs::rollup_graph(store, GraphWindow::Day, UserKey::Pool, now).await;
        or_cached(
            &mut w.snap.pool_hashrate_graphs.day,
            "24hr pool hashrate graph",
            res,
        );
        let res = graphs::network_graph_day(store, self.config.difficulty_target, now).await;
        or_cached(
            &mut w.snap.network_hashrate_graphs.day,
            "24hr network hashrate graph",
            res,
        );

        Ok(())
    }

    async fn run_1hr(&self, w: &mut Working, now: i64) -> Result<()> {
        let store = self.store.as_ref();
        w.snap.event_counter.one_hr = w.snap.event_counter.one_hr.wrapping_add(1);

        if !self.config.secondary {
            if let Err(e) = graphs::generate(store, Resolution::OneHour).await {
                error!("Failed to generate 1hr hashrate graphs: {}", e);
            }
        }

        for window in [GraphWindow::Week, GraphWindow::Month] {
            let what = match window {
                GraphWindow::Week => ("7d pool hashrate graph", "7d network hashrate graph"),
                _ => ("30d pool hashrate graph", "30d network hashrate graph"),
            };

            let res = graphs::rollup_graph(store, window, UserKey::Pool, now).await;
            match window {
                GraphWindow::Week => or_cached(&mut w.snap.pool_hashrate_graphs.week, what.0, res),
                _ => or_cached(&mut w.snap.pool_hashrate_graphs.month, what.0, res),
            }

            let res =
                graphs::network_graph_decimated(store, window, self.config.difficulty_target, now)
                    .await;
            match window {
                GraphWindow::Week => {
                    or_cached(&mut w.snap.network_hashrate_graphs.week, what.1, res)
                }
                _ => or_cached(&mut w.snap.network_hashrate_graphs.month, what.1, res),
            }
        }

        let res = self.apis.price().await;
        or_cached(&mut w.snap.price_info, "price info", res);

        Ok(())
    }

    async fn run_after(&self, _w: &mut Working) -> Result<()> {
        // Nothing to do yet; the hook exists so tick completion has a
        // single point to extend.
        Ok(())
    }

    /// Out-of-band user directory refresh, called after external
    /// mutations such as a registration. Serialized against ticks by the
    /// writer lock.
    pub async fn refresh_users(&self) {
        let mut w = self.writer.lock().await;
        match users::user_directory(self.store.as_ref(), time::now()).await {
            Ok(directory) => {
                w.snap.users = directory;
                self.cache.publish(w.snap.clone());
            }
            Err(e) => error!("Error refreshing user directory: {}", e),
        }
    }
}

/// The 1-second driver around [`StatsEngine::collect`].
pub struct Scheduler {
    engine: Arc<StatsEngine>,
    last_run: i64,
    first_run: bool,
}

impl Scheduler {
    pub fn new(engine: Arc<StatsEngine>) -> Self {
        Self {
            engine,
            last_run: 0,
            first_run: true,
        }
    }

    /// One wake-up. No-ops unless the 30-second bucket changed since the
    /// last completed tick, which also guarantees ticks never overlap.
    pub async fn tick(&mut self, now: i64) -> Result<()> {
        if now / 30 == self.last_run / 30 {
            return Ok(());
        }

        info!("Collecting stats...");
        let started = Instant::now();

        match self
            .engine
            .collect(now, self.last_run, self.first_run)
            .await
        {
            Ok(()) => {
                // Cleared only after the whole tick, including the after
                // hook, so a failed cold start retries in full.
                self.first_run = false;
                info!(
                    "Finished collecting stats... Took {} ms",
                    started.elapsed().as_millis()
                );
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => error!("Error collecting stats... {}", e),
        }

        self.last_run = now;
        Ok(())
    }

    /// Run forever; only a fatal startup condition returns.
    pub async fn run(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            self.tick(time::now()).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_store::SqliteStore;
    use tempfile::TempDir;

    async fn empty_engine() -> (TempDir, Arc<SqliteStore>, Arc<StatsEngine>) {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");
        let store = Arc::new(SqliteStore::new(&db_path).await.unwrap());
        let config = Config::for_tests(db_path.display().to_string());
        let apis = ExternalApis::new(&config);
        let engine = Arc::new(StatsEngine::new(store.clone(), apis, config));
        (tmp, store, engine)
    }

    async fn engine_with_user() -> (TempDir, Arc<SqliteStore>, Arc<StatsEngine>) {
        let (tmp, store, engine) = empty_engine().await;
        sqlx::query("INSERT INTO users (uid, username) VALUES (1, 'alice')")
            .execute(store.pool())
            .await
            .unwrap();
        (tmp, store, engine)
    }

    #[tokio::test]
    async fn test_first_tick_runs_all_tiers() {
        let (_tmp, _store, engine) = engine_with_user().await;
        let mut scheduler = Scheduler::new(engine.clone());

        scheduler.tick(35).await.unwrap();

        let snap = engine.snapshot();
        assert_eq!(snap.event_counter.one_min, 1);
        assert_eq!(snap.event_counter.five_min, 1);
        assert_eq!(snap.event_counter.one_hr, 1);
        assert_eq!(snap.users.len(), 1);
        // Sentinel integrity across the per-user maps.
        assert!(snap.users_hashrate_15m.contains(UserKey::Pool));
        assert!(snap.users_rigs.contains(UserKey::Pool));
        assert!(snap.users_balance.contains(UserKey::Pool));
        assert!(snap.users_shares.contains(UserKey::Pool));
    }

    #[tokio::test]
    async fn test_same_bucket_is_noop() {
        let (_tmp, _store, engine) = engine_with_user().await;
        let mut scheduler = Scheduler::new(engine.clone());

        scheduler.tick(35).await.unwrap();
        scheduler.tick(36).await.unwrap();

        let snap = engine.snapshot();
        assert_eq!(snap.event_counter.one_min, 1);
    }

    #[tokio::test]
    async fn test_tiers_follow_their_buckets() {
        let (_tmp, _store, engine) = engine_with_user().await;
        let mut scheduler = Scheduler::new(engine.clone());

        scheduler.tick(35).await.unwrap();
        // New 30s and 60s buckets, same 300s bucket.
        scheduler.tick(65).await.unwrap();

        let snap = engine.snapshot();
        assert_eq!(snap.event_counter.one_min, 2);
        assert_eq!(snap.event_counter.five_min, 1);
        assert_eq!(snap.event_counter.one_hr, 1);
    }

    #[tokio::test]
    async fn test_empty_user_directory_is_fatal_on_cold_start() {
        let (_tmp, store, engine) = empty_engine().await;
        // No users table at all makes the directory query itself fail.
        sqlx::query("DROP TABLE users")
            .execute(store.pool())
            .await
            .unwrap();

        let mut scheduler = Scheduler::new(engine);
        let result = scheduler.tick(35).await;
        assert!(matches!(result, Err(EngineError::Fatal(_))));
    }

    #[tokio::test]
    async fn test_refresh_users_publishes_immediately() {
        let (_tmp, store, engine) = engine_with_user().await;
        let mut scheduler = Scheduler::new(engine.clone());
        scheduler.tick(35).await.unwrap();

        sqlx::query("INSERT INTO users (uid, username) VALUES (2, 'bob')")
            .execute(store.pool())
            .await
            .unwrap();
        engine.refresh_users().await;

        let snap = engine.snapshot();
        assert_eq!(snap.users.len(), 2);
        assert!(snap.users.contains_key(&2));
    }
}
