//! Network-wide and pool-wide metric collectors.

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::types::{AverageEfforts, Effort, NetworkInfo, PayoutdInfo, PplnsWindow, PriceInfo};
use futures::TryStreamExt;
use pool_store::time;
use pool_store::types::{BlockCounts, PaymentCounts};
use pool_store::PoolStore;
use serde::Deserialize;
use std::time::Duration;
use tracing::error;

/// Round to two decimals, the precision the frontend renders.
pub fn round2(value: f64) -> f64 {
    (100.0 * value).round() / 100.0
}

/// Share rate over a window: accumulated count divided by the observed
/// span. Fewer than two distinct sample points means no measurable span,
/// so the rate is zero.
pub fn window_rate(tstart: Option<i64>, tsample: i64, count: i64) -> u64 {
    match tstart {
        Some(tstart) if tstart != tsample => {
            (count as f64 / (tsample - tstart) as f64).round() as u64
        }
        _ => 0,
    }
}

/// Clients for the read-only HTTP services the collectors fall back to.
pub struct ExternalApis {
    client: reqwest::Client,
    explorer_url: String,
    price_url: String,
}

#[derive(Debug, Deserialize)]
struct ExplorerStats {
    difficulty: i64,
    height: i64,
    hashrate: f64,
    last_timestamp: i64,
    last_reward: i64,
}

impl ExternalApis {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(1)
            .build()
            .unwrap_or_default();

        let price_url = format!(
            "https://min-api.cryptocompare.com/data/price?fsym={}&tsyms={}&api_key={}",
            config.coin_symbol,
            config.currencies.join(","),
            config.price_api_key
        );

        Self {
            client,
            explorer_url: config.explorer_url.clone(),
            price_url,
        }
    }

    /// Explorer-style network stats, the backup source for network info.
    pub async fn explorer_stats(&self) -> Result<NetworkInfo> {
        let url = format!("{}/api/get_stats", self.explorer_url);
        let stats: ExplorerStats = self.client.get(&url).send().await?.json().await?;

        Ok(NetworkInfo {
            difficulty: stats.difficulty,
            height: stats.height,
            hashrate: stats.hashrate,
            last_timestamp: stats.last_timestamp,
            last_reward: stats.last_reward,
        })
    }

    /// Market quotes for the configured currencies.
    pub async fn price(&self) -> Result<PriceInfo> {
        let body: serde_json::Value = self.client.get(&self.price_url).send().await?.json().await?;

        if body.get("Response").and_then(|v| v.as_str()) == Some("Error") {
            return Err(EngineError::Api(
                body.get("Message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("price API error")
                    .to_string(),
            ));
        }

        let mut prices = PriceInfo::new();
        if let Some(map) = body.as_object() {
            for (currency, value) in map {
                if let Some(price) = value.as_f64() {
                    prices.insert(currency.clone(), price);
                }
            }
        }
        Ok(prices)
    }
}

/// Latest network state: block ledger first, explorer second, last good
/// value third. Never errors past this boundary.
pub async fn network_info(
    store: &dyn PoolStore,
    apis: &ExternalApis,
    difficulty_target: i64,
    cached: &NetworkInfo,
) -> NetworkInfo {
    match store.latest_network_block().await {
        Ok(block) => NetworkInfo {
            difficulty: block.difficulty,
            height: block.height,
            hashrate: round2(block.difficulty as f64 / difficulty_target as f64),
            last_timestamp: time::db_to_wall(block.time),
            last_reward: block.reward_total,
        },
        Err(e) => {
            error!("Error getting network info from store: {}", e);
            match apis.explorer_stats().await {
                Ok(info) => info,
                Err(e) => {
                    error!("Error getting network info from explorer: {}", e);
                    cached.clone()
                }
            }
        }
    }
}

/// Payout daemon scan height; zeros when the table is missing data.
pub async fn payoutd_info(store: &dyn PoolStore) -> PayoutdInfo {
    match store.latest_scan_height().await {
        Ok(row) => PayoutdInfo {
            height: row.height,
            time: time::db_to_wall(row.time),
        },
        Err(e) => {
            error!("Error getting payoutd info: {}", e);
            PayoutdInfo::default()
        }
    }
}

/// Pool share rate over the trailing `duration` seconds.
pub async fn pool_hashrate(store: &dyn PoolStore, duration: i64) -> Result<u64> {
    let tsample = time::wall_to_db(time::now());
    let window = store.shares_in_window(tsample, duration).await?;
    Ok(window_rate(window.tstart, tsample, window.count))
}

/// Start of the current payout window for the given difficulty.
///
/// Walks shares newest-first accumulating counts; the cutoff is the time
/// of the last share seen before the running sum reaches `2 * diff`. The
/// stream stops there, so the cost is proportional to the window size.
pub async fn pplns_window(store: &dyn PoolStore, diff: i64, now: i64) -> Result<PplnsWindow> {
    let window = diff * 2;
    let mut shares = store.shares_cumulative_desc();

    let mut running = 0;
    let mut cutoff = 0;
    while let Some(tick) = shares.try_next().await? {
        if running + tick.count >= window {
            break;
        }
        running += tick.count;
        cutoff = tick.time;
    }

    let utc = time::db_to_wall(cutoff);
    Ok(PplnsWindow {
        utc,
        relative: now - utc,
    })
}

/// Pool-wide share count since a wall-clock cutoff.
pub async fn total_shares_since(store: &dyn PoolStore, cutoff: i64) -> Result<i64> {
    Ok(store.total_shares_since(time::wall_to_db(cutoff)).await?)
}

/// Average efforts over the last-100 / last-1000 / all-blocks windows.
pub async fn average_efforts(store: &dyn PoolStore) -> Result<AverageEfforts> {
    let mut efforts = AverageEfforts::default();
    for row in store.average_efforts().await? {
        let effort = Effort {
            total_shares: row.total_shares,
            difficulty: row.difficulty,
        };
        match row.size {
            0 => efforts.all = effort,
            100 => efforts.last_100 = effort,
            1000 => efforts.last_1000 = effort,
            _ => {}
        }
    }
    Ok(efforts)
}

pub async fn blocks_count(store: &dyn PoolStore) -> Result<BlockCounts> {
    Ok(store.blocks_count().await?)
}

pub async fn payments_count(store: &dyn PoolStore) -> Result<PaymentCounts> {
    Ok(store.payments_count().await?)
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

    #[test]
    fn test_window_rate_formula() {
        // 3600 shares observed over one hour is one share per second.
        assert_eq!(window_rate(Some(1_000), 4_600, 3_600), 1);
        // A single sample point has no measurable span.
        assert_eq!(window_rate(Some(4_600), 4_600, 3_600), 0);
        assert_eq!(window_rate(None, 4_600, 0), 0);
    }

    #[test]
    fn test_round2_difficulty_to_hashrate() {
        assert_eq!(round2(2_000_000.0 / 4_000.0), 500.0);
        assert_eq!(round2(1.0 / 3.0), 0.33);
    }

    #[tokio::test]
    async fn test_pplns_cutoff_boundary() {
        let (_tmp, store) = open_store().await;
        // Newest-first cumulative counts: 500k@300, 300k@200, 400k@100.
        for (time, count) in [(100, 400_000i64), (200, 300_000), (300, 500_000)] {
            sqlx_insert_share(&store, time, count).await;
        }

        // window = 1.2M. The sum reaches exactly the window at the share
        // at t=100, so the window starts at the share before it.
        let window = pplns_window(&store, 600_000, time::db_to_wall(400))
            .await
            .unwrap();
        assert_eq!(window.utc, time::db_to_wall(200));
        assert_eq!(window.relative, 200);
    }

    #[tokio::test]
    async fn test_pplns_cutoff_mid_stream() {
        let (_tmp, store) = open_store().await;
        for (time, count) in [(100, 400_000i64), (200, 300_000), (300, 500_000)] {
            sqlx_insert_share(&store, time, count).await;
        }

        // window = 700k: crossed while adding the share at t=200.
        let window = pplns_window(&store, 350_000, time::db_to_wall(400))
            .await
            .unwrap();
        assert_eq!(window.utc, time::db_to_wall(300));
    }

    #[tokio::test]
    async fn test_pplns_cutoff_exhausted_stream() {
        let (_tmp, store) = open_store().await;
        sqlx_insert_share(&store, 100, 10).await;

        // The window is never filled: the cutoff is the oldest share.
        let window = pplns_window(&store, 1_000_000, time::db_to_wall(400))
            .await
            .unwrap();
        assert_eq!(window.utc, time::db_to_wall(100));
    }

    #[tokio::test]
    async fn test_network_info_degrades_to_cached() {
        let (_tmp, store) = open_store().await;
        let apis = ExternalApis::new(&Config::for_tests(String::new()));
        let cached = NetworkInfo {
            difficulty: 42,
            height: 7,
            hashrate: 0.35,
            last_timestamp: 1,
            last_reward: 2,
        };

        // Empty store, unreachable explorer: the cached value survives.
        let info = network_info(&store, &apis, 120, &cached).await;
        assert_eq!(info.difficulty, 42);
        assert_eq!(info.height, 7);
    }

    async fn sqlx_insert_share(store: &SqliteStore, time: i64, count: i64) {
        sqlx::query("INSERT INTO valid_shares (uid, rid, count, time) VALUES (1, 1, ?, ?)")
            .bind(count)
            .bind(time)
            .execute(store.pool())
            .await
            .unwrap();
    }
}
