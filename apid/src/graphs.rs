//! Hashrate graph generation and serving.
//!
//! Pool and user graphs come from the persisted rollup tables; network
//! graphs read the raw network block ledger directly.

use crate::collectors::global::round2;
use crate::error::Result;
use crate::types::{GraphPoint, GraphWindow, UserKey};
use pool_store::time;
use pool_store::types::Resolution;
use pool_store::PoolStore;
use std::collections::BTreeMap;
use tracing::info;

/// Advance a rollup table over all shares newer than its last sample.
///
/// The bounds are rounded inward to whole sample intervals, so re-running
/// with no new shares finds an empty range and inserts nothing.
pub async fn generate(store: &dyn PoolStore, res: Resolution) -> Result<()> {
    let Some((min, max)) = store.fresh_share_bounds(res).await? else {
        return Ok(());
    };

    let interval = res.interval();
    // Round min up an interval and max down an interval.
    let start = min - min % interval + interval;
    let end = max - max % interval;

    if end < start {
        return Ok(());
    }

    let inserted = store.insert_rollup_points(res, start, end).await?;
    info!(
        "Generated {} rollup points at {}s resolution for period {} - {}",
        inserted, interval, start, end
    );

    Ok(())
}

/// Serve a rollup-backed series for one window and one uid (the pool
/// bucket for pool graphs). Missing buckets become `{t, y: 0}`; buckets
/// past the newest persisted sample are not fabricated.
pub async fn rollup_graph(
    store: &dyn PoolStore,
    window: GraphWindow,
    key: UserKey,
    now: i64,
) -> Result<Vec<GraphPoint>> {
    let end_wall = window.floor_end(now);
    let start_wall = end_wall - window.length();

    let res = window.resolution();
    let interval = res.interval();
    let start = time::wall_to_db(start_wall);
    let end = time::wall_to_db(end_wall);

    let Some(last_sample) = store.last_rollup_tsample(res).await? else {
        return Ok(Vec::new());
    };
    let cap = end.min(last_sample);
    if cap < start {
        return Ok(Vec::new());
    }

    let series = store.rollup_series(res, start, cap, key.as_i64()).await?;
    let by_sample: BTreeMap<i64, f64> = series
        .into_iter()
        .map(|point| (point.tsample, point.rate))
        .collect();

    let mut data = Vec::new();
    let mut t = start;
    while t <= cap {
        data.push(GraphPoint {
            t: time::db_to_wall(t),
            y: by_sample.get(&t).copied().unwrap_or(0.0),
        });
        t += interval;
    }

    Ok(data)
}

/// Network hashrate over the last 24 hours, one point per block.
///
/// Walks the ledger newest-first following `prev_id` so orphaned tips
/// drop out, then returns the points oldest-first.
pub async fn network_graph_day(
    store: &dyn PoolStore,
    difficulty_target: i64,
    now: i64,
) -> Result<Vec<GraphPoint>> {
    let since = time::wall_to_db(now) - GraphWindow::Day.length();
    let rows = store.network_blocks_since(since).await?;

    let mut data = Vec::new();
    let mut prev_id: Option<String> = None;
    for row in rows {
        match &prev_id {
            Some(expected) if *expected != row.blkid => continue,
            _ => {}
        }
        prev_id = Some(row.prev_id.clone());
        data.push(GraphPoint {
            t: time::db_to_wall(row.time),
            y: round2(row.difficulty as f64 / difficulty_target as f64),
        });
    }

    data.reverse();
    Ok(data)
}

/// Network hashrate over 7 or 30 days, decimated by block height so the
/// payload stays bounded.
pub async fn network_graph_decimated(
    store: &dyn PoolStore,
    window: GraphWindow,
    difficulty_target: i64,
    now: i64,
) -> Result<Vec<GraphPoint>> {
    let step = match window {
        GraphWindow::Week => 7,
        GraphWindow::Month => 30,
        GraphWindow::Day => return network_graph_day(store, difficulty_target, now).await,
    };

    let since = time::wall_to_db(now) - window.length();
    let rows = store.network_blocks_decimated(since, step).await?;

    Ok(rows
        .into_iter()
        .map(|row| GraphPoint {
            t: time::db_to_wall(row.time),
            y: round2(row.difficulty as f64 / difficulty_target as f64),
        })
        .collect())
}

/// Matured blocks per hour over the last 31 days.
pub async fn blocks_per_hour(store: &dyn PoolStore, now: i64) -> Result<Vec<GraphPoint>> {
    let since = time::wall_to_db(now - 31 * 24 * 60 * 60);
    let rows = store.blocks_per_hour(since).await?;

    Ok(rows
        .into_iter()
        .map(|row| GraphPoint {
            t: row.hour,
            y: row.count as f64,
        })
        .collect())
}

/// Two-point flat series substituted when a graph has no data, so charts
/// always have a drawable range.
pub fn empty_graph(window: GraphWindow, now: i64) -> Vec<GraphPoint> {
    let end = window.floor_end(now);
    let start = end - window.length();
    vec![GraphPoint { t: start, y: 0.0 }, GraphPoint { t: end, y: 0.0 }]
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

    async fn insert_network_block(
        store: &SqliteStore,
        blkid: &str,
        prev_id: &str,
        height: i64,
        difficulty: i64,
        time: i64,
    ) {
        sqlx::query(
            "INSERT INTO network_blocks (blkid, prev_id, height, difficulty, time) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(blkid)
        .bind(prev_id)
        .bind(height)
        .bind(difficulty)
        .bind(time)
        .execute(store.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_generate_noop_without_new_shares() {
        let (_tmp, store) = open_store().await;
        for i in 0..12 {
            sqlx::query("INSERT INTO valid_shares (uid, rid, count, time) VALUES (1, 1, 50, ?)")
                .bind(600 + i * 60)
                .execute(store.pool())
                .await
                .unwrap();
        }

        generate(&store, Resolution::FiveMin).await.unwrap();
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM hashrate_5min")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(count.0 > 0);

        // Nothing new: the table must not grow.
        generate(&store, Resolution::FiveMin).await.unwrap();
        let again: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM hashrate_5min")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(again.0, count.0);
    }

    #[tokio::test]
    async fn test_rollup_graph_fills_missing_buckets() {
        let (_tmp, store) = open_store().await;
        // Samples at t=300 and t=1200; 600 and 900 are holes.
        for tsample in [300i64, 1_200] {
            sqlx::query(
                "INSERT INTO hashrate_5min (uid, rid, count, tsample, tstart, tend) \
                 VALUES (-1, 0, 600, ?, ?, ?)",
            )
            .bind(tsample)
            .bind(tsample - 300)
            .bind(tsample)
            .execute(store.pool())
            .await
            .unwrap();
        }

        // A day window ending right at the newest sample.
        let now = time::db_to_wall(1_200);
        let data = rollup_graph(&store, GraphWindow::Day, UserKey::Pool, now)
            .await
            .unwrap();

        // Buckets run from start to the newest persisted sample.
        assert_eq!(data.len(), (24 * 60 * 60 / 300) + 1);
        let t300 = data
            .iter()
            .find(|p| p.t == time::db_to_wall(300))
            .unwrap();
        assert!((t300.y - 2.0).abs() < f64::EPSILON);
        let t600 = data
            .iter()
            .find(|p| p.t == time::db_to_wall(600))
            .unwrap();
        assert_eq!(t600.y, 0.0);
        assert_eq!(data.last().unwrap().t, time::db_to_wall(1_200));
    }

    #[tokio::test]
    async fn test_rollup_graph_empty_without_samples() {
        let (_tmp, store) = open_store().await;
        let data = rollup_graph(&store, GraphWindow::Day, UserKey::Pool, time::now())
            .await
            .unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_network_graph_day_skips_orphans() {
        let (_tmp, store) = open_store().await;
        let now = time::db_to_wall(5_000);
        insert_network_block(&store, "a", "", 1, 1_200, 1_000).await;
        insert_network_block(&store, "b", "a", 2, 1_200, 2_000).await;
        // Orphaned tip at height 3, not referenced by the chain head.
        insert_network_block(&store, "x", "b", 3, 9_999, 2_500).await;
        insert_network_block(&store, "c", "b", 4, 1_200, 3_000).await;

        let data = network_graph_day(&store, 120, now).await.unwrap();
        assert_eq!(data.len(), 3);
        // Oldest first, orphan dropped.
        let times: Vec<i64> = data.iter().map(|p| p.t).collect();
        assert_eq!(
            times,
            vec![
                time::db_to_wall(1_000),
                time::db_to_wall(2_000),
                time::db_to_wall(3_000)
            ]
        );
        assert!((data[0].y - 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_network_graph_decimated_keeps_multiples() {
        let (_tmp, store) = open_store().await;
        let now = time::db_to_wall(10_000);
        for height in 1..=31 {
            insert_network_block(&store, "", "", height, 1_200, height * 10).await;
        }

        let week = network_graph_decimated(&store, GraphWindow::Week, 120, now)
            .await
            .unwrap();
        assert_eq!(week.len(), 4);
        assert_eq!(week[0].t, time::db_to_wall(70));

        let month = network_graph_decimated(&store, GraphWindow::Month, 120, now)
            .await
            .unwrap();
        assert_eq!(month.len(), 1);
        assert_eq!(month[0].t, time::db_to_wall(300));
    }

    #[test]
    fn test_empty_graph_is_two_flat_points() {
        let now = 1_700_000_123;
        let data = empty_graph(GraphWindow::Day, now);
        assert_eq!(data.len(), 2);
        let end = time::start_of_5_min(now);
        assert_eq!(data[0], GraphPoint { t: end - 86_400, y: 0.0 });
        assert_eq!(data[1], GraphPoint { t: end, y: 0.0 });
    }
}
