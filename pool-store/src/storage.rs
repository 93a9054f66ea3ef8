//! SQLite storage backend implementing the store query contracts.

use crate::types::*;
use futures::stream::BoxStream;
use futures::StreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Table {0} is empty")]
    Empty(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Query contracts the stats engine consumes.
///
/// The engine never sees SQL; everything behind this trait is replaceable
/// by any backend that can answer the same shapes.
#[async_trait::async_trait]
pub trait PoolStore: Send + Sync {
    /// Latest row of the canonical network block ledger.
    async fn latest_network_block(&self) -> Result<NetworkBlockRow>;

    /// Payout daemon scan progress.
    async fn latest_scan_height(&self) -> Result<ScanHeightRow>;

    /// All share rows ordered by time descending, for the PPLNS cutoff
    /// walk. Streamed so the caller stops as soon as the window fills.
    fn shares_cumulative_desc(&self) -> BoxStream<'_, Result<ShareTick>>;

    /// Share aggregate over `[now - duration, now]` (store-epoch seconds).
    async fn shares_in_window(&self, now: i64, duration: i64) -> Result<ShareWindow>;

    /// Per-rig share aggregates over the same window, one row per
    /// registered rig.
    async fn users_hashrate_window(&self, now: i64, duration: i64) -> Result<Vec<RigWindowRow>>;

    /// Pool-wide share count strictly after `cutoff`.
    async fn total_shares_since(&self, cutoff: i64) -> Result<i64>;

    /// Per-user share counts strictly after `cutoff`.
    async fn user_shares_since(&self, cutoff: i64) -> Result<Vec<UserShareRow>>;

    /// Every account joined with rig ids/names and ban intervals.
    async fn users_with_rigs_and_bans(&self) -> Result<Vec<UserRow>>;

    /// Per-user credit/debit sub-type sums.
    async fn user_balances(&self) -> Result<Vec<BalanceRow>>;

    /// Every rig with its most recent share time.
    async fn rigs_with_last_share(&self) -> Result<Vec<RigRow>>;

    /// One page of mined blocks, height descending, plus the total count.
    async fn blocks_page(&self, limit: i64, offset: i64) -> Result<(Vec<BlockRow>, i64)>;

    /// One page of payout transactions, newest first, plus the total count.
    async fn payments_page(&self, limit: i64, offset: i64) -> Result<(Vec<PaymentRow>, i64)>;

    /// One page of the merged credits/debits ledger for one user, newest
    /// first, with running balances computed over the full time-ordered
    /// sequence.
    async fn ledger_entries(&self, uid: i64, limit: i64, offset: i64)
        -> Result<(Vec<LedgerRow>, i64)>;

    async fn blocks_count(&self) -> Result<BlockCounts>;

    async fn payments_count(&self) -> Result<PaymentCounts>;

    /// Effort sums for the last-100 / last-1000 / all-blocks windows.
    async fn average_efforts(&self) -> Result<Vec<EffortRow>>;

    /// Recompute `total_shares` on every matured-but-not-closed block.
    /// Returns the number of blocks updated.
    async fn generate_total_shares(&self) -> Result<u64>;

    /// Min/max share time strictly after the last persisted rollup sample,
    /// or `None` when no new shares exist.
    async fn fresh_share_bounds(&self, res: Resolution) -> Result<Option<(i64, i64)>>;

    /// Insert per-rig and pool-aggregate rollup rows for every sample
    /// point in `[start, end]`. Idempotent: existing sample points are
    /// left untouched. Returns the number of rows inserted.
    async fn insert_rollup_points(&self, res: Resolution, start: i64, end: i64) -> Result<u64>;

    /// Read one uid's rollup samples in `[start, end]`, summed across rigs.
    async fn rollup_series(&self, res: Resolution, start: i64, end: i64, uid: i64)
        -> Result<Vec<RollupPoint>>;

    /// Time of the newest persisted rollup sample.
    async fn last_rollup_tsample(&self, res: Resolution) -> Result<Option<i64>>;

    /// Network blocks since `time`, height descending.
    async fn network_blocks_since(&self, time: i64) -> Result<Vec<NetworkBlockRow>>;

    /// Network blocks since `time` whose height is a multiple of `step`,
    /// height ascending.
    async fn network_blocks_decimated(&self, time: i64, step: i64) -> Result<Vec<NetworkBlockRow>>;

    /// Matured blocks counted per wall-clock hour since `time`.
    async fn blocks_per_hour(&self, time: i64) -> Result<Vec<HourCount>>;
}

/// SQLite-backed store implementation.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let connection_options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    /// Underlying connection pool, for maintenance tooling and test
    /// fixtures. The engine itself only talks through [`PoolStore`].
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                uid INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                wallet TEXT NOT NULL DEFAULT '',
                diff_target INTEGER NOT NULL DEFAULT 0,
                payment_threshold INTEGER NOT NULL DEFAULT 0,
                anon_leader INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rigs (
                uid INTEGER NOT NULL,
                rid INTEGER NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (uid, rid)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_ban (
                id INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL,
                lift_time INTEGER NOT NULL,
                msg TEXT NOT NULL DEFAULT ''
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS valid_shares (
                uid INTEGER NOT NULL,
                rid INTEGER NOT NULL,
                count INTEGER NOT NULL,
                time INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_shares_time ON valid_shares(time)",
            "CREATE INDEX IF NOT EXISTS idx_shares_rig_time ON valid_shares(uid, rid, time)",
            r#"
            CREATE TABLE IF NOT EXISTS mined_blocks (
                blk_id INTEGER PRIMARY KEY,
                uid INTEGER,
                txid TEXT,
                height INTEGER NOT NULL,
                time INTEGER NOT NULL,
                reward_total INTEGER,
                total_shares INTEGER NOT NULL DEFAULT 0,
                difficulty INTEGER NOT NULL DEFAULT 0,
                status INTEGER NOT NULL DEFAULT 0
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_mined_blocks_height ON mined_blocks(height)",
            r#"
            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL,
                txid TEXT,
                amount_paid INTEGER,
                amount_fee INTEGER,
                time INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS credits (
                id INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL,
                blk_id INTEGER,
                amount_reward INTEGER,
                amount_bonus INTEGER,
                amount_dev INTEGER,
                time INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS network_blocks (
                blkid TEXT NOT NULL DEFAULT '',
                prev_id TEXT NOT NULL DEFAULT '',
                height INTEGER NOT NULL,
                difficulty INTEGER NOT NULL,
                reward_total INTEGER NOT NULL DEFAULT 0,
                time INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_network_blocks_height ON network_blocks(height)",
            r#"
            CREATE TABLE IF NOT EXISTS scan_height (
                height INTEGER NOT NULL,
                time INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS hashrate_5min (
                uid INTEGER NOT NULL,
                rid INTEGER NOT NULL,
                count INTEGER,
                tsample INTEGER NOT NULL,
                tstart INTEGER,
                tend INTEGER,
                PRIMARY KEY (uid, rid, tsample)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS hashrate_1hr (
                uid INTEGER NOT NULL,
                rid INTEGER NOT NULL,
                count INTEGER,
                tsample INTEGER NOT NULL,
                tstart INTEGER,
                tend INTEGER,
                PRIMARY KEY (uid, rid, tsample)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn map_network_block(row: &sqlx::sqlite::SqliteRow) -> NetworkBlockRow {
        NetworkBlockRow {
            blkid: row.get("blkid"),
            prev_id: row.get("prev_id"),
            height: row.get("height"),
            difficulty: row.get("difficulty"),
            reward_total: row.get("reward_total"),
            time: row.get("time"),
        }
    }
}

#[async_trait::async_trait]
impl PoolStore for SqliteStore {
    async fn latest_network_block(&self) -> Result<NetworkBlockRow> {
        let row = sqlx::query("SELECT * FROM network_blocks ORDER BY height DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::Empty("network_blocks"))?;

        Ok(Self::map_network_block(&row))
    }

    async fn latest_scan_height(&self) -> Result<ScanHeightRow> {
        let row = sqlx::query("SELECT height, time FROM scan_height LIMIT 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::Empty("scan_height"))?;

        Ok(ScanHeightRow {
            height: row.get("height"),
            time: row.get("time"),
        })
    }

    fn shares_cumulative_desc(&self) -> BoxStream<'_, Result<ShareTick>> {
        sqlx::query("SELECT time, count FROM valid_shares ORDER BY time DESC")
            .fetch(&self.pool)
            .map(|res| {
                let row = res?;
                Ok(ShareTick {
                    time: row.get("time"),
                    count: row.get("count"),
                })
            })
            .boxed()
    }

    async fn shares_in_window(&self, now: i64, duration: i64) -> Result<ShareWindow> {
        // The earliest row's count accrued before the window opened, so it
        // is zeroed out of the sum.
        let row = sqlx::query(
            r#"
            SELECT
            MIN(time) AS tstart,
            MAX(time) AS tend,
            COALESCE(SUM(CASE WHEN row_number = 1 THEN 0 ELSE count END), 0) AS count
            FROM (
                SELECT
                count,
                time,
                ROW_NUMBER() OVER(ORDER BY time ASC) AS row_number
                FROM valid_shares
                WHERE time BETWEEN (? - ?) AND ?
            )
            "#,
        )
        .bind(now)
        .bind(duration)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(ShareWindow {
            tstart: row.get("tstart"),
            tend: row.get("tend"),
            count: row.get("count"),
        })
    }

    async fn users_hashrate_window(&self, now: i64, duration: i64) -> Result<Vec<RigWindowRow>> {
        let rows = sqlx::query(
            r#"
            SELECT
            rigs.uid AS uid,
            rigs.rid AS rid,
            MIN(shares.time) AS tstart,
            MAX(shares.time) AS tend,
            COALESCE(SUM(CASE WHEN shares.row_number = 1 THEN 0 ELSE shares.count END), 0) AS count
            FROM rigs
            LEFT JOIN (
                SELECT
                uid,
                rid,
                count,
                time,
                ROW_NUMBER() OVER(PARTITION BY uid, rid ORDER BY time ASC) AS row_number
                FROM valid_shares
                WHERE time BETWEEN (? - ?) AND ?
            ) shares ON rigs.uid = shares.uid AND rigs.rid = shares.rid
            GROUP BY rigs.uid, rigs.rid
            "#,
        )
        .bind(now)
        .bind(duration)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RigWindowRow {
                uid: row.get("uid"),
                rid: row.get("rid"),
                tstart: row.get("tstart"),
                tend: row.get("tend"),
                count: row.get("count"),
            })
            .collect())
    }

    async fn total_shares_since(&self, cutoff: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COALESCE(SUM(count), 0) AS count FROM valid_shares WHERE time > ?")
            .bind(cutoff)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    async fn user_shares_since(&self, cutoff: i64) -> Result<Vec<UserShareRow>> {
        let rows = sqlx::query(
            "SELECT uid, SUM(count) AS count FROM valid_shares WHERE time > ? GROUP BY uid",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| UserShareRow {
                uid: row.get("uid"),
                count: row.get("count"),
            })
            .collect())
    }

    async fn users_with_rigs_and_bans(&self) -> Result<Vec<UserRow>> {
        // Three flat queries merged here; SQLite has no array aggregation
        // worth the name.
        let user_rows = sqlx::query(
            "SELECT uid, username, wallet, diff_target, payment_threshold, anon_leader \
             FROM users ORDER BY uid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let rig_rows = sqlx::query("SELECT uid, rid, name FROM rigs ORDER BY rid ASC")
            .fetch_all(&self.pool)
            .await?;

        let ban_rows = sqlx::query("SELECT uid, lift_time, msg FROM user_ban ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut users: Vec<UserRow> = user_rows
            .iter()
            .map(|row| UserRow {
                uid: row.get("uid"),
                username: row.get("username"),
                wallet: row.get("wallet"),
                diff_target: row.get("diff_target"),
                payment_threshold: row.get("payment_threshold"),
                anon_leader: row.get::<i64, _>("anon_leader") != 0,
                rigs_rid: Vec::new(),
                rigs_name: Vec::new(),
                ban_lift_time: Vec::new(),
                ban_msg: Vec::new(),
            })
            .collect();

        let index: HashMap<i64, usize> = users
            .iter()
            .enumerate()
            .map(|(i, user)| (user.uid, i))
            .collect();

        for row in &rig_rows {
            if let Some(&i) = index.get(&row.get::<i64, _>("uid")) {
                users[i].rigs_rid.push(row.get("rid"));
                users[i].rigs_name.push(row.get("name"));
            }
        }

        for row in &ban_rows {
            if let Some(&i) = index.get(&row.get::<i64, _>("uid")) {
                users[i].ban_lift_time.push(row.get("lift_time"));
                users[i].ban_msg.push(row.get("msg"));
            }
        }

        Ok(users)
    }

    async fn user_balances(&self) -> Result<Vec<BalanceRow>> {
        let rows = sqlx::query(
            r#"
            SELECT
            info.uid AS uid,
            info.wallet AS wallet,
            info.payment_threshold AS payment_threshold,
            COALESCE(credits_pending.reward, 0) AS credits_pending_reward,
            COALESCE(credits_pending.admin, 0) AS credits_pending_admin,
            COALESCE(credits_pending.bonus, 0) AS credits_pending_bonus,
            COALESCE(credits_pending.dev, 0) AS credits_pending_dev,
            COALESCE(credits_matured.reward, 0) AS credits_matured_reward,
            COALESCE(credits_matured.admin, 0) AS credits_matured_admin,
            COALESCE(credits_matured.bonus, 0) AS credits_matured_bonus,
            COALESCE(credits_matured.dev, 0) AS credits_matured_dev,
            COALESCE(debits.paid, 0) AS debits_paid,
            COALESCE(debits.admin, 0) AS debits_admin,
            COALESCE(debits.fee, 0) AS debits_fee
            FROM (
                SELECT uid, payment_threshold, wallet FROM users
            ) AS info
            LEFT JOIN (
                SELECT
                uid,
                SUM(COALESCE(CASE WHEN blk_id > 0 THEN amount_reward ELSE 0 END, 0)) AS reward,
                SUM(COALESCE(CASE WHEN blk_id < 0 THEN amount_reward ELSE 0 END, 0)) AS admin,
                SUM(COALESCE(amount_bonus, 0)) AS bonus,
                SUM(COALESCE(amount_dev, 0)) AS dev
                FROM credits
                WHERE status = 0
                GROUP BY uid
            ) AS credits_pending ON credits_pending.uid = info.uid
            LEFT JOIN (
                SELECT
                uid,
                SUM(COALESCE(CASE WHEN blk_id > 0 THEN amount_reward ELSE 0 END, 0)) AS reward,
                SUM(COALESCE(CASE WHEN blk_id < 0 THEN amount_reward ELSE 0 END, 0)) AS admin,
                SUM(COALESCE(amount_bonus, 0)) AS bonus,
                SUM(COALESCE(amount_dev, 0)) AS dev
                FROM credits
                WHERE status = 1
                GROUP BY uid
            ) AS credits_matured ON credits_matured.uid = info.uid
            LEFT JOIN (
                SELECT
                uid,
                SUM(COALESCE(CASE WHEN txid IS NOT NULL THEN amount_paid ELSE 0 END, 0)) AS paid,
                SUM(COALESCE(CASE WHEN txid IS NULL THEN amount_paid ELSE 0 END, 0)) AS admin,
                SUM(COALESCE(amount_fee, 0)) AS fee
                FROM payments
                WHERE status <> -1
                GROUP BY uid
            ) AS debits ON debits.uid = info.uid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| BalanceRow {
                uid: row.get("uid"),
                wallet: row.get("wallet"),
                payment_threshold: row.get("payment_threshold"),
                credits_pending_reward: row.get("credits_pending_reward"),
                credits_pending_admin: row.get("credits_pending_admin"),
                credits_pending_bonus: row.get("credits_pending_bonus"),
                credits_pending_dev: row.get("credits_pending_dev"),
                credits_matured_reward: row.get("credits_matured_reward"),
                credits_matured_admin: row.get("credits_matured_admin"),
                credits_matured_bonus: row.get("credits_matured_bonus"),
                credits_matured_dev: row.get("credits_matured_dev"),
                debits_paid: row.get("debits_paid"),
                debits_admin: row.get("debits_admin"),
                debits_fee: row.get("debits_fee"),
            })
            .collect())
    }

    async fn rigs_with_last_share(&self) -> Result<Vec<RigRow>> {
        let rows = sqlx::query(
            r#"
            SELECT
            rigs.uid AS uid,
            rigs.rid AS rid,
            rigs.name AS name,
            shares.last_share AS last_share
            FROM rigs
            LEFT JOIN (
                SELECT uid, rid, MAX(time) AS last_share
                FROM valid_shares
                GROUP BY uid, rid
            ) shares ON rigs.uid = shares.uid AND rigs.rid = shares.rid
            ORDER BY rigs.uid ASC, rigs.rid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RigRow {
                uid: row.get("uid"),
                rid: row.get("rid"),
                name: row.get("name"),
                last_share: row.get("last_share"),
            })
            .collect())
    }

    async fn blocks_page(&self, limit: i64, offset: i64) -> Result<(Vec<BlockRow>, i64)> {
        let rows = sqlx::query(
            r#"
            SELECT
            mined_blocks.*,
            users.username AS username,
            users.anon_leader AS anon_leader,
            COUNT(*) OVER() AS total_count
            FROM mined_blocks
            LEFT JOIN users ON mined_blocks.uid = users.uid
            ORDER BY height DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut blocks = Vec::with_capacity(rows.len());
        let mut total = 0;
        for row in &rows {
            total = row.get("total_count");
            let status: i64 = row.get("status");
            let anon = row.get::<Option<i64>, _>("anon_leader").unwrap_or(0) != 0;
            blocks.push(BlockRow {
                blk_id: row.get("blk_id"),
                txid: row.get("txid"),
                height: row.get("height"),
                time: crate::time::db_to_wall(row.get("time")),
                reward: row.get::<Option<i64>, _>("reward_total").unwrap_or(0),
                total_shares: if status > 0 { row.get("total_shares") } else { 0 },
                difficulty: row.get("difficulty"),
                status,
                miner: if anon {
                    "anon".to_string()
                } else {
                    row.get::<Option<String>, _>("username").unwrap_or_default()
                },
            });
        }

        Ok((blocks, total))
    }

    async fn payments_page(&self, limit: i64, offset: i64) -> Result<(Vec<PaymentRow>, i64)> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT
                txid,
                MIN(time) AS time,
                MIN(status) AS status,
                SUM(amount_paid) AS paid,
                SUM(amount_fee) AS fee,
                COUNT(uid) AS payees,
                ROW_NUMBER() OVER(ORDER BY time ASC) AS payment_number,
                COUNT(*) OVER() AS total_count
                FROM payments
                WHERE txid IS NOT NULL
                GROUP BY txid, time
            )
            ORDER BY payment_number DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut payments = Vec::with_capacity(rows.len());
        let mut total = 0;
        for row in &rows {
            total = row.get("total_count");
            payments.push(PaymentRow {
                payment_number: row.get("payment_number"),
                txid: row.get("txid"),
                status: row.get("status"),
                paid: row.get::<Option<i64>, _>("paid").unwrap_or(0),
                fee: row.get::<Option<i64>, _>("fee").unwrap_or(0),
                payees: row.get("payees"),
                time: crate::time::db_to_wall(row.get("time")),
            });
        }

        Ok((payments, total))
    }

    async fn ledger_entries(
        &self,
        uid: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<LedgerRow>, i64)> {
        // Running balances are window sums over the full merged sequence,
        // ordered (time, blk_id, kind) so ties page deterministically.
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT
                t1.blk_id AS blk_id,
                t1.txid AS txid,
                t1.amount AS amount,
                t1.time AS time,
                t1.status AS status,
                t1.kind AS kind,
                mined_blocks.height AS height,
                COUNT(*) OVER() AS total_count,
                SUM(CASE WHEN t1.status != -1 THEN t1.amount ELSE 0 END)
                    OVER (ORDER BY t1.time ASC, t1.blk_id ASC, t1.kind ASC) AS running_total
                FROM (
                    SELECT blk_id, CAST(NULL AS TEXT) AS txid, amount_reward AS amount, time, status, 'credit_reward' AS kind
                    FROM credits
                    WHERE uid = ? AND amount_reward IS NOT NULL AND blk_id > 0

                    UNION ALL

                    SELECT blk_id, CAST(NULL AS TEXT), amount_reward, time, status, 'credit_admin'
                    FROM credits
                    WHERE uid = ? AND amount_reward IS NOT NULL AND blk_id < 0

                    UNION ALL

                    SELECT blk_id, CAST(NULL AS TEXT), amount_bonus, time, status, 'credit_bonus'
                    FROM credits
                    WHERE uid = ? AND amount_bonus IS NOT NULL

                    UNION ALL

                    SELECT blk_id, CAST(NULL AS TEXT), amount_dev, time, status, 'credit_dev'
                    FROM credits
                    WHERE uid = ? AND amount_dev IS NOT NULL

                    UNION ALL

                    SELECT CAST(NULL AS INTEGER), txid, -amount_paid, time, status, 'debit_payment'
                    FROM payments
                    WHERE uid = ? AND txid IS NOT NULL

                    UNION ALL

                    SELECT CAST(NULL AS INTEGER), txid, -amount_paid, time, status, 'debit_admin'
                    FROM payments
                    WHERE uid = ? AND txid IS NULL

                    UNION ALL

                    SELECT CAST(NULL AS INTEGER), txid, -amount_fee, time, status, 'debit_fee'
                    FROM payments
                    WHERE uid = ? AND txid IS NOT NULL
                ) AS t1
                LEFT JOIN mined_blocks ON t1.blk_id = mined_blocks.blk_id
            )
            ORDER BY time DESC, blk_id DESC, kind DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(uid)
        .bind(uid)
        .bind(uid)
        .bind(uid)
        .bind(uid)
        .bind(uid)
        .bind(uid)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        let mut total = 0;
        for row in &rows {
            total = row.get("total_count");
            entries.push(LedgerRow {
                blk_id: row.get("blk_id"),
                height: row.get("height"),
                txid: row.get("txid"),
                amount: row.get::<Option<i64>, _>("amount").unwrap_or(0),
                running_total: row.get::<Option<i64>, _>("running_total").unwrap_or(0),
                kind: row.get("kind"),
                time: crate::time::db_to_wall(row.get("time")),
                status: row.get("status"),
            });
        }

        Ok((entries, total))
    }

    async fn blocks_count(&self) -> Result<BlockCounts> {
        let row = sqlx::query(
            r#"
            SELECT
            COUNT(*) AS blocks_total,
            COALESCE(SUM(CASE WHEN status = -1 THEN 1 ELSE 0 END), 0) AS blocks_orphaned,
            COALESCE(SUM(CASE WHEN status =  0 THEN 1 ELSE 0 END), 0) AS blocks_failed,
            COALESCE(SUM(CASE WHEN status =  1 THEN 1 ELSE 0 END), 0) AS blocks_ok,
            COALESCE(SUM(CASE WHEN status =  2 THEN 1 ELSE 0 END), 0) AS blocks_tx_seen,
            COALESCE(SUM(CASE WHEN status =  3 THEN 1 ELSE 0 END), 0) AS blocks_credited,
            COALESCE(SUM(CASE WHEN status =  4 THEN 1 ELSE 0 END), 0) AS blocks_matured,
            COALESCE(SUM(CASE WHEN status =  5 THEN 1 ELSE 0 END), 0) AS blocks_closed,
            COALESCE(SUM(CASE WHEN status >  0 THEN COALESCE(reward_total, 0) ELSE 0 END), 0) AS total_mined
            FROM mined_blocks
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(BlockCounts {
            blocks_total: row.get("blocks_total"),
            blocks_orphaned: row.get("blocks_orphaned"),
            blocks_failed: row.get("blocks_failed"),
            blocks_ok: row.get("blocks_ok"),
            blocks_tx_seen: row.get("blocks_tx_seen"),
            blocks_credited: row.get("blocks_credited"),
            blocks_matured: row.get("blocks_matured"),
            blocks_closed: row.get("blocks_closed"),
            total_mined: row.get("total_mined"),
        })
    }

    async fn payments_count(&self) -> Result<PaymentCounts> {
        let row = sqlx::query(
            r#"
            SELECT
            COUNT(*) AS payment_total,
            COALESCE(SUM(CASE WHEN status = -1 THEN 1 ELSE 0 END), 0) AS payment_orphaned,
            COALESCE(SUM(CASE WHEN status =  0 THEN 1 ELSE 0 END), 0) AS payment_pending,
            COALESCE(SUM(CASE WHEN status =  1 THEN 1 ELSE 0 END), 0) AS payment_matured,
            COALESCE(SUM(CASE WHEN status > -1 THEN COALESCE(amount_paid, 0) ELSE 0 END), 0) AS total_paid,
            COALESCE(SUM(CASE WHEN status > -1 THEN COALESCE(amount_fee, 0) ELSE 0 END), 0) AS total_fee,
            COUNT(DISTINCT uid) AS total_payees
            FROM payments
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PaymentCounts {
            payment_total: row.get("payment_total"),
            payment_orphaned: row.get("payment_orphaned"),
            payment_pending: row.get("payment_pending"),
            payment_matured: row.get("payment_matured"),
            total_paid: row.get("total_paid"),
            total_fee: row.get("total_fee"),
            total_payees: row.get("total_payees"),
        })
    }

    async fn average_efforts(&self) -> Result<Vec<EffortRow>> {
        let rows = sqlx::query(
            r#"
            SELECT
            COALESCE(SUM(total_shares), 0) AS total_shares,
            COALESCE(SUM(difficulty), 0) AS difficulty,
            size
            FROM (
                SELECT * FROM (
                    SELECT total_shares, difficulty, 100 AS size
                    FROM mined_blocks
                    WHERE status > 0
                    ORDER BY blk_id DESC
                    LIMIT 100
                )
                UNION ALL
                SELECT * FROM (
                    SELECT total_shares, difficulty, 1000 AS size
                    FROM mined_blocks
                    WHERE status > 0
                    ORDER BY blk_id DESC
                    LIMIT 1000
                )
                UNION ALL
                SELECT total_shares, difficulty, 0 AS size
                FROM mined_blocks
                WHERE status > 0
            )
            GROUP BY size
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| EffortRow {
                size: row.get("size"),
                total_shares: row.get("total_shares"),
                difficulty: row.get("difficulty"),
            })
            .collect())
    }

    async fn generate_total_shares(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE mined_blocks
            SET total_shares = sub.total_shares
            FROM (
                SELECT
                blocks.blk_id AS blk_id,
                SUM(COALESCE(shares.count, 0)) AS total_shares
                FROM (
                    SELECT
                    blk_id,
                    status,
                    LAG(time, 1, 0) OVER(ORDER BY height ASC) AS time_start,
                    time AS time_end
                    FROM mined_blocks
                    WHERE status > 0
                ) blocks
                LEFT JOIN valid_shares shares
                    ON shares.time > blocks.time_start AND shares.time <= blocks.time_end
                WHERE blocks.status < 5
                GROUP BY blocks.blk_id
            ) AS sub
            WHERE mined_blocks.blk_id = sub.blk_id
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn fresh_share_bounds(&self, res: Resolution) -> Result<Option<(i64, i64)>> {
        let query = format!(
            "SELECT MIN(time) AS min, MAX(time) AS max FROM valid_shares \
             WHERE time > COALESCE((SELECT MAX(tsample) FROM {}), 0)",
            res.table()
        );
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;

        let min: Option<i64> = row.get("min");
        let max: Option<i64> = row.get("max");
        Ok(min.zip(max))
    }

    async fn insert_rollup_points(&self, res: Resolution, start: i64, end: i64) -> Result<u64> {
        let interval = res.interval();
        let period = res.period();

        // Pool aggregate under uid -1, rid 0; one row per sample point.
        let pool_query = format!(
            r#"
            WITH RECURSIVE series(t) AS (
                SELECT ?
                UNION ALL
                SELECT t + ? FROM series WHERE t + ? <= ?
            )
            INSERT OR IGNORE INTO {} (uid, rid, count, tsample, tstart, tend)
            SELECT -1, 0, SUM(CASE WHEN rn = 1 THEN 0 ELSE count END), t, MIN(time), MAX(time)
            FROM (
                SELECT
                series.t AS t,
                s.count AS count,
                s.time AS time,
                ROW_NUMBER() OVER(PARTITION BY series.t ORDER BY s.time ASC) AS rn
                FROM series
                JOIN valid_shares s ON s.time BETWEEN (series.t - ?) AND series.t
            )
            GROUP BY t
            "#,
            res.table()
        );

        let user_query = format!(
            r#"
            WITH RECURSIVE series(t) AS (
                SELECT ?
                UNION ALL
                SELECT t + ? FROM series WHERE t + ? <= ?
            )
            INSERT OR IGNORE INTO {} (uid, rid, count, tsample, tstart, tend)
            SELECT uid, rid, SUM(CASE WHEN rn = 1 THEN 0 ELSE count END), t, MIN(time), MAX(time)
            FROM (
                SELECT
                series.t AS t,
                s.uid AS uid,
                s.rid AS rid,
                s.count AS count,
                s.time AS time,
                ROW_NUMBER() OVER(PARTITION BY series.t, s.uid, s.rid ORDER BY s.time ASC) AS rn
                FROM series
                JOIN valid_shares s ON s.time BETWEEN (series.t - ?) AND series.t
            )
            GROUP BY uid, rid, t
            "#,
            res.table()
        );

        let mut inserted = 0;
        for query in [&pool_query, &user_query] {
            let result = sqlx::query(query)
                .bind(start)
                .bind(interval)
                .bind(interval)
                .bind(end)
                .bind(period)
                .execute(&self.pool)
                .await?;
            inserted += result.rows_affected();
        }

        tracing::debug!(
            "Inserted {} rollup rows into {} for {} - {}",
            inserted,
            res.table(),
            start,
            end
        );

        Ok(inserted)
    }

    async fn rollup_series(
        &self,
        res: Resolution,
        start: i64,
        end: i64,
        uid: i64,
    ) -> Result<Vec<RollupPoint>> {
        let query = format!(
            r#"
            SELECT
            tsample,
            SUM(CASE WHEN tsample = tstart THEN 0.0
                     ELSE CAST(count AS REAL) / (tsample - tstart) END) AS y
            FROM {}
            WHERE tsample BETWEEN ? AND ? AND uid = ?
            GROUP BY tsample
            ORDER BY tsample ASC
            "#,
            res.table()
        );
        let rows = sqlx::query(&query)
            .bind(start)
            .bind(end)
            .bind(uid)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| RollupPoint {
                tsample: row.get("tsample"),
                rate: row.get::<Option<f64>, _>("y").unwrap_or(0.0),
            })
            .collect())
    }

    async fn last_rollup_tsample(&self, res: Resolution) -> Result<Option<i64>> {
        let query = format!("SELECT MAX(tsample) AS tsample FROM {}", res.table());
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.get("tsample"))
    }

    async fn network_blocks_since(&self, time: i64) -> Result<Vec<NetworkBlockRow>> {
        let rows = sqlx::query("SELECT * FROM network_blocks WHERE time >= ? ORDER BY height DESC")
            .bind(time)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::map_network_block).collect())
    }

    async fn network_blocks_decimated(&self, time: i64, step: i64) -> Result<Vec<NetworkBlockRow>> {
        let rows = sqlx::query(
            "SELECT * FROM network_blocks WHERE time >= ? AND height % ? = 0 ORDER BY height ASC",
        )
        .bind(time)
        .bind(step)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::map_network_block).collect())
    }

    async fn blocks_per_hour(&self, time: i64) -> Result<Vec<HourCount>> {
        let rows = sqlx::query(
            r#"
            SELECT
            ((time + ?) / 3600) * 3600 AS hour,
            COUNT(*) AS count
            FROM mined_blocks
            WHERE status > 0 AND time >= ?
            GROUP BY hour
            ORDER BY hour ASC
            "#,
        )
        .bind(crate::time::EPOCH_OFFSET)
        .bind(time)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| HourCount {
                hour: row.get("hour"),
                count: row.get("count"),
            })
            .collect())
    }
}
