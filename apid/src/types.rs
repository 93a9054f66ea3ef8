//! Derived-metric types held in the snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of a per-user mapping: either one account or the pool-wide
/// aggregate bucket (persisted as uid `-1` in the store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserKey {
    Pool,
    User(i64),
}

impl UserKey {
    pub const POOL_UID: i64 = -1;

    pub fn from_uid(uid: i64) -> Self {
        if uid == Self::POOL_UID {
            UserKey::Pool
        } else {
            UserKey::User(uid)
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            UserKey::Pool => Self::POOL_UID,
            UserKey::User(uid) => uid,
        }
    }
}

/// Per-user mapping that always carries the pool-aggregate entry.
///
/// Constructed with a `Pool` entry and exposes no way to remove it, so
/// lookups for unknown users can always fall back to the pool bucket.
/// Iteration order is fixed (pool bucket first, then uid ascending).
#[derive(Debug, Clone)]
pub struct UserMap<V> {
    inner: BTreeMap<UserKey, V>,
}

impl<V: Default> UserMap<V> {
    pub fn new() -> Self {
        Self::with_pool(V::default())
    }
}

impl<V: Default> Default for UserMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> UserMap<V> {
    /// Build a map with an explicit pool-aggregate entry.
    pub fn with_pool(pool: V) -> Self {
        let mut inner = BTreeMap::new();
        inner.insert(UserKey::Pool, pool);
        Self { inner }
    }

    pub fn insert(&mut self, key: UserKey, value: V) {
        self.inner.insert(key, value);
    }

    pub fn get(&self, key: UserKey) -> Option<&V> {
        self.inner.get(&key)
    }

    /// Entry for `uid`, falling back to the pool-aggregate entry.
    pub fn get_or_pool(&self, uid: i64) -> &V {
        self.inner
            .get(&UserKey::from_uid(uid))
            .unwrap_or_else(|| &self.inner[&UserKey::Pool])
    }

    pub fn entry_or_default(&mut self, key: UserKey) -> &mut V
    where
        V: Default,
    {
        self.inner.entry(key).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserKey, &V)> {
        self.inner.iter().map(|(k, v)| (*k, v))
    }

    pub fn contains(&self, key: UserKey) -> bool {
        self.inner.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Incremental counters the frontend polls to detect new data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventCounter {
    #[serde(rename = "1m")]
    pub one_min: u64,
    #[serde(rename = "5m")]
    pub five_min: u64,
    #[serde(rename = "1hr")]
    pub one_hr: u64,
    pub block: i64,
}

/// Latest state of the coin network, from the block ledger or the
/// explorer fallback. Timestamps are wall-clock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub difficulty: i64,
    pub height: i64,
    pub hashrate: f64,
    pub last_timestamp: i64,
    pub last_reward: i64,
}

/// Payout daemon scan progress, wall-clock time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayoutdInfo {
    pub height: i64,
    pub time: i64,
}

/// Market quotes keyed by currency symbol.
pub type PriceInfo = BTreeMap<String, f64>;

/// Pool hashrates over the four trailing windows, in shares per second.
#[derive(Debug, Clone, Default)]
pub struct PoolHashrates {
    pub m15: u64,
    pub h1: u64,
    pub h6: u64,
    pub h24: u64,
}

/// One point of a served time series. `t` is wall-clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphPoint {
    pub t: i64,
    pub y: f64,
}

/// The graph windows the dashboard offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphWindow {
    Day,
    Week,
    Month,
}

impl GraphWindow {
    pub fn length(self) -> i64 {
        match self {
            GraphWindow::Day => 24 * 60 * 60,
            GraphWindow::Week => 7 * 24 * 60 * 60,
            GraphWindow::Month => 30 * 24 * 60 * 60,
        }
    }

    /// Rollup resolution backing this window.
    pub fn resolution(self) -> pool_store::Resolution {
        match self {
            GraphWindow::Day => pool_store::Resolution::FiveMin,
            GraphWindow::Week | GraphWindow::Month => pool_store::Resolution::OneHour,
        }
    }

    /// `now` floored to this window's resolution bucket.
    pub fn floor_end(self, now: i64) -> i64 {
        match self {
            GraphWindow::Day => pool_store::time::start_of_5_min(now),
            GraphWindow::Week | GraphWindow::Month => pool_store::time::start_of_hour(now),
        }
    }

    /// Window name as the frontend sends it.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "24hr" => Some(GraphWindow::Day),
            "7d" => Some(GraphWindow::Week),
            "30d" => Some(GraphWindow::Month),
            _ => None,
        }
    }
}

/// Per-window pool or network hashrate graphs.
#[derive(Debug, Clone, Default)]
pub struct GraphSet {
    pub day: Vec<GraphPoint>,
    pub week: Vec<GraphPoint>,
    pub month: Vec<GraphPoint>,
}

impl GraphSet {
    pub fn get(&self, window: GraphWindow) -> &Vec<GraphPoint> {
        match window {
            GraphWindow::Day => &self.day,
            GraphWindow::Week => &self.week,
            GraphWindow::Month => &self.month,
        }
    }

    pub fn set(&mut self, window: GraphWindow, data: Vec<GraphPoint>) {
        match window {
            GraphWindow::Day => self.day = data,
            GraphWindow::Week => self.week = data,
            GraphWindow::Month => self.month = data,
        }
    }
}

/// Start of the current payout window: absolute and relative to now.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PplnsWindow {
    pub utc: i64,
    pub relative: i64,
}

/// Shares submitted since the last block / inside the payout window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentShares {
    pub block: i64,
    pub pplns: i64,
}

/// Users and rigs that submitted a share in the last 15 minutes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveCounts {
    pub miners: u64,
    pub workers: u64,
}

/// One row of the top-miners board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopMiner {
    pub number: usize,
    pub username: String,
    pub hashrate: u64,
    pub last_share: i64,
}

/// One rig and its activity state. `last_share` is wall-clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigEntry {
    pub rid: i64,
    pub name: String,
    pub last_share: i64,
    pub is_active: bool,
}

/// Per-rig hashrates plus the user total, in shares per second.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashrateEntry {
    pub total: u64,
    pub rigs: BTreeMap<i64, u64>,
}

/// Credit/debit sub-type sums plus roll-up totals for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub wallet: String,
    pub payment_threshold: i64,
    pub credits_pending_reward: i64,
    pub credits_pending_admin: i64,
    pub credits_pending_bonus: i64,
    pub credits_pending_dev: i64,
    pub credits_matured_reward: i64,
    pub credits_matured_admin: i64,
    pub credits_matured_bonus: i64,
    pub credits_matured_dev: i64,
    pub debits_paid: i64,
    pub debits_admin: i64,
    pub debits_fee: i64,
    pub credits_pending: i64,
    pub credits_matured: i64,
    pub debits: i64,
}

/// One pool account with its rig roster and derived ban state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: i64,
    pub username: String,
    pub wallet: String,
    pub diff_target: i64,
    pub payment_threshold: i64,
    pub anon_leader: bool,
    pub rigs_rid: Vec<i64>,
    pub rigs_name: Vec<String>,
    pub ban_lift_time: Vec<i64>,
    pub ban_msg: Vec<String>,
    pub is_banned: bool,
}

/// Share/difficulty sums over one effort window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Effort {
    pub total_shares: i64,
    pub difficulty: i64,
}

/// Average efforts over the last 100 / 1000 / all matured blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AverageEfforts {
    pub all: Effort,
    pub last_100: Effort,
    pub last_1000: Effort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_key_round_trip() {
        assert_eq!(UserKey::from_uid(-1), UserKey::Pool);
        assert_eq!(UserKey::from_uid(7), UserKey::User(7));
        assert_eq!(UserKey::Pool.as_i64(), -1);
        assert_eq!(UserKey::User(7).as_i64(), 7);
    }

    #[test]
    fn test_user_map_always_has_pool_entry() {
        let map: UserMap<u64> = UserMap::new();
        assert!(map.contains(UserKey::Pool));
        assert_eq!(map.len(), 1);
        assert_eq!(*map.get_or_pool(42), 0);
    }

    #[test]
    fn test_user_map_get_or_pool_falls_back() {
        let mut map = UserMap::with_pool(10u64);
        map.insert(UserKey::User(1), 99);
        assert_eq!(*map.get_or_pool(1), 99);
        assert_eq!(*map.get_or_pool(2), 10);
    }

    #[test]
    fn test_user_map_iterates_pool_first() {
        let mut map: UserMap<u64> = UserMap::new();
        map.insert(UserKey::User(5), 1);
        map.insert(UserKey::User(2), 2);
        let keys: Vec<UserKey> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![UserKey::Pool, UserKey::User(2), UserKey::User(5)]);
    }

    #[test]
    fn test_graph_window_parse() {
        assert_eq!(GraphWindow::parse("24hr"), Some(GraphWindow::Day));
        assert_eq!(GraphWindow::parse("7d"), Some(GraphWindow::Week));
        assert_eq!(GraphWindow::parse("30d"), Some(GraphWindow::Month));
        assert_eq!(GraphWindow::parse("1y"), None);
    }
}
