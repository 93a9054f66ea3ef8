//! Row and projection types returned by the store.
//!
//! Timestamps on these types are in store-epoch seconds unless a field is
//! documented otherwise; the engine converts to wall-clock at its boundary.

use serde::{Deserialize, Serialize};

/// Resolution of a persisted hashrate rollup table.
///
/// `FiveMin` samples every 5 minutes over a trailing 15-minute measurement
/// window; `OneHour` samples every hour over a trailing 1-hour window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    FiveMin,
    OneHour,
}

impl Resolution {
    /// Spacing between sample points, in seconds.
    pub fn interval(self) -> i64 {
        match self {
            Resolution::FiveMin => 300,
            Resolution::OneHour => 3600,
        }
    }

    /// Length of the measurement window behind each sample point.
    pub fn period(self) -> i64 {
        match self {
            Resolution::FiveMin => 900,
            Resolution::OneHour => 3600,
        }
    }

    pub(crate) fn table(self) -> &'static str {
        match self {
            Resolution::FiveMin => "hashrate_5min",
            Resolution::OneHour => "hashrate_1hr",
        }
    }
}

/// Latest row of the canonical network block ledger.
#[derive(Debug, Clone, Default)]
pub struct NetworkBlockRow {
    pub blkid: String,
    pub prev_id: String,
    pub height: i64,
    pub difficulty: i64,
    pub reward_total: i64,
    pub time: i64,
}

/// Scan progress of the payout daemon.
#[derive(Debug, Clone, Default)]
pub struct ScanHeightRow {
    pub height: i64,
    pub time: i64,
}

/// One row of the descending cumulative share scan.
#[derive(Debug, Clone, Copy)]
pub struct ShareTick {
    pub time: i64,
    pub count: i64,
}

/// Aggregate over shares inside a trailing window.
///
/// `count` excludes the earliest row in the window: its shares accrued
/// before `tstart`, so counting it would inflate the rate.
#[derive(Debug, Clone, Default)]
pub struct ShareWindow {
    pub tstart: Option<i64>,
    pub tend: Option<i64>,
    pub count: i64,
}

/// Per-rig share aggregate inside a trailing window (same exclusion rule
/// as [`ShareWindow`]). Every registered rig appears, share-less ones with
/// a `None` bound and zero count.
#[derive(Debug, Clone)]
pub struct RigWindowRow {
    pub uid: i64,
    pub rid: i64,
    pub tstart: Option<i64>,
    pub tend: Option<i64>,
    pub count: i64,
}

/// Per-user share count since a cutoff.
#[derive(Debug, Clone)]
pub struct UserShareRow {
    pub uid: i64,
    pub count: i64,
}

/// One pool account joined with its rig roster and ban intervals.
#[derive(Debug, Clone)]
pub struct UserRow {
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
}

/// Per-user credit/debit sub-type sums.
#[derive(Debug, Clone, Default)]
pub struct BalanceRow {
    pub uid: i64,
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
}

/// One rig with the time of its most recent accepted share.
#[derive(Debug, Clone)]
pub struct RigRow {
    pub uid: i64,
    pub rid: i64,
    pub name: String,
    pub last_share: Option<i64>,
}

/// Mined-block projection served on the blocks pages.
///
/// `time` is wall-clock; `miner` is already anonymity-resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRow {
    pub blk_id: i64,
    pub txid: Option<String>,
    pub height: i64,
    pub time: i64,
    pub reward: i64,
    pub total_shares: i64,
    pub difficulty: i64,
    pub status: i64,
    pub miner: String,
}

/// Payment projection served on the payments pages; one row per payout
/// transaction. `time` is wall-clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRow {
    pub payment_number: i64,
    pub txid: String,
    pub status: i64,
    pub paid: i64,
    pub fee: i64,
    pub payees: i64,
    pub time: i64,
}

/// One entry of the merged per-user credits/debits ledger. `time` is
/// wall-clock; `running_total` is the cumulative balance over the merged
/// time-ordered sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    pub blk_id: Option<i64>,
    pub height: Option<i64>,
    pub txid: Option<String>,
    pub amount: i64,
    pub running_total: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub time: i64,
    pub status: i64,
}

/// Block totals broken down by status code (`-1` orphaned .. `5` closed).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockCounts {
    pub blocks_total: i64,
    pub blocks_orphaned: i64,
    pub blocks_failed: i64,
    pub blocks_ok: i64,
    pub blocks_tx_seen: i64,
    pub blocks_credited: i64,
    pub blocks_matured: i64,
    pub blocks_closed: i64,
    pub total_mined: i64,
}

/// Payment totals broken down by status code (`-1`, `0`, `1`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentCounts {
    pub payment_total: i64,
    pub payment_orphaned: i64,
    pub payment_pending: i64,
    pub payment_matured: i64,
    pub total_paid: i64,
    pub total_fee: i64,
    pub total_payees: i64,
}

/// Share/difficulty sums over one effort window. `size` is 100, 1000, or
/// 0 for the all-blocks window.
#[derive(Debug, Clone)]
pub struct EffortRow {
    pub size: i64,
    pub total_shares: i64,
    pub difficulty: i64,
}

/// One rollup sample: share rate at `tsample`, in shares per second.
#[derive(Debug, Clone, Copy)]
pub struct RollupPoint {
    pub tsample: i64,
    pub rate: f64,
}

/// Matured-block count for one wall-clock hour bucket.
#[derive(Debug, Clone, Copy)]
pub struct HourCount {
    pub hour: i64,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_projection_serialization() {
        let block = BlockRow {
            blk_id: 9,
            txid: Some("ab".to_string()),
            height: 1_000,
            time: 1_262_304_000,
            reward: 350,
            total_shares: 12,
            difficulty: 4_000,
            status: 4,
            miner: "anon".to_string(),
        };

        let json = serde_json::to_string(&block).unwrap();
        let deserialized: BlockRow = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.height, 1_000);
        assert_eq!(deserialized.miner, "anon");
    }

    #[test]
    fn test_ledger_kind_serializes_as_type() {
        let entry = LedgerRow {
            blk_id: Some(1),
            height: Some(10),
            txid: None,
            amount: -50,
            running_total: 100,
            kind: "debit_payment".to_string(),
            time: 0,
            status: 1,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "debit_payment");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_resolution_parameters() {
        assert_eq!(Resolution::FiveMin.interval(), 300);
        assert_eq!(Resolution::FiveMin.period(), 900);
        assert_eq!(Resolution::OneHour.interval(), 3600);
        assert_eq!(Resolution::OneHour.period(), 3600);
    }
}
