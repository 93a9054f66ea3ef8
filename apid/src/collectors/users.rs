//! Per-user metric collectors: directory, balances, rigs, hashrates.

use crate::collectors::global::window_rate;
use crate::error::Result;
use crate::types::{
    ActiveCounts, BalanceEntry, HashrateEntry, RigEntry, TopMiner, UserKey, UserMap, UserRecord,
};
use pool_store::time;
use pool_store::PoolStore;
use std::collections::{BTreeMap, HashSet};

/// A rig is active if it submitted a share in the last 15 minutes.
const ACTIVE_WINDOW_SECS: i64 = 900;

/// Full user directory with rig rosters and derived ban state.
///
/// Replaced wholesale every 30 seconds so ban lifts take effect without
/// extra bookkeeping; also refreshed out-of-band after registrations.
pub async fn user_directory(
    store: &dyn PoolStore,
    now: i64,
) -> Result<BTreeMap<i64, UserRecord>> {
    let rows = store.users_with_rigs_and_bans().await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let ban_lift_time: Vec<i64> =
                row.ban_lift_time.iter().map(|t| time::db_to_wall(*t)).collect();
            let is_banned = ban_lift_time.iter().any(|lift_time| *lift_time > now);
            let record = UserRecord {
                uid: row.uid,
                username: row.username,
                wallet: row.wallet,
                diff_target: row.diff_target,
                payment_threshold: row.payment_threshold,
                anon_leader: row.anon_leader,
                rigs_rid: row.rigs_rid,
                rigs_name: row.rigs_name,
                ban_lift_time,
                ban_msg: row.ban_msg,
                is_banned,
            };
            (record.uid, record)
        })
        .collect())
}

/// Per-user balances with sub-type sums and roll-up totals. The pool
/// bucket holds zeroed totals for the no-user case.
pub async fn balances(store: &dyn PoolStore) -> Result<UserMap<BalanceEntry>> {
    let mut users_balance = UserMap::with_pool(BalanceEntry::default());

    for row in store.user_balances().await? {
        let credits_pending = row.credits_pending_reward
            + row.credits_pending_admin
            + row.credits_pending_bonus
            + row.credits_pending_dev;
        let credits_matured = row.credits_matured_reward
            + row.credits_matured_admin
            + row.credits_matured_bonus
            + row.credits_matured_dev;
        let debits = row.debits_paid + row.debits_admin + row.debits_fee;

        users_balance.insert(
            UserKey::from_uid(row.uid),
            BalanceEntry {
                wallet: row.wallet,
                payment_threshold: row.payment_threshold,
                credits_pending_reward: row.credits_pending_reward,
                credits_pending_admin: row.credits_pending_admin,
                credits_pending_bonus: row.credits_pending_bonus,
                credits_pending_dev: row.credits_pending_dev,
                credits_matured_reward: row.credits_matured_reward,
                credits_matured_admin: row.credits_matured_admin,
                credits_matured_bonus: row.credits_matured_bonus,
                credits_matured_dev: row.credits_matured_dev,
                debits_paid: row.debits_paid,
                debits_admin: row.debits_admin,
                debits_fee: row.debits_fee,
                credits_pending,
                credits_matured,
                debits,
            },
        );
    }

    Ok(users_balance)
}

/// Every rig with its activity state, plus the pool-wide active miner and
/// worker counts accumulated in the same pass.
pub async fn rigs(
    store: &dyn PoolStore,
    now: i64,
) -> Result<(ActiveCounts, UserMap<Vec<RigEntry>>)> {
    let mut active = ActiveCounts::default();
    let mut users_rigs: UserMap<Vec<RigEntry>> = UserMap::new();
    let mut active_uids = HashSet::new();

    let ago15m = now - ACTIVE_WINDOW_SECS;
    for row in store.rigs_with_last_share().await? {
        let last_share = row.last_share.map(time::db_to_wall).unwrap_or(0);
        let is_active = last_share > ago15m;

        users_rigs
            .entry_or_default(UserKey::from_uid(row.uid))
            .push(RigEntry {
                rid: row.rid,
                name: row.name,
                last_share,
                is_active,
            });

        if is_active {
            if active_uids.insert(row.uid) {
                active.miners += 1;
            }
            active.workers += 1;
        }
    }

    Ok((active, users_rigs))
}

/// Per-user, per-rig share rates over the trailing `duration` seconds.
pub async fn hashrates(store: &dyn PoolStore, duration: i64) -> Result<UserMap<HashrateEntry>> {
    let tsample = time::wall_to_db(time::now());
    let mut users_hashrate: UserMap<HashrateEntry> = UserMap::new();

    for row in store.users_hashrate_window(tsample, duration).await? {
        let rate = window_rate(row.tstart, tsample, row.count);
        let entry = users_hashrate.entry_or_default(UserKey::from_uid(row.uid));
        entry.rigs.insert(row.rid, rate);
        entry.total += rate;
    }

    Ok(users_hashrate)
}

/// Per-user share counts since a wall-clock cutoff; pool total under the
/// pool bucket.
pub async fn shares_since(store: &dyn PoolStore, cutoff: i64) -> Result<UserMap<i64>> {
    let mut users_shares: UserMap<i64> = UserMap::new();

    for row in store.user_shares_since(time::wall_to_db(cutoff)).await? {
        users_shares.insert(UserKey::from_uid(row.uid), row.count);
    }

    Ok(users_shares)
}

/// Top miners by 15-minute hashrate, pool bucket and idle users excluded.
/// Ties keep the directory order (uid ascending) thanks to the stable
/// sort over the ordered map.
pub fn top_miners(
    users: &BTreeMap<i64, UserRecord>,
    users_rigs: &UserMap<Vec<RigEntry>>,
    users_hashrate_15m: &UserMap<HashrateEntry>,
    count: usize,
) -> Vec<TopMiner> {
    let mut hashrates: Vec<(i64, u64)> = users_hashrate_15m
        .iter()
        .filter(|(key, entry)| *key != UserKey::Pool && entry.total > 0)
        .map(|(key, entry)| (key.as_i64(), entry.total))
        .collect();
    hashrates.sort_by(|a, b| b.1.cmp(&a.1));

    hashrates
        .into_iter()
        .take(count)
        .filter_map(|(uid, hashrate)| users.get(&uid).map(|user| (uid, hashrate, user)))
        .enumerate()
        .map(|(i, (uid, hashrate, user))| {
            let username = if user.anon_leader {
                "anon".to_string()
            } else {
                user.username.clone()
            };
            let last_share = users_rigs
                .get(UserKey::from_uid(uid))
                .map(|rigs| rigs.iter().map(|rig| rig.last_share).max().unwrap_or(0))
                .unwrap_or(0);

            TopMiner {
                number: i + 1,
                username,
                hashrate,
                last_share,
            }
        })
        .collect()
}
