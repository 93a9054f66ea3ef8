//! Conversions between the store's epoch and wall-clock time.
//!
//! Share and block timestamps are persisted relative to 2010-01-01 UTC to
//! keep them inside 32 bits for the lifetime of the pool.

use std::time::{SystemTime, UNIX_EPOCH};

/// Offset between the store epoch (2010-01-01 UTC) and the Unix epoch.
pub const EPOCH_OFFSET: i64 = 1_262_304_000;

/// Current wall-clock time in whole Unix seconds.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub fn db_to_wall(db_time: i64) -> i64 {
    db_time + EPOCH_OFFSET
}

pub fn wall_to_db(walltime: i64) -> i64 {
    walltime - EPOCH_OFFSET
}

pub fn start_of_minute(time: i64) -> i64 {
    time - time.rem_euclid(60)
}

pub fn start_of_5_min(time: i64) -> i64 {
    time - time.rem_euclid(300)
}

pub fn start_of_hour(time: i64) -> i64 {
    time - time.rem_euclid(3600)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_round_trip() {
        assert_eq!(db_to_wall(0), EPOCH_OFFSET);
        assert_eq!(wall_to_db(EPOCH_OFFSET), 0);
        assert_eq!(wall_to_db(db_to_wall(123_456)), 123_456);
    }

    #[test]
    fn test_bucket_floors() {
        assert_eq!(start_of_minute(119), 60);
        assert_eq!(start_of_minute(120), 120);
        assert_eq!(start_of_5_min(1_299), 1_200);
        assert_eq!(start_of_5_min(1_500), 1_500);
        assert_eq!(start_of_hour(7_199), 3_600);
        assert_eq!(start_of_hour(7_200), 7_200);
    }
}
