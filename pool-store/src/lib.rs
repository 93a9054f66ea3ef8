//! Persistent-store boundary for the pool dashboard daemon.
//!
//! This crate owns the SQLite schema and every query the stats engine
//! issues: share windows, the PPLNS cumulative scan, block/payment/ledger
//! pages, and the persisted hashrate rollup tables.

pub mod storage;
pub mod time;
pub mod types;

pub use storage::{PoolStore, SqliteStore, StoreError};
pub use types::Resolution;
