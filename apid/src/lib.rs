//! Collection, aggregation and caching engine behind the pool dashboard.
//!
//! A tiered scheduler pulls raw operational data (shares, blocks, payments,
//! balances) out of the store, derives aggregate metrics and publishes them
//! as immutable snapshots that serve reads without touching the store.

pub mod api;
pub mod cache;
pub mod collectors;
pub mod config;
pub mod error;
pub mod graphs;
pub mod pages;
pub mod scheduler;
pub mod types;

pub use config::Config;
pub use error::EngineError;
pub use scheduler::{Scheduler, StatsEngine};
