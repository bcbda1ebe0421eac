//! Monitoring aggregator for the Nginx Vhost Traffic Status plugin.
//!
//! The plugin exports monotonically increasing counters per zone (status
//! codes, request methods, protocols, cache outcomes, server zones). This
//! crate scrapes those snapshots in regular intervals, turns counter
//! differences into per-interval counts, rates, and latency percentiles,
//! derives summary zones (`2xx`, `total`, `cache_other`), and writes a
//! consolidated metrics document plus a crash-safe checkpoint.

pub mod aggregate;
pub mod checkpoint;
pub mod cli;
pub mod error;
pub mod fetch;
pub mod logsink;
pub mod plot;
pub mod scrape;
pub mod snapshot;
pub mod tsdb;
