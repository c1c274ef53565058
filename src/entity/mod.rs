//! Failover unit state and cache.
//!
//! This module contains:
//! - [`id`] - Unit, node, and node-instance identifiers
//! - [`failover_unit`] - Replica-set state for one unit
//! - [`cache`] - Concurrent unit cache with FIFO exclusive checkout
//! - [`handle`] - Checkout and update handles

pub mod cache;
pub mod failover_unit;
pub mod handle;
pub mod id;
