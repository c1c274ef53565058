//! Generation fencing and rebuild.
//!
//! This module contains:
//! - [`generation`] - Generation numbers and the stale-message fence
//! - [`inventory`] - Per-node replica inventory (local unit map)
//! - [`coordinator`] - Generation proposal and inventory rebuild

pub mod coordinator;
pub mod generation;
pub mod inventory;
