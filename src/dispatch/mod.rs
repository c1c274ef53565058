//! Message intake.
//!
//! This module contains:
//! - [`message`] - Inbound protocol message shapes
//! - [`demux`] - Fence-first message intake and demultiplexing

pub mod demux;
pub mod message;
