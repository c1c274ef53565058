//! Core infrastructure.
//!
//! This module contains:
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error types and the recoverable/fatal taxonomy

pub mod config;
pub mod error;
