//! Cache-management MCP tools.
//!
//! This module provides tools for inspecting, clearing and shrinking the image cache.

pub mod clear;
pub mod optimize;
pub mod stats;

pub use clear::clear_impl;
pub use optimize::{memory_pressure_impl, optimize_impl};
pub use stats::stats_impl;
