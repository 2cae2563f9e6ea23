//! # Unit Components
//!
//! Tests grouped by the component they exercise.

/// Configuration defaults, JSON loading and validation.
pub mod config;

/// Scheduler, clock and kernel waits.
pub mod sim;

/// Enumeration, enablement and BAR window transactions.
pub mod pcie;

/// AXI memory behaviour as seen through the bridge.
pub mod axi;

/// The reset/enumerate/enable/sweep driver.
pub mod protocol;

/// Counter collection.
pub mod stats;
