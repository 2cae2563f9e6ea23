//! Common utilities and types used throughout the harness.
//!
//! This module provides fundamental building blocks that are shared across all components
//! of the testbench. It includes:
//! 1. **Identity Types:** The bus/device/function triple and page-boundary helpers.
//! 2. **Constants:** Bus widths, configuration-space offsets and command bits.
//! 3. **Time:** The picosecond time cursor type and its units.
//! 4. **Error Handling:** The harness error enum and mismatch reports.

/// Identity and address helpers.
pub mod addr;

/// Protocol constants shared by the PCIe and AXI models.
pub mod constants;

/// Error types and mismatch reports.
pub mod error;

/// Simulated time and units.
pub mod time;

pub use addr::PcieId;
pub use error::{AccessKind, HarnessError, HarnessResult, Mismatch};
pub use time::{SimTime, TimeUnit};
