//! PCIe-to-AXI bridge verification harness.
//!
//! This crate drives a PCIe-to-AXI bridge model from the PCIe side and checks what reaches its
//! AXI memory. It provides:
//! 1. **Kernel:** A discrete-event scheduler, a clock and two-phase signals.
//! 2. **PCIe:** TLPs, an endpoint device adapter with configuration space and BARs, and a root
//!    complex that enumerates, enables and issues memory transactions.
//! 3. **AXI:** The AXI4 channel records and a RAM target with an acknowledgement log.
//! 4. **DUT:** The pin record, the `Dut` trait and a behavioral reference bridge.
//! 5. **Testbench:** Bench assembly, the reset/enumerate/enable/sweep protocol and statistics.

/// AXI4 bus records and the RAM target.
pub mod axi;
/// Identity, constants, time and errors.
pub mod common;
/// Harness configuration (defaults, JSON loading, validation).
pub mod config;
/// DUT pins, the model trait and the reference bridge.
pub mod dut;
/// TLPs, device adapter and root complex.
pub mod pcie;
/// Scheduler, clock, signals and the kernel loop.
pub mod sim;
/// Counter collection and reporting.
pub mod stats;
/// Bench assembly and the test protocol driver.
pub mod tb;

/// Root configuration type; use `Config::default()` or load JSON with `Config::from_file`.
pub use crate::config::Config;
/// Error type returned by every harness operation.
pub use crate::common::{HarnessError, HarnessResult};
/// Simulation kernel; owns the DUT and the AXI memory.
pub use crate::sim::Simulator;
/// Complete bench; construct with `Testbench::new`.
pub use crate::tb::Testbench;
