//! Testbench assembly and the test protocol driver.
//!
//! 1. **Testbench:** Builds the kernel, DUT, AXI memory, device adapter and root complex from a
//!    `Config`, and drives the reset pulse.
//! 2. **Protocol:** The reset/enumerate/enable/sweep state sequence and its reports.

/// Reset, enumeration and length sweeps.
pub mod protocol;

/// Bench assembly.
pub mod testbench;

pub use protocol::{
    CaseResult, ReadTest, TestFailure, TestReport, TestState, WriteTest, read_pattern,
    run_read_test, run_write_test, write_pattern,
};
pub use testbench::Testbench;
