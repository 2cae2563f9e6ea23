//! # Harness Testing Library
//!
//! This module serves as the central entry point for the testbench test suite. It organizes
//! unit tests for each component and the shared utilities they build on.

/// Shared test infrastructure.
///
/// This module provides:
/// - **Harness**: A `TestContext` that assembles a bench with quiet, fast settings.
/// - **Mocks**: Mock DUTs for failure-path tests.
pub mod common;

/// Unit tests for the harness components.
///
/// Fine-grained tests for the kernel, the PCIe models, the AXI memory and the protocol driver.
pub mod unit;
