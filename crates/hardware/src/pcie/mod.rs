//! PCIe side of the harness.
//!
//! This module models everything upstream of the DUT. It provides:
//! 1. **Packets:** `Tlp` and its header, plus the beat streams the DUT consumes and produces.
//! 2. **Endpoint:** Configuration space, BARs and functions, wrapped by the `PcieIfDevice`
//!    adapter that converts between link TLPs and the DUT's streaming interfaces.
//! 3. **Root complex:** Enumeration, BAR assignment, device enablement and memory
//!    transactions through BAR windows.

/// BAR layouts and host-side windows.
pub mod bar;

/// Beat-level TLP streams on the DUT boundary.
pub mod bus;

/// Type 0 configuration space.
pub mod config_space;

/// Device adapter and the endpoint trait.
pub mod device;

/// A single endpoint function.
pub mod function;

/// Root complex and root ports.
pub mod root_complex;

/// Transaction layer packets.
pub mod tlp;

pub use bar::{BarKind, BarLayout, BarWindow};
pub use config_space::{ConfigSpace, HardwareIds};
pub use device::{AdapterStats, PcieEndpoint, PcieIfDevice};
pub use function::PcieFunction;
pub use root_complex::{DeviceHandle, RcStats, RootComplex};
pub use tlp::{CplStatus, Tlp, TlpHeader, TlpType};
