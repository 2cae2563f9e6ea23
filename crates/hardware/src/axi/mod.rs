//! AXI4 manager interface and target memory.
//!
//! This module covers the bridge's downstream side:
//! 1. **Bus:** Channel payload types and the five-channel `AxiBus` record.
//! 2. **Memory:** `AxiRam`, the target the bridge writes into and reads from.

/// Channel payloads and the bus record.
pub mod bus;

/// AXI RAM target model.
pub mod ram;

pub use bus::{AxiAddr, AxiBurst, AxiBus, AxiReadData, AxiResp, AxiWriteData, AxiWriteResp};
pub use ram::{AxiRam, AxiRamStats, WriteAck};
