//! PCIe identity and address helpers.
//!
//! This module defines the strong types used to name functions and address windows on the
//! simulated link. It provides the following:
//! 1. **Identity:** `PcieId`, the bus/device/function triple used as requester and completer id.
//! 2. **Packing:** Conversion to and from the 16-bit routing id carried in TLP headers.
//! 3. **Boundaries:** Helpers for the 4 KiB rule that every TLP and AXI burst must respect.

use std::fmt;

use super::constants::{PAGE_OFFSET_MASK, PAGE_SIZE};

/// Bus/device/function identity of a PCIe function.
///
/// The root complex assigns the bus number during enumeration and the function captures it
/// from the first Type 0 configuration write it receives. Ordering follows the packed 16-bit
/// routing id, so maps keyed by `PcieId` iterate in topology order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PcieId {
    /// Bus number (0-255).
    pub bus: u8,
    /// Device number (0-31).
    pub device: u8,
    /// Function number (0-7).
    pub function: u8,
}

impl PcieId {
    /// Creates a new identity.
    ///
    /// # Arguments
    ///
    /// * `bus` - Bus number.
    /// * `device` - Device number; only the low 5 bits are kept.
    /// * `function` - Function number; only the low 3 bits are kept.
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device: device & 0x1F,
            function: function & 0x07,
        }
    }

    /// Packs the identity into the 16-bit routing id (`bus << 8 | dev << 3 | fn`).
    pub const fn to_u16(self) -> u16 {
        ((self.bus as u16) << 8) | ((self.device as u16) << 3) | (self.function as u16)
    }

    /// Unpacks a 16-bit routing id.
    pub const fn from_u16(raw: u16) -> Self {
        Self {
            bus: (raw >> 8) as u8,
            device: ((raw >> 3) & 0x1F) as u8,
            function: (raw & 0x07) as u8,
        }
    }

    /// Returns the identity of another function on the same bus and device.
    pub const fn with_function(self, function: u8) -> Self {
        Self::new(self.bus, self.device, function)
    }
}

impl From<PcieId> for u16 {
    fn from(id: PcieId) -> Self {
        id.to_u16()
    }
}

impl From<u16> for PcieId {
    fn from(raw: u16) -> Self {
        Self::from_u16(raw)
    }
}

impl fmt::Display for PcieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Returns the number of bytes from `addr` to the next 4 KiB boundary.
#[inline]
pub const fn bytes_to_page_boundary(addr: u64) -> u64 {
    PAGE_SIZE - (addr & PAGE_OFFSET_MASK)
}

/// Returns `true` if `[addr, addr + len)` stays inside a single 4 KiB page.
#[inline]
pub const fn within_page(addr: u64, len: u64) -> bool {
    len <= bytes_to_page_boundary(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_like_the_routing_id() {
        assert_eq!(PcieId::new(1, 0, 0).to_u16(), 0x0100);
        assert_eq!(PcieId::new(0, 2, 0).to_u16(), 0x0010);
        assert_eq!(PcieId::new(0, 1, 1).to_u16(), 0x0009);
        assert_eq!(PcieId::from_u16(0xFFFF), PcieId::new(255, 31, 7));
    }

    #[test]
    fn display_is_bdf() {
        assert_eq!(PcieId::new(1, 0, 0).to_string(), "01:00.0");
    }

    #[test]
    fn page_boundary_math() {
        assert_eq!(bytes_to_page_boundary(0x1000), 4096);
        assert_eq!(bytes_to_page_boundary(0x1FFF), 1);
        assert!(within_page(0x1000, 4096));
        assert!(!within_page(0x1001, 4096));
    }
}
