//! Base Address Register layouts and host-side BAR windows.

use crate::common::constants::bar;
use crate::common::{HarnessError, HarnessResult, PcieId};

/// Address space a BAR decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum BarKind {
    /// 32-bit memory BAR.
    Memory32,
    /// 64-bit memory BAR; consumes the following BAR slot as its upper half.
    #[default]
    Memory64,
    /// I/O space BAR.
    Io,
}

/// Size and type of a BAR as the endpoint advertises it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarLayout {
    /// Size in bytes (power of two).
    pub size: u64,
    /// Decoded address space.
    pub kind: BarKind,
    /// Prefetchable memory.
    pub prefetchable: bool,
}

impl BarLayout {
    /// Smallest memory BAR the architecture allows.
    pub const MIN_MEMORY_SIZE: u64 = 16;
    /// Smallest I/O BAR the architecture allows.
    pub const MIN_IO_SIZE: u64 = 4;

    /// Validates a layout for BAR slot `index`.
    ///
    /// # Returns
    ///
    /// The layout, or `InvalidBarIndex` / `InvalidBarSize` if it cannot be encoded.
    pub fn new(index: usize, size: u64, kind: BarKind, prefetchable: bool) -> HarnessResult<Self> {
        let slots = if kind == BarKind::Memory64 { 2 } else { 1 };
        if index + slots > crate::common::constants::BAR_COUNT {
            return Err(HarnessError::InvalidBarIndex(index));
        }
        let (min, max) = match kind {
            BarKind::Memory32 => (Self::MIN_MEMORY_SIZE, 1 << 31),
            BarKind::Memory64 => (Self::MIN_MEMORY_SIZE, 1 << 63),
            BarKind::Io => (Self::MIN_IO_SIZE, 1 << 16),
        };
        if !size.is_power_of_two() || size < min || size > max {
            return Err(HarnessError::InvalidBarSize { index, size });
        }
        Ok(Self {
            size,
            kind,
            prefetchable: prefetchable && kind != BarKind::Io,
        })
    }

    /// Read-only type bits in the low BAR dword.
    pub const fn type_bits(&self) -> u32 {
        match self.kind {
            BarKind::Io => bar::IO_SPACE,
            BarKind::Memory32 => {
                if self.prefetchable {
                    bar::PREFETCHABLE
                } else {
                    0
                }
            }
            BarKind::Memory64 => {
                bar::TYPE_64BIT | if self.prefetchable { bar::PREFETCHABLE } else { 0 }
            }
        }
    }

    /// Writable address masks for the low dword and (for 64-bit BARs) the high dword.
    pub const fn address_masks(&self) -> (u32, u32) {
        let mask64 = !(self.size - 1);
        match self.kind {
            BarKind::Io => (mask64 as u32 & bar::IO_ADDR_MASK, 0),
            BarKind::Memory32 => (mask64 as u32 & bar::MEM_ADDR_MASK, 0),
            BarKind::Memory64 => ((mask64 as u32) & bar::MEM_ADDR_MASK, (mask64 >> 32) as u32),
        }
    }
}

/// A BAR as assigned by the root complex: the host address range that reaches it.
///
/// Windows are plain values; every transfer goes through the owning `RootComplex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarWindow {
    /// Function the window belongs to.
    pub function: PcieId,
    /// BAR slot.
    pub index: usize,
    /// Assigned host address.
    pub base: u64,
    /// Window size in bytes.
    pub size: u64,
    /// Decoded address space.
    pub kind: BarKind,
    /// Prefetchable memory.
    pub prefetchable: bool,
}

impl BarWindow {
    /// Translates a window-relative access into a host address.
    ///
    /// # Returns
    ///
    /// `BarOutOfRange` unless `[offset, offset + len)` lies inside the window.
    pub fn translate(&self, offset: u64, len: usize) -> HarnessResult<u64> {
        let len = len as u64;
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(self.base + offset),
            _ => Err(HarnessError::BarOutOfRange {
                index: self.index,
                offset,
                len,
                size: self.size,
            }),
        }
    }

    /// Returns `true` if `addr` falls inside the window.
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }
}
