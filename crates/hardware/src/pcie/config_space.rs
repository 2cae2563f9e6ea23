//! Type 0 configuration space emulation.
//!
//! This module implements the configuration header of one endpoint function. It provides:
//! 1. **Header:** Identity, command/status, class code, header type and interrupt line.
//! 2. **BARs:** Masked base address registers that answer the all-ones sizing write.
//! 3. **PCI Express capability:** Device Capabilities and Device Control, through which the
//!    root complex negotiates the max payload and max read request sizes.
//!
//! Registers are accessed one dword at a time with byte enables, the same granularity a
//! configuration TLP carries.

use tracing::{trace, warn};

use super::bar::{BarKind, BarLayout};
use crate::common::constants::{
    BAR_COUNT, CONFIG_SPACE_SIZE, bytes_to_size_code, cfg, command, pcie_cap,
    size_code_to_bytes, status,
};

/// PCI Express Capabilities register: version 2, endpoint.
const PCIE_CAPS_REG: u32 = 0x0002;

/// Default Device Control value: MPS 128 bytes, MRRS 512 bytes.
const DEVCTL_RESET: u16 = 2 << pcie_cap::DEVCTL_MRRS_SHIFT;

/// Identity registers of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareIds {
    /// Vendor id.
    pub vendor_id: u16,
    /// Device id.
    pub device_id: u16,
    /// 24-bit class code (base, sub, prog-if).
    pub class_code: u32,
    /// Revision id.
    pub revision_id: u8,
    /// Subsystem vendor id.
    pub subsystem_vendor_id: u16,
    /// Subsystem id.
    pub subsystem_id: u16,
}

/// Emulated Type 0 configuration header plus a PCI Express capability.
#[derive(Debug, Clone)]
pub struct ConfigSpace {
    ids: HardwareIds,
    multi_function: bool,
    command: u16,
    cache_line_size: u8,
    latency_timer: u8,
    interrupt_line: u8,
    base_addresses: [u32; BAR_COUNT],
    bar_masks: [u32; BAR_COUNT],
    layouts: [Option<BarLayout>; BAR_COUNT],
    max_payload_supported: u8,
    devctl: u16,
}

impl ConfigSpace {
    /// Creates a configuration space with no BARs.
    ///
    /// # Arguments
    ///
    /// * `ids` - Identity registers.
    /// * `max_payload` - Largest payload advertised in Device Capabilities, in bytes.
    pub fn new(ids: HardwareIds, max_payload: usize) -> Self {
        Self {
            ids,
            multi_function: false,
            command: 0,
            cache_line_size: 0,
            latency_timer: 0,
            interrupt_line: 0,
            base_addresses: [0; BAR_COUNT],
            bar_masks: [0; BAR_COUNT],
            layouts: [None; BAR_COUNT],
            max_payload_supported: bytes_to_size_code(max_payload),
            devctl: DEVCTL_RESET,
        }
    }

    /// Sets bit 7 of the header type register.
    pub const fn set_multi_function(&mut self, multi: bool) {
        self.multi_function = multi;
    }

    /// Returns the identity registers.
    pub const fn ids(&self) -> &HardwareIds {
        &self.ids
    }

    /// Installs a BAR layout in slot `index`; a 64-bit layout also claims `index + 1`.
    pub fn set_bar(&mut self, index: usize, layout: BarLayout) {
        let (low, high) = layout.address_masks();
        let previous = self.layouts[index].take();
        if previous.is_some_and(|old| old.kind == BarKind::Memory64) && index + 1 < BAR_COUNT {
            self.bar_masks[index + 1] = 0;
            self.base_addresses[index + 1] = 0;
        }
        self.bar_masks[index] = low;
        self.base_addresses[index] = layout.type_bits();
        if layout.kind == BarKind::Memory64 {
            self.bar_masks[index + 1] = high;
            self.base_addresses[index + 1] = 0;
            self.layouts[index + 1] = None;
        }
        self.layouts[index] = Some(layout);
    }

    /// Returns the layout installed in slot `index`.
    pub fn bar_layout(&self, index: usize) -> Option<BarLayout> {
        self.layouts.get(index).copied().flatten()
    }

    /// Returns the address currently programmed into BAR `index`.
    pub fn bar_address(&self, index: usize) -> Option<u64> {
        let layout = self.bar_layout(index)?;
        let low = u64::from(self.base_addresses[index] & self.bar_masks[index]);
        let high = match layout.kind {
            BarKind::Memory64 => u64::from(self.base_addresses[index + 1]) << 32,
            _ => 0,
        };
        Some(high | low)
    }

    /// Current command register.
    pub const fn command(&self) -> u16 {
        self.command
    }

    /// Memory Space Enable.
    pub const fn memory_enabled(&self) -> bool {
        self.command & command::MEMORY_ENABLE != 0
    }

    /// Bus Master Enable.
    pub const fn bus_master_enabled(&self) -> bool {
        self.command & command::BUS_MASTER != 0
    }

    /// Negotiated max payload size in bytes.
    pub const fn max_payload_size(&self) -> usize {
        size_code_to_bytes(self.mps_code())
    }

    /// Negotiated max payload size as the 3-bit encoding.
    pub const fn mps_code(&self) -> u8 {
        ((self.devctl >> pcie_cap::DEVCTL_MPS_SHIFT) as u32 & pcie_cap::SIZE_FIELD_MASK) as u8
    }

    /// Programmed max read request size in bytes.
    pub const fn max_read_request(&self) -> usize {
        size_code_to_bytes(
            ((self.devctl >> pcie_cap::DEVCTL_MRRS_SHIFT) as u32 & pcie_cap::SIZE_FIELD_MASK) as u8,
        )
    }

    /// Finds the memory BAR that decodes `addr`.
    ///
    /// # Returns
    ///
    /// `(bar index, offset into the BAR)` when memory decoding is enabled and an assigned
    /// memory BAR covers `addr`.
    pub fn decode_memory(&self, addr: u64) -> Option<(usize, u64)> {
        if !self.memory_enabled() {
            return None;
        }
        (0..BAR_COUNT).find_map(|i| {
            let layout = self.bar_layout(i)?;
            if layout.kind == BarKind::Io {
                return None;
            }
            let base = self.bar_address(i)?;
            (base != 0 && addr >= base && addr - base < layout.size).then(|| (i, addr - base))
        })
    }

    /// Reads the dword at `reg`.
    pub fn read_u32(&self, reg: u16) -> u32 {
        let reg = reg & !3;
        match reg {
            cfg::ID => u32::from(self.ids.device_id) << 16 | u32::from(self.ids.vendor_id),
            cfg::STATUS_COMMAND => u32::from(status::CAP_LIST) << 16 | u32::from(self.command),
            cfg::CLASS_REVISION => (self.ids.class_code & 0xFF_FFFF) << 8 | u32::from(self.ids.revision_id),
            cfg::BIST_HEADER => {
                let header = if self.multi_function { 0x80 } else { 0x00 };
                header << 16 | u32::from(self.latency_timer) << 8 | u32::from(self.cache_line_size)
            }
            r if (cfg::BAR0..cfg::BAR0 + 4 * BAR_COUNT as u16).contains(&r) => {
                self.base_addresses[usize::from((r - cfg::BAR0) / 4)]
            }
            cfg::SUBSYSTEM_ID => {
                u32::from(self.ids.subsystem_id) << 16 | u32::from(self.ids.subsystem_vendor_id)
            }
            cfg::CAP_PTR => u32::from(pcie_cap::OFFSET),
            cfg::INTERRUPT => u32::from(self.interrupt_line),
            r if r == pcie_cap::OFFSET => PCIE_CAPS_REG << 16 | u32::from(pcie_cap::ID),
            r if r == pcie_cap::OFFSET + pcie_cap::DEVICE_CAPS => {
                u32::from(self.max_payload_supported)
            }
            r if r == pcie_cap::OFFSET + pcie_cap::DEVICE_CONTROL => u32::from(self.devctl),
            r if r < CONFIG_SPACE_SIZE => 0,
            r => {
                warn!(reg = r, "config read beyond the legacy configuration space");
                0
            }
        }
    }

    /// Writes the dword at `reg` under byte enables `be`.
    pub fn write_u32(&mut self, reg: u16, value: u32, be: u8) {
        let reg = reg & !3;
        let mask = (0..4).fold(0u32, |m, i| if be & (1 << i) != 0 { m | 0xFF << (8 * i) } else { m });
        if mask == 0 {
            return;
        }
        let merged = (self.read_u32(reg) & !mask) | (value & mask);
        trace!(reg, value = merged, "config write");
        match reg {
            cfg::STATUS_COMMAND => {
                // Status bits are RO or RW1C; none are ever set here.
                self.command = merged as u16 & command::WRITABLE;
            }
            cfg::BIST_HEADER => {
                self.cache_line_size = merged as u8;
                self.latency_timer = (merged >> 8) as u8;
            }
            r if (cfg::BAR0..cfg::BAR0 + 4 * BAR_COUNT as u16).contains(&r) => {
                let index = usize::from((r - cfg::BAR0) / 4);
                if self.memory_enabled() {
                    warn!(index, "BAR write ignored while memory decoding is enabled");
                    return;
                }
                let type_bits = self.layouts[index].map_or(0, |l| l.type_bits());
                self.base_addresses[index] = (merged & self.bar_masks[index]) | type_bits;
            }
            cfg::INTERRUPT => self.interrupt_line = merged as u8,
            r if r == pcie_cap::OFFSET + pcie_cap::DEVICE_CONTROL => {
                self.devctl = merged as u16 & 0x7FFF;
            }
            r if r < CONFIG_SPACE_SIZE => {}
            r => warn!(reg = r, "config write beyond the legacy configuration space"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::bar;

    fn space() -> ConfigSpace {
        let mut cs = ConfigSpace::new(
            HardwareIds {
                vendor_id: 0x1234,
                device_id: 0x0001,
                class_code: 0x058000,
                ..HardwareIds::default()
            },
            512,
        );
        cs.set_bar(0, BarLayout::new(0, 16 << 20, BarKind::Memory64, false).unwrap());
        cs
    }

    #[test]
    fn sizing_write_reads_back_the_mask() {
        let mut cs = space();
        cs.write_u32(cfg::BAR0, 0xFFFF_FFFF, 0xF);
        cs.write_u32(cfg::BAR0 + 4, 0xFFFF_FFFF, 0xF);
        assert_eq!(cs.read_u32(cfg::BAR0), 0xFF00_0000 | bar::TYPE_64BIT);
        assert_eq!(cs.read_u32(cfg::BAR0 + 4), 0xFFFF_FFFF);
        // Unimplemented BARs read zero even after the sizing write.
        cs.write_u32(cfg::BAR0 + 8, 0xFFFF_FFFF, 0xF);
        assert_eq!(cs.read_u32(cfg::BAR0 + 8), 0);
    }

    #[test]
    fn decode_requires_memory_enable() {
        let mut cs = space();
        cs.write_u32(cfg::BAR0, 0x8000_0000, 0xF);
        cs.write_u32(cfg::BAR0 + 4, 0, 0xF);
        assert_eq!(cs.decode_memory(0x8000_1000), None);
        cs.write_u32(cfg::STATUS_COMMAND, u32::from(command::MEMORY_ENABLE), 0x3);
        assert_eq!(cs.decode_memory(0x8000_1000), Some((0, 0x1000)));
        assert_eq!(cs.decode_memory(0x8100_0000), None);
    }

    #[test]
    fn byte_enables_limit_the_write() {
        let mut cs = space();
        cs.write_u32(cfg::INTERRUPT, 0xAB, 0x0);
        assert_eq!(cs.read_u32(cfg::INTERRUPT) & 0xFF, 0);
        cs.write_u32(cfg::INTERRUPT, 0xAB, 0x1);
        assert_eq!(cs.read_u32(cfg::INTERRUPT) & 0xFF, 0xAB);
    }

    #[test]
    fn device_control_sets_mps_and_mrrs() {
        let mut cs = space();
        assert_eq!(cs.max_payload_size(), 128);
        assert_eq!(cs.read_u32(pcie_cap::OFFSET + pcie_cap::DEVICE_CAPS) & 7, 2);
        let devctl = (1 << pcie_cap::DEVCTL_MPS_SHIFT) | (2 << pcie_cap::DEVCTL_MRRS_SHIFT);
        cs.write_u32(pcie_cap::OFFSET + pcie_cap::DEVICE_CONTROL, devctl, 0x3);
        assert_eq!(cs.max_payload_size(), 256);
        assert_eq!(cs.max_read_request(), 512);
    }
}
