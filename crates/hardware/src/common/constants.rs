//! Global protocol constants.
//!
//! This module defines constants shared by the PCIe and AXI models. It includes:
//! 1. **Boundaries:** The 4 KiB page rule shared by TLPs and AXI bursts.
//! 2. **Bus widths:** Beat sizes of the DUT request/completion buses and the AXI data bus.
//! 3. **Configuration space:** Register offsets and bits used by enumeration.

/// Page size in bytes (4KB). Neither a TLP nor an AXI burst may cross it.
pub const PAGE_SIZE: u64 = 4096;

/// Mask for extracting the page offset from an address.
pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;

/// Bytes per data beat on the DUT TLP buses (256-bit interface).
pub const TLP_BEAT_BYTES: usize = 32;

/// Dwords per data beat on the DUT TLP buses.
pub const TLP_BEAT_DWORDS: usize = TLP_BEAT_BYTES / 4;

/// Bytes per beat on the AXI data channels (256-bit interface).
pub const AXI_DATA_BYTES: usize = 32;

/// AxSIZE encoding of a full-width AXI beat (log2 of `AXI_DATA_BYTES`).
pub const AXI_FULL_SIZE: u8 = 5;

/// Maximum number of beats in an AXI4 INCR burst.
pub const AXI_MAX_BURST_BEATS: usize = 256;

/// Size of the emulated configuration space per function (legacy 256 bytes).
pub const CONFIG_SPACE_SIZE: u16 = 0x100;

/// Number of base address registers in a Type 0 header.
pub const BAR_COUNT: usize = 6;

/// Vendor id returned for a configuration read of an absent function.
pub const VENDOR_ID_NONE: u16 = 0xFFFF;

/// Configuration register offsets of the Type 0 header.
pub mod cfg {
    /// Vendor ID (low 16 bits) and Device ID (high 16 bits).
    pub const ID: u16 = 0x00;
    /// Command (low 16 bits) and Status (high 16 bits).
    pub const STATUS_COMMAND: u16 = 0x04;
    /// Revision ID and class code.
    pub const CLASS_REVISION: u16 = 0x08;
    /// Cache line size, latency timer, header type, BIST.
    pub const BIST_HEADER: u16 = 0x0C;
    /// First base address register; BAR `n` lives at `BAR0 + 4 * n`.
    pub const BAR0: u16 = 0x10;
    /// Subsystem vendor/device id.
    pub const SUBSYSTEM_ID: u16 = 0x2C;
    /// Capabilities pointer.
    pub const CAP_PTR: u16 = 0x34;
    /// Interrupt line/pin.
    pub const INTERRUPT: u16 = 0x3C;
}

/// Command register bits.
pub mod command {
    /// I/O space decoding enable.
    pub const IO_ENABLE: u16 = 1 << 0;
    /// Memory space decoding enable.
    pub const MEMORY_ENABLE: u16 = 1 << 1;
    /// Bus master enable.
    pub const BUS_MASTER: u16 = 1 << 2;
    /// Parity error response.
    pub const PARITY_ERROR_RESPONSE: u16 = 1 << 6;
    /// SERR# enable.
    pub const SERR_ENABLE: u16 = 1 << 8;
    /// INTx disable.
    pub const INTX_DISABLE: u16 = 1 << 10;
    /// Bits software may change.
    pub const WRITABLE: u16 = IO_ENABLE
        | MEMORY_ENABLE
        | BUS_MASTER
        | PARITY_ERROR_RESPONSE
        | SERR_ENABLE
        | INTX_DISABLE;
}

/// Status register bits.
pub mod status {
    /// A capability list is present.
    pub const CAP_LIST: u16 = 1 << 4;
}

/// BAR in-band encoding bits.
pub mod bar {
    /// Bit 0: the BAR decodes I/O space.
    pub const IO_SPACE: u32 = 1 << 0;
    /// Bits 2:1 value `0b10`: 64-bit memory BAR.
    pub const TYPE_64BIT: u32 = 0b10 << 1;
    /// Bit 3: prefetchable memory.
    pub const PREFETCHABLE: u32 = 1 << 3;
    /// Address bits of a memory BAR.
    pub const MEM_ADDR_MASK: u32 = !0xF;
    /// Address bits of an I/O BAR.
    pub const IO_ADDR_MASK: u32 = !0x3;
}

/// PCI Express capability layout.
pub mod pcie_cap {
    /// Capability id of the PCI Express capability.
    pub const ID: u8 = 0x10;
    /// Offset of the capability in the emulated configuration space.
    pub const OFFSET: u16 = 0x40;
    /// Device Capabilities register, relative to the capability.
    pub const DEVICE_CAPS: u16 = 0x04;
    /// Device Control (low 16 bits) and Device Status (high 16 bits), relative.
    pub const DEVICE_CONTROL: u16 = 0x08;
    /// Max Payload Size field in Device Control (bits 7:5).
    pub const DEVCTL_MPS_SHIFT: u32 = 5;
    /// Max Read Request Size field in Device Control (bits 14:12).
    pub const DEVCTL_MRRS_SHIFT: u32 = 12;
    /// Three-bit size field mask.
    pub const SIZE_FIELD_MASK: u32 = 0x7;
}

/// Converts a 3-bit PCIe size encoding (MPS/MRRS) into bytes (128 << code).
#[inline]
pub const fn size_code_to_bytes(code: u8) -> usize {
    128 << (code & 0x7)
}

/// Converts a byte count into the largest 3-bit size encoding that fits it.
#[inline]
pub const fn bytes_to_size_code(bytes: usize) -> u8 {
    let mut code = 0u8;
    while code < 5 && (128usize << (code + 1)) <= bytes {
        code += 1;
    }
    code
}
