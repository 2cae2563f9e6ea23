//! Transaction Layer Packets.
//!
//! This module models the TLPs the harness exchanges with the endpoint. It provides:
//! 1. **Header:** Format/type, routing identities, tag, byte enables and completion fields.
//! 2. **Builders:** Constructors for memory, configuration and completion packets that derive
//!    the dword length and byte enables from a byte-granular request.
//! 3. **Payload helpers:** Extraction of the enabled bytes of a dword-aligned payload.
//!
//! Payloads are stored dword-aligned: byte 0 of `data` belongs to the dword that contains
//! the first addressed byte, exactly as on the wire.

use std::fmt;

use crate::common::PcieId;

/// TLP format and type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum TlpType {
    /// Memory read, 32-bit address.
    #[default]
    MemRead,
    /// Memory read, 64-bit address.
    MemRead64,
    /// Memory write, 32-bit address.
    MemWrite,
    /// Memory write, 64-bit address.
    MemWrite64,
    /// Type 0 configuration read.
    CfgRead0,
    /// Type 0 configuration write.
    CfgWrite0,
    /// Completion without data.
    Cpl,
    /// Completion with data.
    CplData,
}

impl TlpType {
    /// Returns `true` for memory requests (read or write).
    pub const fn is_memory(self) -> bool {
        matches!(
            self,
            Self::MemRead | Self::MemRead64 | Self::MemWrite | Self::MemWrite64
        )
    }

    /// Returns `true` for memory writes.
    pub const fn is_memory_write(self) -> bool {
        matches!(self, Self::MemWrite | Self::MemWrite64)
    }

    /// Returns `true` for memory reads.
    pub const fn is_memory_read(self) -> bool {
        matches!(self, Self::MemRead | Self::MemRead64)
    }

    /// Returns `true` for Type 0 configuration requests.
    pub const fn is_config(self) -> bool {
        matches!(self, Self::CfgRead0 | Self::CfgWrite0)
    }

    /// Returns `true` for completions.
    pub const fn is_completion(self) -> bool {
        matches!(self, Self::Cpl | Self::CplData)
    }

    /// Posted requests receive no completion.
    pub const fn is_posted(self) -> bool {
        self.is_memory_write()
    }

    /// Returns `true` if the packet carries a data payload.
    pub const fn has_data(self) -> bool {
        matches!(
            self,
            Self::MemWrite | Self::MemWrite64 | Self::CfgWrite0 | Self::CplData
        )
    }
}

/// Completion status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum CplStatus {
    /// Successful Completion.
    #[default]
    Success,
    /// Unsupported Request.
    UnsupportedRequest,
    /// Configuration Request Retry Status.
    RequestRetry,
    /// Completer Abort.
    CompleterAbort,
}

impl fmt::Display for CplStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "SC",
            Self::UnsupportedRequest => "UR",
            Self::RequestRetry => "CRS",
            Self::CompleterAbort => "CA",
        })
    }
}

/// TLP header fields used by the harness.
///
/// One struct covers requests and completions; fields that do not apply to a given type are
/// left at their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlpHeader {
    /// Format and type.
    pub tlp_type: TlpType,
    /// Payload length in dwords (1..=1024); zero for packets without data.
    pub length_dw: u16,
    /// Identity of the requester.
    pub requester_id: PcieId,
    /// Identity of the completer (completions) or the target (configuration requests).
    pub completer_id: PcieId,
    /// Transaction tag.
    pub tag: u16,
    /// Byte enables of the first dword.
    pub first_be: u8,
    /// Byte enables of the last dword; zero for single-dword requests.
    pub last_be: u8,
    /// Byte address of a memory request, dword-aligned on the wire.
    pub address: u64,
    /// Configuration register offset (dword-aligned).
    pub register: u16,
    /// Completion status.
    pub status: CplStatus,
    /// Remaining byte count, including this completion.
    pub byte_count: u16,
    /// Low seven bits of the address of the first byte in this completion.
    pub lower_address: u8,
}

impl TlpHeader {
    /// Returns the byte address of the first enabled byte of a memory request.
    pub const fn first_byte_address(&self) -> u64 {
        (self.address & !3) + self.first_be.trailing_zeros() as u64 % 4
    }

    /// Returns the number of enabled bytes covered by the request.
    ///
    /// The count spans from the first enabled byte to the last enabled byte, matching the
    /// byte count a completer must return for a read.
    pub const fn byte_len(&self) -> usize {
        if self.length_dw == 0 || self.first_be == 0 {
            return 0;
        }
        let lead = self.first_be.trailing_zeros() as usize;
        if self.length_dw == 1 {
            let last = 3 - (self.first_be << 4).leading_zeros() as usize;
            return last + 1 - lead;
        }
        let tail = (self.last_be << 4).leading_zeros() as usize;
        self.length_dw as usize * 4 - lead - tail
    }

    /// Returns whether byte `index` of the dword-aligned payload is enabled.
    pub const fn byte_enabled(&self, index: usize) -> bool {
        let dword = index / 4;
        let lane = index % 4;
        if dword >= self.length_dw as usize {
            return false;
        }
        let mask = if dword == 0 {
            self.first_be
        } else if dword + 1 == self.length_dw as usize {
            self.last_be
        } else {
            0xF
        };
        mask & (1 << lane) != 0
    }
}

/// A complete TLP: header plus dword-aligned payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tlp {
    /// Header fields.
    pub header: TlpHeader,
    /// Payload, `4 * length_dw` bytes for packets with data.
    pub data: Vec<u8>,
}

/// Computes (length_dw, first_be, last_be) for a byte-granular access.
///
/// # Arguments
///
/// * `addr` - Address of the first byte.
/// * `len` - Number of bytes (at least 1).
pub const fn byte_enables(addr: u64, len: usize) -> (u16, u8, u8) {
    let start = addr & !3;
    let end = addr + len as u64;
    let dwords = ((end + 3) & !3).saturating_sub(start) / 4;
    let first = (0xF << (addr & 3)) & 0xF;
    let last = 0xF >> ((4 - (end & 3)) & 3);
    if dwords <= 1 {
        ((dwords as u16), (first & last) as u8, 0)
    } else {
        (dwords as u16, first as u8, last as u8)
    }
}

/// Places `payload` into a dword-aligned buffer starting at `addr`'s lane.
fn align_payload(addr: u64, payload: &[u8], length_dw: u16) -> Vec<u8> {
    let mut data = vec![0u8; length_dw as usize * 4];
    if payload.is_empty() {
        return data;
    }
    let lead = (addr & 3) as usize;
    data[lead..lead + payload.len()].copy_from_slice(payload);
    data
}

impl Tlp {
    /// Builds a memory write carrying `payload` to `addr`.
    ///
    /// Uses the 64-bit format when the address does not fit in 32 bits.
    pub fn mem_write(requester: PcieId, tag: u16, addr: u64, payload: &[u8]) -> Self {
        let (length_dw, first_be, last_be) = byte_enables(addr, payload.len());
        Self {
            header: TlpHeader {
                tlp_type: if addr > u64::from(u32::MAX) {
                    TlpType::MemWrite64
                } else {
                    TlpType::MemWrite
                },
                length_dw,
                requester_id: requester,
                tag,
                first_be,
                last_be,
                address: addr & !3,
                ..TlpHeader::default()
            },
            data: align_payload(addr, payload, length_dw),
        }
    }

    /// Builds a memory read of `len` bytes at `addr`.
    pub fn mem_read(requester: PcieId, tag: u16, addr: u64, len: usize) -> Self {
        let (length_dw, first_be, last_be) = byte_enables(addr, len);
        Self {
            header: TlpHeader {
                tlp_type: if addr > u64::from(u32::MAX) {
                    TlpType::MemRead64
                } else {
                    TlpType::MemRead
                },
                length_dw,
                requester_id: requester,
                tag,
                first_be,
                last_be,
                address: addr & !3,
                ..TlpHeader::default()
            },
            data: Vec::new(),
        }
    }

    /// Builds a Type 0 configuration read of the dword at `register`.
    pub fn cfg_read(requester: PcieId, target: PcieId, tag: u16, register: u16) -> Self {
        Self {
            header: TlpHeader {
                tlp_type: TlpType::CfgRead0,
                length_dw: 1,
                requester_id: requester,
                completer_id: target,
                tag,
                first_be: 0xF,
                register: register & !3,
                ..TlpHeader::default()
            },
            data: Vec::new(),
        }
    }

    /// Builds a Type 0 configuration write of `value` under byte enables `be`.
    pub fn cfg_write(
        requester: PcieId,
        target: PcieId,
        tag: u16,
        register: u16,
        value: u32,
        be: u8,
    ) -> Self {
        Self {
            header: TlpHeader {
                tlp_type: TlpType::CfgWrite0,
                length_dw: 1,
                requester_id: requester,
                completer_id: target,
                tag,
                first_be: be & 0xF,
                register: register & !3,
                ..TlpHeader::default()
            },
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Builds a completion without data for `request`.
    pub fn completion(request: &TlpHeader, completer: PcieId, status: CplStatus) -> Self {
        Self {
            header: TlpHeader {
                tlp_type: TlpType::Cpl,
                requester_id: request.requester_id,
                completer_id: completer,
                tag: request.tag,
                status,
                byte_count: if request.tlp_type.is_config() { 4 } else { 0 },
                ..TlpHeader::default()
            },
            data: Vec::new(),
        }
    }

    /// Builds a successful completion with data.
    ///
    /// # Arguments
    ///
    /// * `request` - Header of the request being completed.
    /// * `completer` - Identity of the completer.
    /// * `addr` - Address of the first byte in `payload`.
    /// * `payload` - Bytes returned by this completion.
    /// * `remaining` - Bytes still owed for the request, including `payload`.
    pub fn completion_data(
        request: &TlpHeader,
        completer: PcieId,
        addr: u64,
        payload: &[u8],
        remaining: usize,
    ) -> Self {
        let (length_dw, _, _) = byte_enables(addr, payload.len());
        Self {
            header: TlpHeader {
                tlp_type: TlpType::CplData,
                length_dw,
                requester_id: request.requester_id,
                completer_id: completer,
                tag: request.tag,
                status: CplStatus::Success,
                // 4096 encodes as zero on the wire.
                byte_count: (remaining & 0xFFF) as u16,
                lower_address: (addr & 0x7F) as u8,
                ..TlpHeader::default()
            },
            data: align_payload(addr, payload, length_dw),
        }
    }

    /// Returns the first configuration-space dword of a configuration write or completion.
    pub fn dword(&self) -> u32 {
        let mut raw = [0u8; 4];
        let n = self.data.len().min(4);
        raw[..n].copy_from_slice(&self.data[..n]);
        u32::from_le_bytes(raw)
    }

    /// Returns the enabled bytes of a memory write payload, in address order.
    pub fn write_payload(&self) -> &[u8] {
        let lead = self.header.first_be.trailing_zeros().min(3) as usize;
        let len = self.header.byte_len();
        let end = (lead + len).min(self.data.len());
        &self.data[lead.min(end)..end]
    }

    /// Returns the payload bytes of a completion with data.
    ///
    /// # Returns
    ///
    /// The bytes starting at `lower_address`'s lane, truncated to `byte_count` (a value of
    /// zero means 4096).
    pub fn completion_payload(&self) -> &[u8] {
        let lead = (self.header.lower_address & 3) as usize;
        let owed = match self.header.byte_count {
            0 => 4096,
            n => n as usize,
        };
        let end = (lead + owed).min(self.data.len());
        &self.data[lead.min(end)..end]
    }
}

impl fmt::Display for Tlp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        match h.tlp_type {
            TlpType::CfgRead0 | TlpType::CfgWrite0 => write!(
                f,
                "{:?} {} reg {:#05x} tag {} be {:#x}",
                h.tlp_type, h.completer_id, h.register, h.tag, h.first_be
            ),
            TlpType::Cpl | TlpType::CplData => write!(
                f,
                "{:?} {} -> {} tag {} {} bc {} la {:#x} len {}dw",
                h.tlp_type,
                h.completer_id,
                h.requester_id,
                h.tag,
                h.status,
                h.byte_count,
                h.lower_address,
                h.length_dw
            ),
            _ => write!(
                f,
                "{:?} {:#x} len {}dw be {:x}/{:x} tag {}",
                h.tlp_type, h.address, h.length_dw, h.first_be, h.last_be, h.tag
            ),
        }
    }
}
