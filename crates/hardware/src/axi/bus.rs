//! AXI4 channel records.
//!
//! The five AXI4 channels (`aw`, `w`, `b`, `ar`, `r`) on a 256-bit data bus, each carried on
//! a valid/ready `Channel`. Field names follow the `m_axi_*` signal suffixes.

use crate::common::constants::AXI_DATA_BYTES;
use crate::sim::Channel;

/// Burst type (`axburst`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxiBurst {
    /// Every beat targets the same address.
    Fixed,
    /// Address increments by the beat size.
    #[default]
    Incr,
    /// Address increments and wraps at the burst boundary.
    Wrap,
}

/// Response code (`bresp` / `rresp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxiResp {
    /// Normal access success.
    #[default]
    Okay,
    /// Exclusive access success.
    ExOkay,
    /// Slave error.
    SlvErr,
    /// Decode error.
    DecErr,
}

/// Address channel payload (`aw*` / `ar*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxiAddr {
    /// Transaction id.
    pub id: u16,
    /// Start address.
    pub addr: u64,
    /// Beats minus one.
    pub len: u8,
    /// Log2 of bytes per beat.
    pub size: u8,
    /// Burst type.
    pub burst: AxiBurst,
    /// Lock type.
    pub lock: bool,
    /// Memory attributes.
    pub cache: u8,
    /// Protection attributes.
    pub prot: u8,
}

impl AxiAddr {
    /// Number of beats in the burst.
    pub const fn beats(&self) -> usize {
        self.len as usize + 1
    }

    /// Bytes transferred per beat.
    pub const fn bytes_per_beat(&self) -> u64 {
        1 << self.size
    }

    /// Address of beat `n`.
    ///
    /// The first beat uses the unaligned start address; later beats are aligned to the beat
    /// size. Wrapping bursts wrap at `beats * bytes_per_beat`.
    pub const fn beat_address(&self, n: usize) -> u64 {
        let bytes = self.bytes_per_beat();
        let aligned = self.addr & !(bytes - 1);
        match self.burst {
            AxiBurst::Fixed => self.addr,
            AxiBurst::Incr => {
                if n == 0 {
                    self.addr
                } else {
                    aligned + n as u64 * bytes
                }
            }
            AxiBurst::Wrap => {
                let span = bytes * self.beats() as u64;
                let boundary = self.addr & !(span - 1);
                let offset = (aligned - boundary + n as u64 * bytes) % span;
                if n == 0 { self.addr } else { boundary + offset }
            }
        }
    }
}

/// Write data channel payload (`w*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxiWriteData {
    /// Data lanes.
    pub data: [u8; AXI_DATA_BYTES],
    /// One strobe bit per lane.
    pub strb: u32,
    /// Last beat of the burst.
    pub last: bool,
}

/// Write response channel payload (`b*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxiWriteResp {
    /// Transaction id.
    pub id: u16,
    /// Response code.
    pub resp: AxiResp,
}

/// Read data channel payload (`r*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxiReadData {
    /// Transaction id.
    pub id: u16,
    /// Data lanes.
    pub data: [u8; AXI_DATA_BYTES],
    /// Response code.
    pub resp: AxiResp,
    /// Last beat of the burst.
    pub last: bool,
}

/// The five AXI4 channels between the DUT (manager) and the memory (subordinate).
#[derive(Debug, Clone, Default)]
pub struct AxiBus {
    /// Write address.
    pub aw: Channel<AxiAddr>,
    /// Write data.
    pub w: Channel<AxiWriteData>,
    /// Write response.
    pub b: Channel<AxiWriteResp>,
    /// Read address.
    pub ar: Channel<AxiAddr>,
    /// Read data.
    pub r: Channel<AxiReadData>,
}

impl AxiBus {
    /// Commits every channel.
    pub fn commit(&mut self) {
        self.aw.commit();
        self.w.commit();
        self.b.commit();
        self.ar.commit();
        self.r.commit();
    }
}
