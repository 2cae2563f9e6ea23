//! AXI4 RAM target model.
//!
//! This module implements the memory behind the bridge. It provides:
//! 1. **Handshakes:** One write burst and one read burst in flight at a time; `awready` and
//!    `arready` drop while a burst of that direction is active.
//! 2. **Bursts:** FIXED, INCR and WRAP addressing with per-lane write strobes.
//! 3. **Inspection:** `read` and `write` access the backing store directly, without
//!    advancing simulated time.
//! 4. **Acknowledgement log:** Every write response is recorded with the byte range it
//!    covered, so a driver can wait until a write it issued has been acknowledged.
//!
//! Addresses wrap modulo the memory size.

use std::ops::Range;

use tracing::{debug, trace};

use super::bus::{AxiAddr, AxiReadData, AxiResp, AxiWriteData, AxiWriteResp};
use crate::common::SimTime;
use crate::common::constants::AXI_DATA_BYTES;
use crate::dut::DutPorts;
use crate::sim::Clocked;

/// A write burst acknowledged on the `b` channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    /// Byte range the burst's strobes covered (AXI addresses, not wrapped).
    pub range: Range<u64>,
    /// Time the response was issued.
    pub at: SimTime,
}

/// Counters kept by the memory model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxiRamStats {
    /// Write bursts completed.
    pub write_bursts: u64,
    /// Write beats accepted.
    pub write_beats: u64,
    /// Bytes written under strobe.
    pub bytes_written: u64,
    /// Read bursts completed.
    pub read_bursts: u64,
    /// Read beats returned.
    pub read_beats: u64,
}

#[derive(Debug, Clone)]
struct WriteBurst {
    cmd: AxiAddr,
    beat: usize,
    low: u64,
    high: u64,
}

#[derive(Debug, Clone)]
struct ReadBurst {
    cmd: AxiAddr,
    beat: usize,
}

/// Byte-addressable memory answering AXI4 bursts.
#[derive(Debug, Clone)]
pub struct AxiRam {
    mem: Vec<u8>,
    write: Option<WriteBurst>,
    response: Option<AxiWriteResp>,
    read: Option<ReadBurst>,
    acks: Vec<WriteAck>,
    /// Log position of `acks[0]`; earlier entries were released.
    ack_base: usize,
    stats: AxiRamStats,
}

impl AxiRam {
    /// Creates a zero-filled memory of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0; size.max(1)],
            write: None,
            response: None,
            read: None,
            acks: Vec::new(),
            ack_base: 0,
            stats: AxiRamStats::default(),
        }
    }

    /// Memory size in bytes.
    pub fn size(&self) -> usize {
        self.mem.len()
    }

    #[inline]
    fn index(&self, addr: u64) -> usize {
        (addr % self.mem.len() as u64) as usize
    }

    /// Returns `len` bytes starting at `addr`, wrapping at the end of memory.
    ///
    /// Pure inspection: no handshake, no simulated time.
    pub fn read(&self, addr: u64, len: usize) -> Vec<u8> {
        (0..len as u64).map(|i| self.mem[self.index(addr + i)]).collect()
    }

    /// Stores `data` at `addr` directly, wrapping at the end of memory.
    pub fn write(&mut self, addr: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            let idx = self.index(addr + i as u64);
            self.mem[idx] = *byte;
        }
    }

    /// Memory counters.
    pub const fn stats(&self) -> &AxiRamStats {
        &self.stats
    }

    /// Write acknowledgements recorded and not yet released.
    pub fn acks(&self) -> &[WriteAck] {
        &self.acks
    }

    /// Position in the acknowledgement log; pass to `acked_covers` later.
    pub fn ack_mark(&self) -> usize {
        self.ack_base + self.acks.len()
    }

    /// Drops acknowledgements recorded before `mark`.
    ///
    /// Marks taken earlier stay valid positions; coverage checks from them only see what is
    /// still retained.
    pub fn release_acks(&mut self, mark: usize) {
        let n = mark.saturating_sub(self.ack_base).min(self.acks.len());
        let _ = self.acks.drain(..n);
        self.ack_base += n;
    }

    /// Returns `true` if acknowledgements recorded after `mark` together cover `range`.
    pub fn acked_covers(&self, mark: usize, range: Range<u64>) -> bool {
        if range.is_empty() {
            return true;
        }
        let from = mark.saturating_sub(self.ack_base);
        let mut spans: Vec<Range<u64>> = self
            .acks
            .get(from..)
            .unwrap_or_default()
            .iter()
            .map(|a| a.range.clone())
            .collect();
        spans.sort_by_key(|r| r.start);
        let mut covered = range.start;
        for span in spans {
            if span.start > covered {
                break;
            }
            covered = covered.max(span.end);
            if covered >= range.end {
                return true;
            }
        }
        false
    }

    /// Returns `true` when no burst is in progress.
    pub const fn is_idle(&self) -> bool {
        self.write.is_none() && self.response.is_none() && self.read.is_none()
    }

    fn lane_base(addr: u64) -> u64 {
        addr & !(AXI_DATA_BYTES as u64 - 1)
    }

    fn apply_write(&mut self, burst: &mut WriteBurst, beat: &AxiWriteData) {
        let base = Self::lane_base(burst.cmd.beat_address(burst.beat));
        for lane in 0..AXI_DATA_BYTES {
            if beat.strb & (1 << lane) == 0 {
                continue;
            }
            let addr = base + lane as u64;
            let idx = self.index(addr);
            self.mem[idx] = beat.data[lane];
            burst.low = burst.low.min(addr);
            burst.high = burst.high.max(addr + 1);
            self.stats.bytes_written += 1;
        }
        burst.beat += 1;
        self.stats.write_beats += 1;
    }

    fn read_beat(&self, burst: &ReadBurst) -> AxiReadData {
        let base = Self::lane_base(burst.cmd.beat_address(burst.beat));
        let mut data = [0u8; AXI_DATA_BYTES];
        for (lane, byte) in data.iter_mut().enumerate() {
            *byte = self.mem[self.index(base + lane as u64)];
        }
        AxiReadData {
            id: burst.cmd.id,
            data,
            resp: AxiResp::Okay,
            last: burst.beat + 1 == burst.cmd.beats(),
        }
    }

    fn finish_write(&mut self, burst: &WriteBurst, now: SimTime) {
        self.stats.write_bursts += 1;
        let range = if burst.low < burst.high {
            burst.low..burst.high
        } else {
            burst.cmd.addr..burst.cmd.addr
        };
        debug!(
            start = %format!("{:#x}", range.start),
            end = %format!("{:#x}", range.end),
            "write burst acknowledged"
        );
        self.acks.push(WriteAck { range, at: now });
        self.response = Some(AxiWriteResp {
            id: burst.cmd.id,
            resp: AxiResp::Okay,
        });
    }

    fn write_side(&mut self, ports: &mut DutPorts, now: SimTime) {
        let axi = &mut ports.m_axi;

        if axi.b.fired() {
            self.response = None;
        }

        if let Some(cmd) = axi.aw.fired().then(|| axi.aw.payload.get()) {
            trace!(addr = %format!("{:#x}", cmd.addr), beats = cmd.beats(), "AW accepted");
            self.write = Some(WriteBurst {
                cmd,
                beat: 0,
                low: u64::MAX,
                high: 0,
            });
        } else if axi.w.fired() {
            let beat = axi.w.payload.get();
            if let Some(mut burst) = self.write.take() {
                self.apply_write(&mut burst, &beat);
                if beat.last || burst.beat == burst.cmd.beats() {
                    self.finish_write(&burst, now);
                } else {
                    self.write = Some(burst);
                }
            }
        }

        axi.aw.ready.set(self.write.is_none() && self.response.is_none());
        axi.w.ready.set(self.write.is_some());
        match self.response {
            Some(resp) => {
                axi.b.payload.set(resp);
                axi.b.valid.set(true);
            }
            None => axi.b.valid.set(false),
        }
    }

    fn read_side(&mut self, ports: &mut DutPorts) {
        let axi = &mut ports.m_axi;

        if axi.r.fired() {
            if let Some(burst) = self.read.as_mut() {
                burst.beat += 1;
                self.stats.read_beats += 1;
                if burst.beat == burst.cmd.beats() {
                    self.stats.read_bursts += 1;
                    self.read = None;
                }
            }
        }

        if axi.ar.fired() && self.read.is_none() {
            let cmd = axi.ar.payload.get();
            trace!(addr = %format!("{:#x}", cmd.addr), beats = cmd.beats(), "AR accepted");
            self.read = Some(ReadBurst { cmd, beat: 0 });
        }

        axi.ar.ready.set(self.read.is_none());
        match self.read.as_ref().map(|b| self.read_beat(b)) {
            Some(beat) => {
                axi.r.payload.set(beat);
                axi.r.valid.set(true);
            }
            None => axi.r.valid.set(false),
        }
    }

    /// Drops any burst in flight; memory contents and the acknowledgement log are kept.
    pub fn reset(&mut self) {
        self.write = None;
        self.response = None;
        self.read = None;
    }
}

impl Clocked for AxiRam {
    fn name(&self) -> &str {
        "axi-ram"
    }

    fn on_rising_edge(&mut self, ports: &mut DutPorts, now: SimTime) {
        if ports.rst.get() {
            self.reset();
            let axi = &mut ports.m_axi;
            axi.aw.ready.set(false);
            axi.w.ready.set(false);
            axi.b.valid.set(false);
            axi.ar.ready.set(false);
            axi.r.valid.set(false);
            return;
        }
        self.write_side(ports, now);
        self.read_side(ports);
    }
}
