//! Behavioral PCIe-to-AXI bridge.
//!
//! `ReferenceBridge` stands in for the bridge RTL so the harness can run end to end. It
//! implements the externally visible contract only:
//! 1. **Requests:** TLPs are accepted from `rx_req_tlp` into a queue of `queue_depth` entries;
//!    `ready` drops while the queue is full.
//! 2. **Writes:** After `pipeline_latency` cycles a memory write becomes one AXI INCR burst with
//!    strobes taken from the TLP byte enables.
//! 3. **Reads:** A memory read becomes one AXI read burst; the returned data is split into
//!    completions on max-payload-aligned boundaries, stamped with `completer_id`.
//!
//! TLP addresses are truncated to `axi_addr_width` bits to form AXI addresses.

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::{Dut, DutPorts};
use crate::axi::{AxiAddr, AxiBurst, AxiResp, AxiWriteData};
use crate::common::constants::{
    AXI_DATA_BYTES, AXI_FULL_SIZE, AXI_MAX_BURST_BEATS, size_code_to_bytes,
};
use crate::common::{PcieId, SimTime};
use crate::config::BridgeConfig;
use crate::pcie::bus::{TlpAssembler, TlpBeat, to_beats};
use crate::pcie::tlp::{CplStatus, Tlp, TlpHeader};
use crate::sim::Clocked;

/// AXI cache attribute: normal non-cacheable bufferable.
const AXI_CACHE: u8 = 0b0011;
/// AXI protection attribute: non-secure data access.
const AXI_PROT: u8 = 0b010;

#[derive(Debug, Clone)]
struct Pending {
    ready_at: u64,
    tlp: Tlp,
}

#[derive(Debug, Clone)]
struct ReadJob {
    request: TlpHeader,
    /// AXI address of the first requested byte.
    start: u64,
    /// Bus-aligned AXI address of the first beat.
    aligned: u64,
    beats: usize,
    data: Vec<u8>,
}

/// Behavioral model of the PCIe-to-AXI bridge.
#[derive(Debug, Clone)]
pub struct ReferenceBridge {
    queue_depth: usize,
    pipeline_latency: u64,
    addr_mask: u64,
    cycle: u64,
    next_id: u16,
    assembler: TlpAssembler,
    requests: VecDeque<Pending>,
    aw: VecDeque<AxiAddr>,
    w: VecDeque<AxiWriteData>,
    writes_outstanding: usize,
    ar: VecDeque<AxiAddr>,
    reads: VecDeque<ReadJob>,
    cpl: VecDeque<TlpBeat>,
}

impl ReferenceBridge {
    /// Creates an idle bridge.
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            queue_depth: config.queue_depth.max(1),
            pipeline_latency: config.pipeline_latency,
            addr_mask: config.axi_addr_mask(),
            cycle: 0,
            next_id: 0,
            assembler: TlpAssembler::new(),
            requests: VecDeque::new(),
            aw: VecDeque::new(),
            w: VecDeque::new(),
            writes_outstanding: 0,
            ar: VecDeque::new(),
            reads: VecDeque::new(),
            cpl: VecDeque::new(),
        }
    }

    fn clear(&mut self) {
        self.assembler.clear();
        self.requests.clear();
        self.aw.clear();
        self.w.clear();
        self.writes_outstanding = 0;
        self.ar.clear();
        self.reads.clear();
        self.cpl.clear();
    }

    fn alloc_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1) & 0xFF;
        id
    }

    /// Returns (AXI start, aligned start, beats) for a request.
    fn burst_shape(&self, hdr: &TlpHeader) -> (u64, u64, usize) {
        let start = hdr.first_byte_address() & self.addr_mask;
        let aligned = start & !(AXI_DATA_BYTES as u64 - 1);
        let end = start + hdr.byte_len().max(1) as u64;
        let beats = (end - aligned).div_ceil(AXI_DATA_BYTES as u64) as usize;
        (start, aligned, beats)
    }

    /// Address commands covering `beats` beats from `start`, split at the AXI burst limit.
    fn burst_cmds(&mut self, start: u64, aligned: u64, beats: usize) -> Vec<AxiAddr> {
        (0..beats)
            .step_by(AXI_MAX_BURST_BEATS)
            .map(|first| {
                let addr = if first == 0 {
                    start
                } else {
                    aligned + (first * AXI_DATA_BYTES) as u64
                };
                self.burst_cmd(addr, (beats - first).min(AXI_MAX_BURST_BEATS))
            })
            .collect()
    }

    fn burst_cmd(&mut self, addr: u64, beats: usize) -> AxiAddr {
        AxiAddr {
            id: self.alloc_id(),
            addr,
            len: (beats.clamp(1, AXI_MAX_BURST_BEATS) - 1) as u8,
            size: AXI_FULL_SIZE,
            burst: AxiBurst::Incr,
            lock: false,
            cache: AXI_CACHE,
            prot: AXI_PROT,
        }
    }

    fn issue_write(&mut self, tlp: &Tlp) {
        let (start, aligned, beats) = self.burst_shape(&tlp.header);
        let mut data = vec![AxiWriteData::default(); beats];
        let dw_addr = tlp.header.address & !3;
        for (i, byte) in tlp.data.iter().enumerate() {
            if !tlp.header.byte_enabled(i) {
                continue;
            }
            let axi = (dw_addr + i as u64) & self.addr_mask;
            let offset = (axi - aligned) as usize;
            let beat = &mut data[offset / AXI_DATA_BYTES];
            let lane = offset % AXI_DATA_BYTES;
            beat.data[lane] = *byte;
            beat.strb |= 1 << lane;
        }
        for (i, beat) in data.iter_mut().enumerate() {
            beat.last = (i + 1) % AXI_MAX_BURST_BEATS == 0 || i + 1 == beats;
        }
        let cmds = self.burst_cmds(start, aligned, beats);
        debug!(
            axi = %format!("{start:#x}"),
            bytes = tlp.header.byte_len(),
            beats,
            bursts = cmds.len(),
            "issuing AXI write"
        );
        self.writes_outstanding += cmds.len();
        self.aw.extend(cmds);
        self.w.extend(data);
    }

    fn issue_read(&mut self, tlp: &Tlp) {
        let (start, aligned, beats) = self.burst_shape(&tlp.header);
        let cmds = self.burst_cmds(start, aligned, beats);
        debug!(
            axi = %format!("{start:#x}"),
            bytes = tlp.header.byte_len(),
            beats,
            bursts = cmds.len(),
            "issuing AXI read"
        );
        self.ar.extend(cmds);
        self.reads.push_back(ReadJob {
            request: tlp.header,
            start,
            aligned,
            beats,
            data: Vec::with_capacity(beats * AXI_DATA_BYTES),
        });
    }

    fn dispatch(&mut self) {
        let due = self
            .requests
            .front()
            .is_some_and(|p| p.ready_at <= self.cycle);
        if !due {
            return;
        }
        let Some(Pending { tlp, .. }) = self.requests.pop_front() else {
            return;
        };
        let kind = tlp.header.tlp_type;
        if kind.is_memory_write() {
            self.issue_write(&tlp);
        } else if kind.is_memory_read() {
            self.issue_read(&tlp);
        } else {
            warn!(%tlp, "bridge ignores non-memory request");
        }
    }

    fn complete_read(&mut self, mut job: ReadJob, completer: PcieId, mps: usize) {
        let hdr = &job.request;
        let len = hdr.byte_len();
        if len == 0 {
            self.cpl.extend(to_beats(
                &Tlp::completion(hdr, completer, CplStatus::Success),
                0,
                0,
            ));
            return;
        }
        let lead = (job.start - job.aligned) as usize;
        if job.data.len() < lead + len {
            warn!(tag = hdr.tag, "AXI read returned short data; padding with zeros");
            job.data.resize(lead + len, 0);
        }
        let mut addr = hdr.first_byte_address();
        let mut done = 0usize;
        while done < len {
            let boundary = (addr & !(mps as u64 - 1)) + mps as u64;
            let chunk = ((boundary - addr) as usize).min(len - done);
            let from = lead + done;
            let payload = &job.data[from..from + chunk];
            let tlp = Tlp::completion_data(hdr, completer, addr, payload, len - done);
            self.cpl.extend(to_beats(&tlp, 0, 0));
            addr += chunk as u64;
            done += chunk;
        }
    }
}

impl Clocked for ReferenceBridge {
    fn name(&self) -> &str {
        "reference-bridge"
    }

    fn on_rising_edge(&mut self, ports: &mut DutPorts, _now: SimTime) {
        self.cycle += 1;
        if ports.rst.get() {
            self.clear();
            ports.rx_req_tlp.ready.set(false);
            ports.tx_cpl_tlp.valid.set(false);
            let axi = &mut ports.m_axi;
            axi.aw.valid.set(false);
            axi.w.valid.set(false);
            axi.ar.valid.set(false);
            axi.b.ready.set(false);
            axi.r.ready.set(false);
            return;
        }

        if ports.rx_req_tlp.fired() {
            let beat = ports.rx_req_tlp.payload.get();
            if let Some((tlp, _, _)) = self.assembler.push(&beat) {
                self.requests.push_back(Pending {
                    ready_at: self.cycle + self.pipeline_latency,
                    tlp,
                });
            }
        }
        self.dispatch();
        ports
            .rx_req_tlp
            .ready
            .set(self.requests.len() < self.queue_depth);

        let axi = &mut ports.m_axi;
        let _ = axi.aw.drive_from(&mut self.aw);
        let _ = axi.w.drive_from(&mut self.w);
        let _ = axi.ar.drive_from(&mut self.ar);

        if let Some(resp) = axi.b.accept(true) {
            self.writes_outstanding = self.writes_outstanding.saturating_sub(1);
            if resp.resp != AxiResp::Okay {
                warn!(id = resp.id, resp = ?resp.resp, "AXI write error response");
            }
        }

        if let Some(beat) = axi.r.accept(true) {
            if beat.resp != AxiResp::Okay {
                warn!(id = beat.id, resp = ?beat.resp, "AXI read error response");
            }
            let finished = match self.reads.front_mut() {
                Some(job) => {
                    job.data.extend_from_slice(&beat.data);
                    job.data.len() >= job.beats * AXI_DATA_BYTES
                }
                None => {
                    warn!("AXI read data with no burst outstanding");
                    false
                }
            };
            if let Some(job) = finished.then(|| self.reads.pop_front()).flatten() {
                let completer = PcieId::from(ports.completer_id.get());
                let mps = size_code_to_bytes(ports.max_payload_size.get());
                self.complete_read(job, completer, mps);
            }
        }

        let _ = ports.tx_cpl_tlp.drive_from(&mut self.cpl);
    }
}

impl Dut for ReferenceBridge {
    fn is_idle(&self) -> bool {
        self.requests.is_empty()
            && !self.assembler.in_progress()
            && self.aw.is_empty()
            && self.w.is_empty()
            && self.writes_outstanding == 0
            && self.ar.is_empty()
            && self.reads.is_empty()
            && self.cpl.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_transfers_split_at_the_burst_limit() {
        let mut bridge = ReferenceBridge::new(&BridgeConfig::default());
        let cmds = bridge.burst_cmds(0x10, 0, 300);
        assert_eq!(cmds.len(), 2);
        assert_eq!((cmds[0].addr, cmds[0].len), (0x10, 255));
        assert_eq!((cmds[1].addr, cmds[1].len), (0x2000, 43));
        assert_ne!(cmds[0].id, cmds[1].id);

        let single = bridge.burst_cmds(0x40, 0x40, 1);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].len, 0);
    }
}
