//! PCIe root complex model.
//!
//! The root complex is the host side of the harness. It provides:
//! 1. **Root ports:** Each attached endpoint sits behind its own port; port `n` owns secondary
//!    bus `n + 1`. TLPs spend `link_latency_cycles` on the link in each direction.
//! 2. **Enumeration:** Configuration-space discovery of every function, BAR sizing with the
//!    all-ones sizing write, address assignment from the memory window, and max payload / max read
//!    request negotiation through the PCI Express capability.
//! 3. **Transactions:** Tagged configuration and memory requests. Non-posted requests are
//!    matched to their completions by tag and time out after `completion_timeout`.
//!
//! The root complex is a plain value owned by the caller. Blocking operations take the
//! simulator by `&mut` and step it with the root complex as the host, so each call advances
//! simulated time only as far as it needs to.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, info, trace, warn};

use super::bar::{BarKind, BarWindow};
use super::config_space::HardwareIds;
use super::device::PcieEndpoint;
use super::tlp::{CplStatus, Tlp};
use crate::common::addr::bytes_to_page_boundary;
use crate::common::constants::{
    BAR_COUNT, VENDOR_ID_NONE, bar, bytes_to_size_code, cfg, command, pcie_cap,
    size_code_to_bytes,
};
use crate::common::{HarnessError, HarnessResult, PcieId, SimTime};
use crate::config::{Config, PcieConfig};
use crate::dut::DutPorts;
use crate::sim::{Clocked, Simulator};

/// Tags available to the requester (8-bit tag field).
const TAG_SPACE: u16 = 256;

/// Read requests kept in flight at once by `bar_read`.
const READ_BATCH: usize = 32;

/// Functions per device.
const MAX_FUNCTIONS: u8 = 8;

/// Header type bit 7: the device implements more than one function.
const MULTI_FUNCTION: u8 = 0x80;

/// Capability list entries walked before giving up on a malformed list.
const MAX_CAPABILITIES: usize = 48;

/// Base of the I/O window used for I/O BAR assignment.
const IO_WINDOW_BASE: u64 = 0x1000;

/// Size of the I/O window.
const IO_WINDOW_SIZE: u64 = 0xF000;

/// Bump allocator over one root complex address window.
#[derive(Debug, Clone, Copy)]
struct WindowAllocator {
    base: u64,
    end: u64,
    next: u64,
}

impl WindowAllocator {
    const fn new(base: u64, size: u64) -> Self {
        Self {
            base,
            end: base.saturating_add(size),
            next: base,
        }
    }

    const fn reset(&mut self) {
        self.next = self.base;
    }

    /// Allocates `size` bytes aligned to `size`.
    fn allocate(&mut self, size: u64) -> HarnessResult<u64> {
        let start = self.next.checked_next_multiple_of(size);
        match start.and_then(|s| s.checked_add(size).map(|e| (s, e))) {
            Some((start, end)) if end <= self.end => {
                self.next = end;
                Ok(start)
            }
            _ => Err(HarnessError::AddressSpaceExhausted { size }),
        }
    }
}

/// A TLP crossing the link.
#[derive(Debug)]
struct InFlight {
    tlp: Tlp,
    remaining: u64,
}

#[derive(Debug)]
struct RootPort {
    endpoint: Box<dyn PcieEndpoint>,
    downstream: VecDeque<InFlight>,
    upstream: VecDeque<InFlight>,
}

impl RootPort {
    /// Advances every in-flight TLP by one cycle and returns those that arrived.
    fn advance(link: &mut VecDeque<InFlight>) -> Vec<Tlp> {
        for f in link.iter_mut() {
            f.remaining = f.remaining.saturating_sub(1);
        }
        let mut arrived = Vec::new();
        while link.front().is_some_and(|f| f.remaining == 0) {
            if let Some(f) = link.pop_front() {
                arrived.push(f.tlp);
            }
        }
        arrived
    }
}

/// A non-posted request waiting for completions.
#[derive(Debug)]
struct Outstanding {
    /// Function the request was addressed to; its completions must carry this completer id.
    target: PcieId,
    /// Address of the first requested byte (zero for configuration requests).
    addr: u64,
    data: Vec<u8>,
    status: CplStatus,
    done: bool,
}

/// What enumeration learned about one function.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FunctionRecord {
    port: usize,
    ids: HardwareIds,
    header_type: u8,
    bars: [Option<BarWindow>; BAR_COUNT],
    max_payload: usize,
    max_read_request: usize,
    enabled: bool,
}

/// Counters kept by the root complex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RcStats {
    /// Configuration requests issued.
    pub config_requests: u64,
    /// Memory write TLPs issued.
    pub memory_writes: u64,
    /// Memory read TLPs issued.
    pub memory_reads: u64,
    /// Payload bytes written.
    pub bytes_written: u64,
    /// Payload bytes read back.
    pub bytes_read: u64,
    /// Completions matched to a request.
    pub completions: u64,
    /// Completions whose tag matched nothing outstanding.
    pub unexpected_completions: u64,
    /// Completions reporting a status other than Successful Completion.
    pub failed_completions: u64,
}

/// Snapshot of an enumerated function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Identity assigned by enumeration.
    pub id: PcieId,
    /// Root port the function sits behind.
    pub port: usize,
    /// Identity registers read during enumeration.
    pub ids: HardwareIds,
    /// Header type register (bit 7 is the multi-function flag).
    pub header_type: u8,
    /// Negotiated max payload size in bytes.
    pub max_payload: usize,
    /// Programmed max read request size in bytes.
    pub max_read_request: usize,
    /// Whether `enable_device` has run since the last enumeration.
    pub enabled: bool,
    bars: [Option<BarWindow>; BAR_COUNT],
}

impl DeviceHandle {
    fn from_record(id: PcieId, record: &FunctionRecord) -> Self {
        Self {
            id,
            port: record.port,
            ids: record.ids,
            header_type: record.header_type,
            max_payload: record.max_payload,
            max_read_request: record.max_read_request,
            enabled: record.enabled,
            bars: record.bars,
        }
    }

    /// Returns the window assigned to BAR `index`.
    ///
    /// # Returns
    ///
    /// `BarNotPresent` if the function does not implement that BAR.
    pub fn bar_window(&self, index: usize) -> HarnessResult<BarWindow> {
        self.bars
            .get(index)
            .copied()
            .flatten()
            .ok_or(HarnessError::BarNotPresent { id: self.id, index })
    }

    /// All assigned windows in BAR order.
    pub fn bar_windows(&self) -> impl Iterator<Item = BarWindow> + '_ {
        self.bars.iter().flatten().copied()
    }

    /// Enables memory decoding and bus mastering; see `RootComplex::enable_device`.
    pub fn enable_device(&mut self, rc: &mut RootComplex, sim: &mut Simulator) -> HarnessResult<()> {
        rc.enable_device(sim, self.id)?;
        self.enabled = true;
        Ok(())
    }
}

/// Host bridge with one root port per attached endpoint.
#[derive(Debug)]
pub struct RootComplex {
    id: PcieId,
    config: PcieConfig,
    completion_timeout: SimTime,
    ports: Vec<RootPort>,
    functions: BTreeMap<PcieId, FunctionRecord>,
    mem: WindowAllocator,
    io: WindowAllocator,
    next_tag: u16,
    outstanding: HashMap<u16, Outstanding>,
    stats: RcStats,
}

impl RootComplex {
    /// Creates a root complex with no ports.
    pub fn new(config: &Config) -> Self {
        let pcie = config.pcie.clone();
        Self {
            id: PcieId::default(),
            completion_timeout: config.time(pcie.completion_timeout),
            mem: WindowAllocator::new(pcie.mem_window_base, pcie.mem_window_size),
            io: WindowAllocator::new(IO_WINDOW_BASE, IO_WINDOW_SIZE),
            config: pcie,
            ports: Vec::new(),
            functions: BTreeMap::new(),
            next_tag: 0,
            outstanding: HashMap::new(),
            stats: RcStats::default(),
        }
    }

    /// Requester identity used for every TLP the root complex issues.
    pub const fn requester_id(&self) -> PcieId {
        self.id
    }

    /// Root complex counters.
    pub const fn stats(&self) -> &RcStats {
        &self.stats
    }

    /// Number of root ports.
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Attaches `endpoint` to a new root port.
    ///
    /// # Returns
    ///
    /// The port index. The endpoint's functions live on bus `index + 1` and become visible
    /// at the next `enumerate`.
    pub fn attach(&mut self, endpoint: Box<dyn PcieEndpoint>) -> usize {
        self.ports.push(RootPort {
            endpoint,
            downstream: VecDeque::new(),
            upstream: VecDeque::new(),
        });
        let port = self.ports.len() - 1;
        debug!(port, bus = port + 1, "endpoint attached");
        port
    }

    /// Endpoint behind `port`.
    pub fn endpoint(&self, port: usize) -> Option<&dyn PcieEndpoint> {
        self.ports.get(port).map(|p| p.endpoint.as_ref())
    }

    /// Mutable endpoint behind `port`.
    pub fn endpoint_mut(&mut self, port: usize) -> Option<&mut (dyn PcieEndpoint + 'static)> {
        self.ports.get_mut(port).map(|p| p.endpoint.as_mut())
    }

    /// Returns `true` when no request is outstanding and every link is empty.
    pub fn is_idle(&self) -> bool {
        self.outstanding.is_empty()
            && self
                .ports
                .iter()
                .all(|p| p.downstream.is_empty() && p.upstream.is_empty())
    }

    /// Queues `tlp` on the downstream link of `port` without tracking a completion.
    pub fn send_raw(&mut self, port: usize, tlp: Tlp) -> HarnessResult<()> {
        let latency = self.config.link_latency_cycles;
        let p = self
            .ports
            .get_mut(port)
            .ok_or(HarnessError::PortNotFound(port))?;
        trace!(port, %tlp, "downstream");
        p.downstream.push_back(InFlight {
            tlp,
            remaining: latency,
        });
        Ok(())
    }

    fn port_of(&self, id: PcieId) -> HarnessResult<usize> {
        let port = usize::from(id.bus).wrapping_sub(1);
        if port < self.ports.len() {
            Ok(port)
        } else {
            Err(HarnessError::PortNotFound(usize::from(id.bus).saturating_sub(1)))
        }
    }

    fn alloc_tag(&mut self) -> u16 {
        for _ in 0..TAG_SPACE {
            let tag = self.next_tag;
            self.next_tag = (self.next_tag + 1) % TAG_SPACE;
            if !self.outstanding.contains_key(&tag) {
                return tag;
            }
        }
        // Unreachable while callers keep fewer than TAG_SPACE requests outstanding.
        self.next_tag
    }

    /// Sends a non-posted request to `target` and registers its tag.
    fn request(
        &mut self,
        port: usize,
        target: PcieId,
        tlp: Tlp,
        expected: usize,
    ) -> HarnessResult<u16> {
        let tag = tlp.header.tag;
        let addr = if tlp.header.tlp_type.is_memory() {
            tlp.header.first_byte_address()
        } else {
            0
        };
        self.send_raw(port, tlp)?;
        let _ = self.outstanding.insert(
            tag,
            Outstanding {
                target,
                addr,
                data: vec![0; expected],
                status: CplStatus::Success,
                done: false,
            },
        );
        Ok(tag)
    }

    /// Steps the simulator until every tag in `tags` has completed.
    fn await_tags(&mut self, sim: &mut Simulator, tags: &[u16], what: &str) -> HarnessResult<()> {
        let timeout = self.completion_timeout;
        let waited = sim.run_until(self, timeout, what, |_, rc| {
            tags.iter()
                .all(|t| rc.outstanding.get(t).is_some_and(|o| o.done))
        });
        if let Err(err) = waited {
            for tag in tags {
                let _ = self.outstanding.remove(tag);
            }
            warn!(%err, "request timed out");
            return Err(err);
        }
        Ok(())
    }

    /// Removes a finished request and returns its data.
    fn retire(&mut self, tag: u16) -> HarnessResult<Vec<u8>> {
        let entry = self
            .outstanding
            .remove(&tag)
            .ok_or_else(|| HarnessError::timeout(format!("completion for tag {tag}"), SimTime::ZERO))?;
        match entry.status {
            CplStatus::Success => Ok(entry.data),
            status => Err(HarnessError::CompletionFailed { tag, status }),
        }
    }

    fn complete(&mut self, tlp: &Tlp) {
        let hdr = &tlp.header;
        if !hdr.tlp_type.is_completion() {
            warn!(%tlp, "upstream request ignored; the root complex is not a completer");
            return;
        }
        let Some(entry) = self.outstanding.get_mut(&hdr.tag) else {
            self.stats.unexpected_completions += 1;
            warn!(%tlp, "unexpected completion");
            return;
        };
        if entry.done {
            self.stats.unexpected_completions += 1;
            warn!(%tlp, "completion for a request that already finished");
            return;
        }
        if hdr.requester_id != self.id || hdr.completer_id != entry.target {
            self.stats.unexpected_completions += 1;
            warn!(
                %tlp,
                expected_requester = %self.id,
                expected_completer = %entry.target,
                "completion identity mismatch; left unmatched"
            );
            return;
        }
        self.stats.completions += 1;
        if hdr.status != CplStatus::Success {
            self.stats.failed_completions += 1;
            debug!(%tlp, "request failed");
            entry.status = hdr.status;
            entry.done = true;
            return;
        }
        if !hdr.tlp_type.has_data() {
            entry.done = true;
            return;
        }
        let payload = tlp.completion_payload();
        let owed = match hdr.byte_count {
            0 => 4096,
            n => usize::from(n),
        };
        let Some(at) = entry.data.len().checked_sub(owed) else {
            self.stats.unexpected_completions += 1;
            warn!(%tlp, requested = entry.data.len(), "completion byte count exceeds the request");
            return;
        };
        let lower = (entry.addr + at as u64) & 0x7F;
        if u64::from(hdr.lower_address) != lower {
            self.stats.unexpected_completions += 1;
            warn!(
                %tlp,
                expected = %format!("{lower:#x}"),
                "completion lower address mismatch; left unmatched"
            );
            return;
        }
        let end = (at + payload.len()).min(entry.data.len());
        entry.data[at..end].copy_from_slice(&payload[..end - at]);
        entry.done = payload.len() >= owed;
    }

    /// Reads the configuration dword at `reg` of function `id`.
    ///
    /// # Returns
    ///
    /// `CompletionFailed` if the function answers UR (for example because it does not
    /// exist), `ProtocolTimeout` if nothing answers.
    pub fn config_read(&mut self, sim: &mut Simulator, id: PcieId, reg: u16) -> HarnessResult<u32> {
        let port = self.port_of(id)?;
        let tag = self.alloc_tag();
        self.stats.config_requests += 1;
        let _ = self.request(port, id, Tlp::cfg_read(self.id, id, tag, reg), 4)?;
        self.await_tags(sim, &[tag], &format!("config read {id} reg {reg:#x}"))?;
        let data = self.retire(tag)?;
        Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Writes `value` to the configuration dword at `reg` of function `id` under `be`.
    pub fn config_write(
        &mut self,
        sim: &mut Simulator,
        id: PcieId,
        reg: u16,
        value: u32,
        be: u8,
    ) -> HarnessResult<()> {
        let port = self.port_of(id)?;
        let tag = self.alloc_tag();
        self.stats.config_requests += 1;
        let _ = self.request(port, id, Tlp::cfg_write(self.id, id, tag, reg, value, be), 0)?;
        self.await_tags(sim, &[tag], &format!("config write {id} reg {reg:#x}"))?;
        self.retire(tag).map(|_| ())
    }

    /// Returns the header type of `id`, or `None` if no function answers there.
    fn read_header_type(
        &mut self,
        sim: &mut Simulator,
        id: PcieId,
    ) -> HarnessResult<Option<u8>> {
        let ident = match self.config_read(sim, id, cfg::ID) {
            Ok(v) => v,
            Err(HarnessError::CompletionFailed { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if ident as u16 == VENDOR_ID_NONE {
            return Ok(None);
        }
        let header = self.config_read(sim, id, cfg::BIST_HEADER)?;
        Ok(Some((header >> 16) as u8))
    }

    /// Walks every root port and configures each function found.
    ///
    /// Clears the previous function table and address assignment first, so the same
    /// topology always yields the same assignment.
    ///
    /// # Returns
    ///
    /// The number of functions discovered, or `EnumerationFailure` if there are none.
    pub fn enumerate(&mut self, sim: &mut Simulator) -> HarnessResult<usize> {
        self.functions.clear();
        self.mem.reset();
        self.io.reset();

        for port in 0..self.ports.len() {
            let f0 = PcieId::new((port + 1) as u8, 0, 0);
            let Some(header) = self.read_header_type(sim, f0)? else {
                debug!(port, "no device behind root port");
                continue;
            };
            let count = if header & MULTI_FUNCTION != 0 { MAX_FUNCTIONS } else { 1 };
            for function in 0..count {
                let id = f0.with_function(function);
                let header_type = if function == 0 {
                    header
                } else {
                    match self.read_header_type(sim, id)? {
                        Some(h) => h,
                        None => continue,
                    }
                };
                self.configure_function(sim, port, id, header_type)?;
            }
        }

        if self.functions.is_empty() {
            return Err(HarnessError::EnumerationFailure {
                ports: self.ports.len(),
            });
        }
        info!(functions = self.functions.len(), "enumeration complete");
        Ok(self.functions.len())
    }

    fn configure_function(
        &mut self,
        sim: &mut Simulator,
        port: usize,
        id: PcieId,
        header_type: u8,
    ) -> HarnessResult<()> {
        let ident = self.config_read(sim, id, cfg::ID)?;
        let class = self.config_read(sim, id, cfg::CLASS_REVISION)?;
        let subsystem = self.config_read(sim, id, cfg::SUBSYSTEM_ID)?;
        let ids = HardwareIds {
            vendor_id: ident as u16,
            device_id: (ident >> 16) as u16,
            class_code: class >> 8,
            revision_id: class as u8,
            subsystem_vendor_id: subsystem as u16,
            subsystem_id: (subsystem >> 16) as u16,
        };

        // BAR writes are ignored while decoding is on.
        let status_command = self.config_read(sim, id, cfg::STATUS_COMMAND)?;
        let decode = u32::from(command::IO_ENABLE | command::MEMORY_ENABLE | command::BUS_MASTER);
        self.config_write(sim, id, cfg::STATUS_COMMAND, status_command & !decode, 0x3)?;

        let bars = self.assign_bars(sim, id)?;
        let (max_payload, max_read_request) =
            self.negotiate_sizes(sim, id, (status_command >> 16) as u16)?;

        info!(
            %id,
            vendor = %format!("{:#06x}", ids.vendor_id),
            device = %format!("{:#06x}", ids.device_id),
            class = %format!("{:#08x}", ids.class_code),
            bars = bars.iter().flatten().count(),
            max_payload,
            "function enumerated"
        );
        let _ = self.functions.insert(
            id,
            FunctionRecord {
                port,
                ids,
                header_type,
                bars,
                max_payload,
                max_read_request,
                enabled: false,
            },
        );
        Ok(())
    }

    /// Sizes every BAR of `id` with the all-ones sizing write and programs an address for it.
    fn assign_bars(
        &mut self,
        sim: &mut Simulator,
        id: PcieId,
    ) -> HarnessResult<[Option<BarWindow>; BAR_COUNT]> {
        let mut bars = [None; BAR_COUNT];
        let mut index = 0;
        while index < BAR_COUNT {
            let reg = cfg::BAR0 + 4 * index as u16;
            self.config_write(sim, id, reg, u32::MAX, 0xF)?;
            let sized = self.config_read(sim, id, reg)?;
            if sized == 0 {
                index += 1;
                continue;
            }

            let (kind, mask) = if sized & bar::IO_SPACE != 0 {
                (BarKind::Io, u64::from(sized & bar::IO_ADDR_MASK) | 0xFFFF_FFFF_0000_0000)
            } else if sized & bar::TYPE_64BIT != 0 && index + 1 < BAR_COUNT {
                self.config_write(sim, id, reg + 4, u32::MAX, 0xF)?;
                let high = self.config_read(sim, id, reg + 4)?;
                (
                    BarKind::Memory64,
                    u64::from(high) << 32 | u64::from(sized & bar::MEM_ADDR_MASK),
                )
            } else {
                (
                    BarKind::Memory32,
                    u64::from(sized & bar::MEM_ADDR_MASK) | 0xFFFF_FFFF_0000_0000,
                )
            };
            let size = (!mask).wrapping_add(1);
            let prefetchable = kind != BarKind::Io && sized & bar::PREFETCHABLE != 0;

            let base = match kind {
                BarKind::Io => self.io.allocate(size)?,
                BarKind::Memory32 => {
                    let base = self.mem.allocate(size)?;
                    if base + size > 1 << 32 {
                        return Err(HarnessError::AddressSpaceExhausted { size });
                    }
                    base
                }
                BarKind::Memory64 => self.mem.allocate(size)?,
            };
            self.config_write(sim, id, reg, base as u32, 0xF)?;
            if kind == BarKind::Memory64 {
                self.config_write(sim, id, reg + 4, (base >> 32) as u32, 0xF)?;
            }
            debug!(
                %id,
                index,
                base = %format!("{base:#x}"),
                size = %format!("{size:#x}"),
                ?kind,
                "BAR assigned"
            );
            bars[index] = Some(BarWindow {
                function: id,
                index,
                base,
                size,
                kind,
                prefetchable,
            });
            index += if kind == BarKind::Memory64 { 2 } else { 1 };
        }
        Ok(bars)
    }

    /// Finds the PCI Express capability, programs MPS and MRRS, and returns them in bytes.
    fn negotiate_sizes(
        &mut self,
        sim: &mut Simulator,
        id: PcieId,
        status: u16,
    ) -> HarnessResult<(usize, usize)> {
        let fallback = (size_code_to_bytes(0), size_code_to_bytes(0));
        if status & crate::common::constants::status::CAP_LIST == 0 {
            warn!(%id, "no capability list; assuming 128-byte payloads");
            return Ok(fallback);
        }
        let mut ptr = (self.config_read(sim, id, cfg::CAP_PTR)? & 0xFC) as u16;
        let mut found = None;
        for _ in 0..MAX_CAPABILITIES {
            if ptr == 0 {
                break;
            }
            let header = self.config_read(sim, id, ptr)?;
            if header as u8 == pcie_cap::ID {
                found = Some(ptr);
                break;
            }
            ptr = ((header >> 8) & 0xFC) as u16;
        }
        let Some(cap) = found else {
            warn!(%id, "no PCI Express capability; assuming 128-byte payloads");
            return Ok(fallback);
        };

        let devcap = self.config_read(sim, id, cap + pcie_cap::DEVICE_CAPS)?;
        let supported = (devcap & pcie_cap::SIZE_FIELD_MASK) as u8;
        let mps = supported.min(bytes_to_size_code(self.config.root_max_payload));
        let mrrs = bytes_to_size_code(self.config.max_read_request);

        let devctl_reg = cap + pcie_cap::DEVICE_CONTROL;
        let devctl = self.config_read(sim, id, devctl_reg)?;
        let field = pcie_cap::SIZE_FIELD_MASK;
        let value = devctl
            & !(field << pcie_cap::DEVCTL_MPS_SHIFT)
            & !(field << pcie_cap::DEVCTL_MRRS_SHIFT)
            | u32::from(mps) << pcie_cap::DEVCTL_MPS_SHIFT
            | u32::from(mrrs) << pcie_cap::DEVCTL_MRRS_SHIFT;
        // Byte enables 0x3 keep the Device Status half untouched.
        self.config_write(sim, id, devctl_reg, value, 0x3)?;
        Ok((size_code_to_bytes(mps), size_code_to_bytes(mrrs)))
    }

    /// Looks up an enumerated function.
    ///
    /// # Returns
    ///
    /// `DeviceNotFound` if `id` was not discovered by the last enumeration (or none ran).
    pub fn find_device(&self, id: PcieId) -> HarnessResult<DeviceHandle> {
        self.functions
            .get(&id)
            .map(|r| DeviceHandle::from_record(id, r))
            .ok_or(HarnessError::DeviceNotFound(id))
    }

    /// Identities of every enumerated function, in topology order.
    pub fn devices(&self) -> impl Iterator<Item = PcieId> + '_ {
        self.functions.keys().copied()
    }

    /// Sets memory space enable and bus master enable on `id`.
    ///
    /// I/O space enable is also set when the function has an I/O BAR.
    pub fn enable_device(&mut self, sim: &mut Simulator, id: PcieId) -> HarnessResult<()> {
        let has_io = self
            .functions
            .get(&id)
            .ok_or(HarnessError::DeviceNotFound(id))?
            .bars
            .iter()
            .flatten()
            .any(|b| b.kind == BarKind::Io);
        let current = self.config_read(sim, id, cfg::STATUS_COMMAND)?;
        let mut bits = command::MEMORY_ENABLE | command::BUS_MASTER;
        if has_io {
            bits |= command::IO_ENABLE;
        }
        self.config_write(sim, id, cfg::STATUS_COMMAND, current | u32::from(bits), 0x3)?;
        if let Some(record) = self.functions.get_mut(&id) {
            record.enabled = true;
        }
        info!(%id, "device enabled");
        Ok(())
    }

    /// Checks that `window` may carry memory traffic; returns (port, max payload, max read).
    fn check_access(&self, window: &BarWindow) -> HarnessResult<(usize, usize, usize)> {
        let id = window.function;
        let record = self
            .functions
            .get(&id)
            .ok_or(HarnessError::DeviceNotFound(id))?;
        if !record.enabled {
            return Err(HarnessError::DeviceNotEnabled(id));
        }
        if window.kind == BarKind::Io {
            return Err(HarnessError::UnsupportedBarKind {
                id,
                index: window.index,
            });
        }
        Ok((record.port, record.max_payload, record.max_read_request))
    }

    /// Writes `data` at `offset` into `window`.
    ///
    /// The transfer is split into memory writes that respect the negotiated max payload
    /// size and never cross a 4 KiB boundary. Writes are posted: this returns once every TLP
    /// has crossed the link, not once the target applied it.
    pub fn bar_write(
        &mut self,
        sim: &mut Simulator,
        window: &BarWindow,
        offset: u64,
        data: &[u8],
    ) -> HarnessResult<()> {
        let (port, mps, _) = self.check_access(window)?;
        let addr = window.translate(offset, data.len())?;
        let mut done = 0;
        while done < data.len() {
            let at = addr + done as u64;
            let chunk = (data.len() - done)
                .min(mps)
                .min(bytes_to_page_boundary(at) as usize);
            let tag = self.alloc_tag();
            let tlp = Tlp::mem_write(self.id, tag, at, &data[done..done + chunk]);
            debug!(addr = %format!("{at:#x}"), len = chunk, "memory write");
            self.send_raw(port, tlp)?;
            self.stats.memory_writes += 1;
            self.stats.bytes_written += chunk as u64;
            done += chunk;
        }
        let timeout = self.completion_timeout;
        sim.run_until(self, timeout, "posted writes to cross the link", |_, rc| {
            rc.ports[port].downstream.is_empty()
        })
    }

    /// Reads `len` bytes at `offset` from `window`.
    ///
    /// Requests respect the max read request size and 4 KiB boundaries; up to 32 are kept
    /// in flight. Completions may arrive split and are placed by their byte count.
    pub fn bar_read(
        &mut self,
        sim: &mut Simulator,
        window: &BarWindow,
        offset: u64,
        len: usize,
    ) -> HarnessResult<Vec<u8>> {
        let (port, _, mrrs) = self.check_access(window)?;
        let addr = window.translate(offset, len)?;
        let mut out = vec![0u8; len];
        let mut done = 0;
        while done < len {
            let mut batch = Vec::with_capacity(READ_BATCH);
            while done < len && batch.len() < READ_BATCH {
                let at = addr + done as u64;
                let chunk = (len - done)
                    .min(mrrs)
                    .min(bytes_to_page_boundary(at) as usize);
                let tag = self.alloc_tag();
                debug!(addr = %format!("{at:#x}"), len = chunk, tag, "memory read");
                let tlp = Tlp::mem_read(self.id, tag, at, chunk);
                let _ = self.request(port, window.function, tlp, chunk)?;
                self.stats.memory_reads += 1;
                batch.push((tag, done));
                done += chunk;
            }
            let tags: Vec<u16> = batch.iter().map(|&(t, _)| t).collect();
            self.await_tags(sim, &tags, &format!("read completions at {addr:#x}"))?;
            for (tag, from) in batch {
                let data = self.retire(tag)?;
                out[from..from + data.len()].copy_from_slice(&data);
                self.stats.bytes_read += data.len() as u64;
            }
        }
        Ok(out)
    }
}

impl Clocked for RootComplex {
    fn name(&self) -> &str {
        "root-complex"
    }

    fn on_rising_edge(&mut self, ports: &mut DutPorts, now: SimTime) {
        let mut arrived = Vec::new();
        for port in &mut self.ports {
            for tlp in RootPort::advance(&mut port.downstream) {
                port.endpoint.deliver(tlp);
            }
            port.endpoint.on_rising_edge(ports, now);
            while let Some(tlp) = port.endpoint.take_upstream() {
                port.upstream.push_back(InFlight {
                    tlp,
                    remaining: self.config.link_latency_cycles,
                });
            }
            arrived.extend(RootPort::advance(&mut port.upstream));
        }
        for tlp in &arrived {
            trace!(%tlp, "upstream");
            self.complete(tlp);
        }
    }
}

impl BarWindow {
    /// Writes `data` at `offset`; see `RootComplex::bar_write`.
    pub fn write(
        &self,
        rc: &mut RootComplex,
        sim: &mut Simulator,
        offset: u64,
        data: &[u8],
    ) -> HarnessResult<()> {
        rc.bar_write(sim, self, offset, data)
    }

    /// Reads `len` bytes at `offset`; see `RootComplex::bar_read`.
    pub fn read(
        &self,
        rc: &mut RootComplex,
        sim: &mut Simulator,
        offset: u64,
        len: usize,
    ) -> HarnessResult<Vec<u8>> {
        rc.bar_read(sim, self, offset, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_aligns_naturally() {
        let mut w = WindowAllocator::new(0x8000_0000, 0x4000_0000);
        assert_eq!(w.allocate(0x1000), Ok(0x8000_0000));
        assert_eq!(w.allocate(0x100_0000), Ok(0x8100_0000));
        assert_eq!(w.allocate(0x10), Ok(0x8200_0000));
        w.reset();
        assert_eq!(w.allocate(0x10), Ok(0x8000_0000));
    }

    #[test]
    fn allocator_reports_exhaustion() {
        let mut w = WindowAllocator::new(0x1000, 0x2000);
        assert_eq!(w.allocate(0x1000), Ok(0x1000));
        assert_eq!(
            w.allocate(0x2000),
            Err(HarnessError::AddressSpaceExhausted { size: 0x2000 })
        );
    }

    #[test]
    fn completions_match_on_identity_and_lower_address() {
        let mut rc = RootComplex::new(&Config::default());
        let target = PcieId::new(1, 0, 0);
        let hdr = Tlp::mem_read(rc.id, 5, 0x8000_0040, 8).header;
        let _ = rc.outstanding.insert(
            5,
            Outstanding {
                target,
                addr: 0x8000_0040,
                data: vec![0; 8],
                status: CplStatus::Success,
                done: false,
            },
        );

        rc.complete(&Tlp::completion_data(&hdr, PcieId::new(1, 0, 3), 0x8000_0040, &[1; 8], 8));
        rc.complete(&Tlp::completion_data(&hdr, target, 0x8000_0044, &[1; 8], 8));
        let mut foreign = hdr;
        foreign.requester_id = PcieId::new(0, 1, 0);
        rc.complete(&Tlp::completion_data(&foreign, target, 0x8000_0040, &[1; 8], 8));
        assert_eq!(rc.stats.unexpected_completions, 3);
        assert!(!rc.outstanding[&5].done);

        rc.complete(&Tlp::completion_data(&hdr, target, 0x8000_0040, &[1; 8], 8));
        assert_eq!(rc.stats.unexpected_completions, 3);
        assert!(rc.outstanding[&5].done);
        assert_eq!(rc.outstanding[&5].data, vec![1; 8]);
    }

    #[test]
    fn link_delivers_in_order_after_latency() {
        let mut link: VecDeque<InFlight> = (0..2u16)
            .map(|tag| InFlight {
                tlp: Tlp::mem_read(PcieId::default(), tag, 0, 4),
                remaining: 2,
            })
            .collect();
        assert!(RootPort::advance(&mut link).is_empty());
        let arrived = RootPort::advance(&mut link);
        assert_eq!(arrived.len(), 2);
        assert_eq!(arrived[1].header.tag, 1);
    }
}
