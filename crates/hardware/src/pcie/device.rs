//! PCIe device adapter.
//!
//! The adapter sits between a root port and the DUT's streaming TLP interfaces. It provides:
//! 1. **Configuration:** Type 0 requests are answered from the emulated configuration space of
//!    the addressed function; the DUT never sees them.
//! 2. **Request path:** Memory requests that hit an enabled BAR are streamed beat by beat onto
//!    `rx_req_tlp`, tagged with the BAR and function they decoded to.
//! 3. **Completion path:** Beats the DUT drives on `tx_cpl_tlp` are reassembled into TLPs and
//!    forwarded upstream unchanged.
//!
//! Requests that miss every BAR (or arrive with memory decoding disabled) are dropped when
//! posted and answered with Unsupported Request otherwise.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, trace, warn};

use super::bus::{TlpAssembler, TlpBeat, to_beats};
use super::config_space::HardwareIds;
use super::function::PcieFunction;
use super::tlp::{CplStatus, Tlp};
use crate::common::{HarnessResult, SimTime};
use crate::config::PcieConfig;
use crate::dut::DutPorts;
use crate::sim::Clocked;

/// An endpoint attached to a root port.
///
/// The root complex delivers downstream TLPs with `deliver`, collects upstream TLPs with
/// `take_upstream`, and ticks the endpoint through `Clocked` so it can drive the DUT.
pub trait PcieEndpoint: Clocked + fmt::Debug {
    /// Functions implemented by the endpoint, in function-number order.
    fn functions(&self) -> &[PcieFunction];

    /// Accepts a TLP that has crossed the link.
    fn deliver(&mut self, tlp: Tlp);

    /// Removes the next TLP waiting to go upstream.
    fn take_upstream(&mut self) -> Option<Tlp>;

    /// Returns `true` when nothing is buffered in either direction.
    fn is_idle(&self) -> bool;

    /// Traffic counters.
    fn counters(&self) -> AdapterStats {
        AdapterStats::default()
    }
}

/// Counters kept by the device adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    /// Configuration requests answered.
    pub config_requests: u64,
    /// Memory requests streamed into the DUT.
    pub requests_forwarded: u64,
    /// Completions reassembled from the DUT and sent upstream.
    pub completions_returned: u64,
    /// Posted requests discarded because no enabled BAR claimed them.
    pub dropped_posted: u64,
    /// Non-posted requests answered with Unsupported Request.
    pub unsupported_requests: u64,
}

/// Adapter between the root complex and a DUT with `pcie_if` style TLP streams.
#[derive(Debug)]
pub struct PcieIfDevice {
    functions: Vec<PcieFunction>,
    inbound: VecDeque<Tlp>,
    rx_beats: VecDeque<TlpBeat>,
    cpl_assembler: TlpAssembler,
    upstream: VecDeque<Tlp>,
    stats: AdapterStats,
}

impl PcieIfDevice {
    /// Creates an adapter exposing a single function described by `config`.
    ///
    /// No BARs are declared; call `configure_bar` before the root complex enumerates.
    pub fn new(config: &PcieConfig) -> Self {
        let mut dev = Self {
            functions: Vec::new(),
            inbound: VecDeque::new(),
            rx_beats: VecDeque::new(),
            cpl_assembler: TlpAssembler::new(),
            upstream: VecDeque::new(),
            stats: AdapterStats::default(),
        };
        let _ = dev.add_function(
            HardwareIds {
                vendor_id: config.vendor_id,
                device_id: config.device_id,
                class_code: config.class_code,
                ..HardwareIds::default()
            },
            config.endpoint_max_payload,
        );
        dev
    }

    /// Adds another function; the device becomes multi-function.
    ///
    /// # Returns
    ///
    /// The new function, for BAR configuration. Devices are limited to 8 functions; beyond
    /// that the last function is returned unchanged.
    pub fn add_function(&mut self, ids: HardwareIds, max_payload: usize) -> &mut PcieFunction {
        if self.functions.len() < 8 {
            let number = self.functions.len() as u8;
            self.functions.push(PcieFunction::new(number, ids, max_payload));
        }
        let multi = self.functions.len() > 1;
        for f in &mut self.functions {
            f.config_mut().set_multi_function(multi);
        }
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    /// Function `number`, if implemented.
    pub fn function(&self, number: u8) -> Option<&PcieFunction> {
        self.functions.get(usize::from(number))
    }

    /// Mutable access to function `number`, if implemented.
    pub fn function_mut(&mut self, number: u8) -> Option<&mut PcieFunction> {
        self.functions.get_mut(usize::from(number))
    }

    /// Declares BAR `index` of function 0 with `size` bytes.
    pub fn configure_bar(&mut self, index: usize, size: u64) -> HarnessResult<()> {
        self.functions[0].configure_bar(index, size)
    }

    /// Adapter counters.
    pub const fn stats(&self) -> &AdapterStats {
        &self.stats
    }

    fn route(&mut self, tlp: Tlp) {
        let hdr = tlp.header;
        if hdr.tlp_type.is_config() {
            self.stats.config_requests += 1;
            // Below a root port only device 0 exists.
            let target = hdr.completer_id;
            let function = if target.device == 0 {
                self.functions.get_mut(usize::from(target.function))
            } else {
                None
            };
            let cpl = match function {
                Some(f) => f.handle_config(&tlp),
                None => {
                    debug!(%target, "configuration request to an absent function; UR");
                    Tlp::completion(&hdr, target, CplStatus::UnsupportedRequest)
                }
            };
            self.upstream.push_back(cpl);
            return;
        }
        if !hdr.tlp_type.is_memory() {
            warn!(%tlp, "unexpected downstream TLP dropped");
            return;
        }
        let addr = hdr.first_byte_address();
        let hit = self.functions.iter().find_map(|f| {
            f.config()
                .decode_memory(addr)
                .map(|(bar, _)| (bar as u8, f.number()))
        });
        match hit {
            Some((bar_id, func_num)) => {
                trace!(%tlp, bar_id, func_num, "forwarding request to DUT");
                self.stats.requests_forwarded += 1;
                self.rx_beats.extend(to_beats(&tlp, bar_id, func_num));
            }
            None if hdr.tlp_type.is_posted() => {
                self.stats.dropped_posted += 1;
                warn!(addr = %format!("{addr:#x}"), "posted write matched no enabled BAR; dropped");
            }
            None => {
                self.stats.unsupported_requests += 1;
                let me = self.functions[0].pcie_id();
                warn!(addr = %format!("{addr:#x}"), "read matched no enabled BAR; UR");
                self.upstream
                    .push_back(Tlp::completion(&hdr, me, CplStatus::UnsupportedRequest));
            }
        }
    }
}

impl Clocked for PcieIfDevice {
    fn name(&self) -> &str {
        "pcie-if-device"
    }

    fn on_rising_edge(&mut self, ports: &mut DutPorts, _now: SimTime) {
        ports.max_payload_size.set(self.functions[0].config().mps_code());
        if ports.rst.get() {
            self.rx_beats.clear();
            self.cpl_assembler.clear();
            ports.rx_req_tlp.valid.set(false);
            ports.tx_cpl_tlp.ready.set(false);
            return;
        }

        if let Some(tlp) = self.inbound.pop_front() {
            self.route(tlp);
        }

        let _ = ports.rx_req_tlp.drive_from(&mut self.rx_beats);

        let Some(beat) = ports.tx_cpl_tlp.accept(true) else {
            return;
        };
        if let Some((tlp, _, _)) = self.cpl_assembler.push(&beat) {
            debug!(%tlp, "completion from DUT");
            self.stats.completions_returned += 1;
            self.upstream.push_back(tlp);
        }
    }
}

impl PcieEndpoint for PcieIfDevice {
    fn functions(&self) -> &[PcieFunction] {
        &self.functions
    }

    fn deliver(&mut self, tlp: Tlp) {
        self.inbound.push_back(tlp);
    }

    fn take_upstream(&mut self) -> Option<Tlp> {
        self.upstream.pop_front()
    }

    fn is_idle(&self) -> bool {
        self.inbound.is_empty()
            && self.rx_beats.is_empty()
            && self.upstream.is_empty()
            && !self.cpl_assembler.in_progress()
    }

    fn counters(&self) -> AdapterStats {
        self.stats
    }
}
