//! Testbench assembly: kernel, DUT, AXI memory and root complex wired together.

use tracing::{debug, info};

use crate::common::{HarnessError, HarnessResult, PcieId, SimTime};
use crate::config::Config;
use crate::dut::{Dut, ReferenceBridge};
use crate::pcie::{DeviceHandle, PcieIfDevice, RootComplex};
use crate::sim::Simulator;
use crate::stats::SimStats;

/// A complete bench: one root port, one device adapter, the DUT and its AXI memory.
///
/// `sim` and `rc` are public so tests can drive them directly; blocking root complex calls
/// take both, e.g. `window.write(&mut tb.rc, &mut tb.sim, offset, data)`.
#[derive(Debug)]
pub struct Testbench {
    /// Configuration the bench was built from.
    pub config: Config,
    /// Simulation kernel holding the DUT and the AXI memory.
    pub sim: Simulator,
    /// Root complex with the device adapter attached.
    pub rc: RootComplex,
    port: usize,
}

impl Testbench {
    /// Builds a bench around the reference bridge model.
    pub fn new(config: Config) -> HarnessResult<Self> {
        let dut = Box::new(ReferenceBridge::new(&config.bridge));
        Self::with_dut(config, dut)
    }

    /// Builds a bench around `dut`.
    ///
    /// The adapter exposes one function with a 64-bit BAR0 of `pcie.bar0_size` bytes.
    pub fn with_dut(config: Config, dut: Box<dyn Dut>) -> HarnessResult<Self> {
        config.validate()?;
        let mut device = PcieIfDevice::new(&config.pcie);
        device.configure_bar(0, config.pcie.bar0_size)?;
        Self::with_device(config, dut, device)
    }

    /// Builds a bench around `dut` with a caller-prepared device adapter.
    ///
    /// # Returns
    ///
    /// `InvalidConfig` if `config` fails `Config::validate`.
    pub fn with_device(
        config: Config,
        dut: Box<dyn Dut>,
        device: PcieIfDevice,
    ) -> HarnessResult<Self> {
        config.validate()?;
        let sim = Simulator::new(&config, dut);
        let mut rc = RootComplex::new(&config);
        let port = rc.attach(Box::new(device));
        info!(dut = sim.dut.name(), "testbench assembled");
        Ok(Self {
            config,
            sim,
            rc,
            port,
        })
    }

    /// Root port the device adapter is attached to.
    pub const fn port(&self) -> usize {
        self.port
    }

    /// Current simulated time.
    pub const fn now(&self) -> SimTime {
        self.sim.now()
    }

    /// Drives the reset sequence: idle, assert, release, settle.
    ///
    /// Reset is active high. Edge counts come from `config.reset`.
    pub fn cycle_reset(&mut self) {
        let reset = self.config.reset.clone();
        self.sim.ports.rst.set_immediate(false);
        self.sim.wait_edges(&mut self.rc, u64::from(reset.idle_edges));
        self.sim.ports.rst.set_immediate(true);
        debug!(at = %self.sim.now(), "reset asserted");
        self.sim.wait_edges(&mut self.rc, u64::from(reset.active_edges));
        self.sim.ports.rst.set_immediate(false);
        debug!(at = %self.sim.now(), "reset released");
        self.sim.wait_edges(&mut self.rc, u64::from(reset.settle_edges));
    }

    /// Runs root complex enumeration.
    pub fn enumerate(&mut self) -> HarnessResult<usize> {
        self.rc.enumerate(&mut self.sim)
    }

    /// Identity the adapter's function `number` captured from enumeration.
    pub fn function_id(&self, number: u8) -> Option<PcieId> {
        self.rc
            .endpoint(self.port)?
            .functions()
            .get(usize::from(number))
            .map(crate::pcie::PcieFunction::pcie_id)
    }

    /// Drives the DUT's `completer_id` input.
    pub fn set_completer_id(&mut self, id: PcieId) {
        self.sim.ports.completer_id.set_immediate(id.to_u16());
        debug!(%id, "completer id programmed");
    }

    /// Looks up function `number`, enables it and programs the DUT's completer id with it.
    pub fn enable_function(&mut self, number: u8) -> HarnessResult<DeviceHandle> {
        let id = self
            .function_id(number)
            .ok_or_else(|| HarnessError::DeviceNotFound(PcieId::new(self.port as u8 + 1, 0, number)))?;
        let mut device = self.rc.find_device(id)?;
        device.enable_device(&mut self.rc, &mut self.sim)?;
        self.set_completer_id(id);
        Ok(device)
    }

    /// Maps a host address inside a BAR window to the AXI address the bridge drives.
    pub const fn axi_address(&self, host: u64) -> u64 {
        host & self.config.bridge.axi_addr_mask()
    }

    /// Runs `edges` rising edges.
    pub fn wait_edges(&mut self, edges: u64) {
        self.sim.wait_edges(&mut self.rc, edges);
    }

    /// Runs for `amount` clock units of simulated time.
    pub fn wait_for(&mut self, amount: u64) {
        let duration = self.config.time(amount);
        self.sim.wait_for(&mut self.rc, duration);
    }

    /// Runs until the root complex, the adapter and the DUT have drained.
    pub fn drain(&mut self, timeout: u64) -> HarnessResult<()> {
        let port = self.port;
        let timeout = self.config.time(timeout);
        self.sim.run_until(&mut self.rc, timeout, "the bench to drain", |sim, rc| {
            rc.is_idle()
                && rc.endpoint(port).is_some_and(|e| e.is_idle())
                && sim.dut.is_idle()
                && sim.axi_ram.is_idle()
        })
    }

    /// Collects the counters of every component.
    pub fn stats(&self) -> SimStats {
        let adapter = self
            .rc
            .endpoint(self.port)
            .map(|e| e.counters())
            .unwrap_or_default();
        SimStats::collect(&self.sim, self.rc.stats(), adapter)
    }
}
