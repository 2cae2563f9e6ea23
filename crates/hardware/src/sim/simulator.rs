//! Simulator: owns the scheduler, the clock, the DUT pins and the components behind them.
//!
//! The root complex is not owned here. Blocking harness operations hold the root complex and
//! lend it to the kernel as the *host* for each step, so the root complex can advance
//! simulated time without shared ownership of the simulator.

use std::fmt;

use tracing::trace;

use super::clock::Clock;
use super::scheduler::{EventKind, Scheduler};
use super::traits::Clocked;
use crate::axi::AxiRam;
use crate::common::{HarnessError, HarnessResult, SimTime};
use crate::config::Config;
use crate::dut::{Dut, DutPorts};

/// Top-level simulation kernel.
pub struct Simulator {
    scheduler: Scheduler,
    clock: Clock,
    /// Every signal on the DUT boundary.
    pub ports: DutPorts,
    /// Model of the bridge under test.
    pub dut: Box<dyn Dut>,
    /// AXI memory behind the bridge.
    pub axi_ram: AxiRam,
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("now", &self.now())
            .field("clock", &self.clock)
            .field("dut", &self.dut.name())
            .field("axi_ram", &self.axi_ram.size())
            .finish_non_exhaustive()
    }
}

impl Simulator {
    /// Creates a kernel around `dut` and starts the clock.
    pub fn new(config: &Config, dut: Box<dyn Dut>) -> Self {
        let mut scheduler = Scheduler::new();
        let mut clock = Clock::new();
        clock.start(&mut scheduler, config.clock.period, config.clock.unit);
        Self {
            scheduler,
            clock,
            ports: DutPorts::default(),
            dut,
            axi_ram: AxiRam::new(config.axi.ram_size),
        }
    }

    /// Current simulated time.
    #[inline]
    pub const fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    /// The clock generator.
    pub const fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Rising edges elapsed since time zero.
    pub const fn cycles(&self) -> u64 {
        self.clock.rising_edges()
    }

    /// Processes the next scheduled event.
    ///
    /// On a rising edge the host, the DUT and the AXI memory each run once, then every
    /// signal commits.
    ///
    /// # Returns
    ///
    /// The event that was processed, or `None` if nothing is scheduled.
    pub fn step<H: Clocked + ?Sized>(&mut self, host: &mut H) -> Option<EventKind> {
        let (now, kind) = self.scheduler.pop()?;
        match kind {
            EventKind::RisingEdge => {
                self.clock.on_edge(&mut self.scheduler, kind);
                host.on_rising_edge(&mut self.ports, now);
                self.dut.on_rising_edge(&mut self.ports, now);
                self.axi_ram.on_rising_edge(&mut self.ports, now);
                self.ports.commit();
                #[cfg(feature = "wire-trace")]
                trace!(
                    %now,
                    rst = self.ports.rst.get(),
                    rx_valid = self.ports.rx_req_tlp.valid.get(),
                    rx_ready = self.ports.rx_req_tlp.ready.get(),
                    aw = self.ports.m_axi.aw.fired(),
                    w = self.ports.m_axi.w.fired(),
                    b = self.ports.m_axi.b.fired(),
                    "edge committed"
                );
            }
            EventKind::FallingEdge => self.clock.on_edge(&mut self.scheduler, kind),
            EventKind::Timer(id) => trace!(%now, ?id, "timer expired"),
        }
        Some(kind)
    }

    /// Runs until `edges` rising edges have been processed.
    pub fn wait_edges<H: Clocked + ?Sized>(&mut self, host: &mut H, edges: u64) {
        let target = self.clock.rising_edges() + edges;
        while self.clock.rising_edges() < target {
            if self.step(host).is_none() {
                break;
            }
        }
    }

    /// Runs until `duration` of simulated time has passed.
    pub fn wait_for<H: Clocked + ?Sized>(&mut self, host: &mut H, duration: SimTime) {
        let timer = self.scheduler.start_timer(duration);
        while let Some(kind) = self.step(host) {
            if kind == EventKind::Timer(timer) {
                break;
            }
        }
    }

    /// Runs until `done` holds, checking after every rising edge.
    ///
    /// # Arguments
    ///
    /// * `host` - Component driven alongside the DUT (normally the root complex).
    /// * `timeout` - Upper bound on simulated time spent waiting.
    /// * `what` - Description used in the timeout error.
    /// * `done` - Completion predicate over the kernel and the host.
    ///
    /// # Returns
    ///
    /// `ProtocolTimeout` if `done` is still false after `timeout`.
    pub fn run_until<H, F>(
        &mut self,
        host: &mut H,
        timeout: SimTime,
        what: &str,
        mut done: F,
    ) -> HarnessResult<()>
    where
        H: Clocked + ?Sized,
        F: FnMut(&Self, &H) -> bool,
    {
        let start = self.now();
        let deadline = start + timeout;
        loop {
            if done(self, host) {
                return Ok(());
            }
            if self.now() >= deadline {
                return Err(HarnessError::timeout(what, self.now() - start));
            }
            match self.step(host) {
                Some(_) => {}
                None => return Err(HarnessError::timeout(what, self.now() - start)),
            }
        }
    }
}
