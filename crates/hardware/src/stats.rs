//! Simulation statistics collection and reporting.
//!
//! This module gathers the counters every component keeps into one summary. It provides:
//! 1. **Kernel:** Rising edges, simulated time and host wall-clock time.
//! 2. **PCIe:** Requests issued by the root complex, completions matched and unexpected, and
//!    traffic the device adapter forwarded, dropped or rejected.
//! 3. **AXI:** Bursts, beats and bytes the memory model absorbed or returned.

use std::time::Instant;

use crate::axi::AxiRamStats;
use crate::common::SimTime;
use crate::pcie::{AdapterStats, RcStats};
use crate::sim::Simulator;

/// Snapshot of every component's counters.
#[derive(Debug, Clone)]
pub struct SimStats {
    start_time: Instant,
    /// Rising edges processed.
    pub cycles: u64,
    /// Simulated time at collection.
    pub sim_time: SimTime,
    /// Root complex counters.
    pub rc: RcStats,
    /// Device adapter counters.
    pub adapter: AdapterStats,
    /// AXI memory counters.
    pub axi: AxiRamStats,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: 0,
            sim_time: SimTime::ZERO,
            rc: RcStats::default(),
            adapter: AdapterStats::default(),
            axi: AxiRamStats::default(),
        }
    }
}

impl SimStats {
    /// Collects counters from the kernel and the PCIe components.
    pub fn collect(sim: &Simulator, rc: &RcStats, adapter: AdapterStats) -> Self {
        Self {
            cycles: sim.cycles(),
            sim_time: sim.now(),
            rc: *rc,
            adapter,
            axi: *sim.axi_ram.stats(),
            ..Self::default()
        }
    }

    /// Restarts the wall-clock measurement used by `print`.
    pub fn with_start(mut self, start: Instant) -> Self {
        self.start_time = start;
        self
    }

    /// Prints the sections named in `sections` (`summary`, `pcie`, `axi`); all if empty.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let seconds = self.start_time.elapsed().as_secs_f64().max(f64::EPSILON);

        if want("summary") {
            let khz = (self.cycles as f64 / seconds) / 1000.0;
            println!("\n==========================================================");
            println!("PCIE-AXI TESTBENCH STATISTICS");
            println!("==========================================================");
            println!("host_seconds             {seconds:.4} s");
            println!("sim_cycles               {}", self.cycles);
            println!("sim_time                 {}", self.sim_time);
            println!("sim_freq                 {khz:.2} kHz");
            println!("----------------------------------------------------------");
        }
        if want("pcie") {
            let rc = &self.rc;
            let ad = &self.adapter;
            println!("PCIE");
            println!("  rc.config_requests     {}", rc.config_requests);
            println!("  rc.memory_writes       {}", rc.memory_writes);
            println!("  rc.memory_reads        {}", rc.memory_reads);
            println!("  rc.bytes_written       {}", rc.bytes_written);
            println!("  rc.bytes_read          {}", rc.bytes_read);
            println!("  rc.completions         {}", rc.completions);
            println!("  rc.cpl_failed          {}", rc.failed_completions);
            println!("  rc.cpl_unexpected      {}", rc.unexpected_completions);
            println!("  ep.config_requests     {}", ad.config_requests);
            println!("  ep.requests_to_dut     {}", ad.requests_forwarded);
            println!("  ep.completions_up      {}", ad.completions_returned);
            println!("  ep.dropped_posted      {}", ad.dropped_posted);
            println!("  ep.unsupported         {}", ad.unsupported_requests);
            println!("----------------------------------------------------------");
        }
        if want("axi") {
            let axi = &self.axi;
            println!("AXI");
            println!("  write_bursts           {}", axi.write_bursts);
            println!("  write_beats            {}", axi.write_beats);
            println!("  bytes_written          {}", axi.bytes_written);
            println!("  read_bursts            {}", axi.read_bursts);
            println!("  read_beats             {}", axi.read_beats);
            println!("==========================================================");
        }
    }

    /// Prints every section.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
