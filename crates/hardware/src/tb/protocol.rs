//! Test protocol driver.
//!
//! The driver walks a fixed sequence of states:
//!
//! `INIT -> RESET -> ENUMERATED -> ENABLED -> WRITE_LENGTH_<n>* -> DONE`
//!
//! and stops at the first error, reporting the state it was in. Each length case writes a
//! deterministic pattern through BAR 0, waits for it to settle and compares the AXI memory
//! byte for byte. `ReadTest` runs the same sequence in the other direction: it preloads the
//! memory and reads the pattern back through the BAR window.

use std::fmt;

use thiserror::Error;
use tracing::{error, info};

use super::testbench::Testbench;
use crate::common::{AccessKind, HarnessError, HarnessResult, Mismatch, PcieId, SimTime};
use crate::config::{ProtocolConfig, SettleMode};
use crate::pcie::BarWindow;

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestState {
    /// Nothing has run yet.
    Init,
    /// Reset pulse.
    Reset,
    /// Enumeration.
    Enumerated,
    /// Lookup, enablement and completer id programming.
    Enabled,
    /// One transfer of `length` bytes.
    Length {
        /// Transfer direction.
        access: AccessKind,
        /// Transfer size in bytes.
        length: usize,
    },
    /// Every case passed.
    Done,
    /// A state failed; see `TestFailure::state`.
    Failed,
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("INIT"),
            Self::Reset => f.write_str("RESET"),
            Self::Enumerated => f.write_str("ENUMERATED"),
            Self::Enabled => f.write_str("ENABLED"),
            Self::Length {
                access: AccessKind::Write,
                length,
            } => write!(f, "WRITE_LENGTH_{length}"),
            Self::Length {
                access: AccessKind::Read,
                length,
            } => write!(f, "READ_LENGTH_{length}"),
            Self::Done => f.write_str("DONE"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

/// Outcome of one length case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    /// Transfer size in bytes.
    pub length: usize,
    /// AXI address the transfer landed at.
    pub address: u64,
    /// Simulated time at which the case passed.
    pub completed_at: SimTime,
    /// Time spent waiting for the write to settle (zero for reads).
    pub settle: SimTime,
}

/// Report of a passing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    /// Direction that was exercised.
    pub access: AccessKind,
    /// Function under test.
    pub device: PcieId,
    /// Functions found by enumeration.
    pub functions: usize,
    /// One entry per length, in sweep order.
    pub cases: Vec<CaseResult>,
    /// Terminal state (always `Done`).
    pub state: TestState,
}

/// Report of a failing run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{state} failed: {error}")]
pub struct TestFailure {
    /// State whose work failed.
    pub state: TestState,
    /// Cause.
    #[source]
    pub error: HarnessError,
    /// Cases that passed before the failure.
    pub completed: Vec<CaseResult>,
}

/// The deterministic payload: byte `k` is `k mod 256`.
pub fn write_pattern(length: usize) -> Vec<u8> {
    (0..length).map(|k| (k % 256) as u8).collect()
}

/// The read-test preload: byte `k` is `(k + length) mod 256`, so lengths do not alias.
pub fn read_pattern(length: usize) -> Vec<u8> {
    (0..length).map(|k| ((k + length) % 256) as u8).collect()
}

/// Progress through the state sequence.
#[derive(Debug, Default)]
struct Run {
    cases: Vec<CaseResult>,
}

impl Run {
    /// Performs the work of `state`; on error, records the failure against `state`.
    fn enter<T>(
        &self,
        state: TestState,
        work: impl FnOnce() -> HarnessResult<T>,
    ) -> Result<T, TestFailure> {
        info!(%state, "entering state");
        work().map_err(|error| {
            error!(%state, %error, "state failed; test is FAILED");
            TestFailure {
                state,
                error,
                completed: self.cases.clone(),
            }
        })
    }
}

/// Shared sequencing for both directions.
#[derive(Debug, Clone)]
struct Driver {
    access: AccessKind,
    lengths: Vec<usize>,
    offset: u64,
    settle: SettleMode,
    settle_per_byte: u64,
    settle_margin: u64,
    settle_timeout: u64,
}

impl Driver {
    fn new(access: AccessKind, protocol: &ProtocolConfig) -> Self {
        Self {
            access,
            lengths: protocol.write_lengths.clone(),
            offset: protocol.offset,
            settle: protocol.settle,
            settle_per_byte: protocol.settle_per_byte,
            settle_margin: protocol.settle_margin,
            settle_timeout: protocol.settle_timeout,
        }
    }

    fn run(&self, tb: &mut Testbench) -> Result<TestReport, TestFailure> {
        let mut run = Run::default();
        info!(state = %TestState::Init, lengths = ?self.lengths, "starting {} test", self.access);

        run.enter(TestState::Reset, || {
            tb.cycle_reset();
            Ok(())
        })?;
        let functions = run.enter(TestState::Enumerated, || tb.enumerate())?;
        let (device, window) = run.enter(TestState::Enabled, || {
            let device = tb.enable_function(0)?;
            let window = device.bar_window(0)?;
            Ok((device.id, window))
        })?;

        for &length in &self.lengths {
            let state = TestState::Length {
                access: self.access,
                length,
            };
            let case = run.enter(state, || match self.access {
                AccessKind::Write => self.write_case(tb, &window, length),
                AccessKind::Read => self.read_case(tb, &window, length),
            })?;
            info!(
                %state,
                address = %format!("{:#x}", case.address),
                settle = %case.settle,
                "case passed"
            );
            run.cases.push(case);
        }

        info!(state = %TestState::Done, at = %tb.now(), "all cases passed");
        Ok(TestReport {
            access: self.access,
            device,
            functions,
            cases: run.cases,
            state: TestState::Done,
        })
    }

    fn settle(&self, tb: &mut Testbench, mark: usize, start: u64, length: usize) -> HarnessResult<()> {
        match self.settle {
            SettleMode::Acknowledged => {
                let timeout = tb.config.time(self.settle_timeout);
                let range = start..start + length as u64;
                tb.sim.run_until(&mut tb.rc, timeout, "AXI write acknowledgement", |sim, _| {
                    sim.axi_ram.acked_covers(mark, range.clone())
                })
            }
            SettleMode::FixedDelay => {
                tb.wait_for(length as u64 * self.settle_per_byte + self.settle_margin);
                Ok(())
            }
        }
    }

    fn write_case(
        &self,
        tb: &mut Testbench,
        window: &BarWindow,
        length: usize,
    ) -> HarnessResult<CaseResult> {
        let expected = write_pattern(length);
        let address = tb.axi_address(window.translate(self.offset, length)?);
        let mark = tb.sim.axi_ram.ack_mark();

        window.write(&mut tb.rc, &mut tb.sim, self.offset, &expected)?;
        let issued = tb.now();
        self.settle(tb, mark, address, length)?;
        let settle = tb.now() - issued;
        let settled = tb.sim.axi_ram.ack_mark();
        tb.sim.axi_ram.release_acks(settled);

        let actual = tb.sim.axi_ram.read(address, length);
        check(AccessKind::Write, address, expected, actual)?;
        Ok(CaseResult {
            length,
            address,
            completed_at: tb.now(),
            settle,
        })
    }

    fn read_case(
        &self,
        tb: &mut Testbench,
        window: &BarWindow,
        length: usize,
    ) -> HarnessResult<CaseResult> {
        let expected = read_pattern(length);
        let address = tb.axi_address(window.translate(self.offset, length)?);
        tb.sim.axi_ram.write(address, &expected);

        let actual = window.read(&mut tb.rc, &mut tb.sim, self.offset, length)?;
        check(AccessKind::Read, address, expected, actual)?;
        Ok(CaseResult {
            length,
            address,
            completed_at: tb.now(),
            settle: SimTime::ZERO,
        })
    }
}

fn check(access: AccessKind, address: u64, expected: Vec<u8>, actual: Vec<u8>) -> HarnessResult<()> {
    if expected == actual {
        return Ok(());
    }
    Err(HarnessError::DataMismatch(Box::new(Mismatch {
        access,
        length: expected.len(),
        address,
        expected,
        actual,
    })))
}

/// Write sweep: each length is written through BAR 0 and checked in the AXI memory.
#[derive(Debug, Clone)]
pub struct WriteTest {
    driver: Driver,
}

impl WriteTest {
    /// Builds the sweep described by `protocol`.
    pub fn new(protocol: &ProtocolConfig) -> Self {
        Self {
            driver: Driver::new(AccessKind::Write, protocol),
        }
    }

    /// Runs the sweep from reset.
    pub fn run(&self, tb: &mut Testbench) -> Result<TestReport, TestFailure> {
        self.driver.run(tb)
    }
}

/// Read sweep: each length is preloaded into the AXI memory and read back through BAR 0.
#[derive(Debug, Clone)]
pub struct ReadTest {
    driver: Driver,
}

impl ReadTest {
    /// Builds the sweep described by `protocol`.
    pub fn new(protocol: &ProtocolConfig) -> Self {
        Self {
            driver: Driver::new(AccessKind::Read, protocol),
        }
    }

    /// Runs the sweep from reset.
    pub fn run(&self, tb: &mut Testbench) -> Result<TestReport, TestFailure> {
        self.driver.run(tb)
    }
}

/// Runs the write sweep configured in `tb.config`.
pub fn run_write_test(tb: &mut Testbench) -> Result<TestReport, TestFailure> {
    WriteTest::new(&tb.config.protocol).run(tb)
}

/// Runs the read sweep configured in `tb.config`.
pub fn run_read_test(tb: &mut Testbench) -> Result<TestReport, TestFailure> {
    ReadTest::new(&tb.config.protocol).run(tb)
}
