//! Harness error definitions.
//!
//! This module defines every failure the harness can report. It provides:
//! 1. **Protocol failures:** Enumeration, lookup, enablement and completion timeouts.
//! 2. **Data failures:** Byte-exact mismatches between a written payload and the AXI memory.
//! 3. **Configuration failures:** BAR layout mistakes made by the integration layer.
//!
//! Nothing is retried: the DUT is assumed deterministic, so every error is a hard failure.

use std::fmt;
use std::ops::Range;

use thiserror::Error;

use super::addr::PcieId;
use super::time::SimTime;
use crate::config::ConfigError;
use crate::pcie::tlp::CplStatus;

/// Result alias used throughout the harness.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Failures raised by the root complex, the device adapter and the test driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// Enumeration walked every root port and found no function.
    #[error("enumeration found no PCIe function behind {ports} root port(s)")]
    EnumerationFailure {
        /// Number of root ports that were scanned.
        ports: usize,
    },

    /// No enumerated function carries this identity.
    #[error("no enumerated PCIe function with identity {0}")]
    DeviceNotFound(PcieId),

    /// A memory transaction was attempted before `enable_device`.
    #[error("PCIe function {0} is not enabled for memory transactions")]
    DeviceNotEnabled(PcieId),

    /// Read-back bytes differ from the payload that was written.
    #[error("{0}")]
    DataMismatch(Box<Mismatch>),

    /// A completion or acknowledgement did not arrive in time.
    #[error("timed out after {waited} waiting for {what}")]
    ProtocolTimeout {
        /// What the caller was waiting for.
        what: String,
        /// How long it waited.
        waited: SimTime,
    },

    /// A non-posted request completed with a failure status.
    #[error("request with tag {tag} completed with status {status}")]
    CompletionFailed {
        /// Tag of the failed request.
        tag: u16,
        /// Completion status returned by the completer.
        status: CplStatus,
    },

    /// A BAR index outside 0..6 was used.
    #[error("BAR index {0} is out of range")]
    InvalidBarIndex(usize),

    /// A BAR size is not a power of two or is below the architectural minimum.
    #[error("BAR{index} size {size:#x} is not a valid power-of-two BAR size")]
    InvalidBarSize {
        /// BAR index.
        index: usize,
        /// Rejected size.
        size: u64,
    },

    /// A BAR was reconfigured after enumeration captured its layout.
    #[error("BAR{index} of {id} is locked: enumeration already captured its layout")]
    BarLocked {
        /// Function identity.
        id: PcieId,
        /// BAR index.
        index: usize,
    },

    /// The function does not implement the requested BAR.
    #[error("{id} does not implement BAR{index}")]
    BarNotPresent {
        /// Function identity.
        id: PcieId,
        /// BAR index.
        index: usize,
    },

    /// An access does not fit inside the BAR window.
    #[error("access of {len} bytes at offset {offset:#x} overruns BAR{index} of size {size:#x}")]
    BarOutOfRange {
        /// BAR index.
        index: usize,
        /// Window-relative offset of the access.
        offset: u64,
        /// Access length in bytes.
        len: u64,
        /// Window size.
        size: u64,
    },

    /// The BAR decodes an address space the harness cannot issue transactions to.
    #[error("BAR{index} of {id} is an I/O BAR; only memory BARs can be accessed")]
    UnsupportedBarKind {
        /// Function identity.
        id: PcieId,
        /// BAR index.
        index: usize,
    },

    /// The root complex memory window cannot hold another BAR.
    #[error("root complex memory window exhausted allocating {size:#x} bytes")]
    AddressSpaceExhausted {
        /// Size of the allocation that failed.
        size: u64,
    },

    /// A root port index does not exist.
    #[error("root port {0} does not exist")]
    PortNotFound(usize),

    /// The bench was built from a configuration that fails `Config::validate`.
    #[error("{0}")]
    InvalidConfig(String),
}

impl From<ConfigError> for HarnessError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl HarnessError {
    /// Builds a `ProtocolTimeout` error.
    pub fn timeout(what: impl Into<String>, waited: SimTime) -> Self {
        Self::ProtocolTimeout {
            what: what.into(),
            waited,
        }
    }
}

/// Details of a read-back mismatch.
///
/// Only the first diverging run is reported in the message; the full buffers are kept for
/// callers that want to diff them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Direction of the transfer under test.
    pub access: AccessKind,
    /// Length of the transfer under test.
    pub length: usize,
    /// Address the transfer targeted in AXI space.
    pub address: u64,
    /// Reference bytes.
    pub expected: Vec<u8>,
    /// Bytes observed on the other side of the bridge.
    pub actual: Vec<u8>,
}

/// Direction of a checked transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Memory write through a BAR window, checked against the AXI memory.
    Write,
    /// Memory read through a BAR window, checked against a preloaded pattern.
    Read,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Write => "write",
            Self::Read => "read",
        })
    }
}

impl Mismatch {
    /// Returns the first contiguous range of differing byte offsets, if any.
    pub fn diverging_range(&self) -> Option<Range<usize>> {
        let common = self.expected.len().min(self.actual.len());
        let start = (0..common)
            .find(|&i| self.expected[i] != self.actual[i])
            .or((self.expected.len() != self.actual.len()).then_some(common))?;
        let end = (start..common)
            .find(|&i| self.expected[i] == self.actual[i])
            .unwrap_or_else(|| self.expected.len().max(self.actual.len()));
        Some(start..end)
    }
}

/// Clamps `range` to `buf` so short reads can still be printed.
fn window<'a>(buf: &'a [u8], range: &Range<usize>) -> &'a [u8] {
    &buf[range.start.min(buf.len())..range.end.min(buf.len())]
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} bytes at {:#x} failed",
            self.access, self.length, self.address
        )?;
        if let Some(range) = self.diverging_range() {
            write!(
                f,
                ": bytes [{:#x}, {:#x}) diverge, expected {:02x?}, got {:02x?}",
                self.address + range.start as u64,
                self.address + range.end as u64,
                window(&self.expected, &range),
                window(&self.actual, &range)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mismatch(expected: Vec<u8>, actual: Vec<u8>) -> Mismatch {
        Mismatch {
            access: AccessKind::Write,
            length: expected.len(),
            address: 0x1000,
            expected,
            actual,
        }
    }

    #[test]
    fn finds_first_diverging_run() {
        let m = mismatch(vec![0, 1, 2, 3, 4], vec![0, 9, 9, 3, 9]);
        assert_eq!(m.diverging_range(), Some(1..3));
        let text = m.to_string();
        assert!(text.contains("[0x1001, 0x1003)"), "{text}");
        assert!(text.contains("expected [01, 02], got [09, 09]"), "{text}");
    }

    #[test]
    fn identical_buffers_have_no_range() {
        assert_eq!(mismatch(vec![1, 2], vec![1, 2]).diverging_range(), None);
    }

    #[test]
    fn short_read_diverges_at_the_tail() {
        let m = mismatch(vec![1, 2, 3], vec![1]);
        assert_eq!(m.diverging_range(), Some(1..3));
    }
}
