//! Configuration system for the PCIe-to-AXI testbench.
//!
//! This module defines all configuration structures and enums used to parameterize
//! the harness. It provides:
//! 1. **Defaults:** The reference timing and sizes (4 ns clock, 16 MiB BAR0, 64 KiB AXI RAM).
//! 2. **Structures:** Hierarchical config for clock, reset, PCIe link, AXI target, bridge and
//!    test protocol.
//! 3. **Enums:** Settle policy used between a posted write and its verification.
//!
//! Configuration is read from JSON (`Config::from_json` / `Config::from_file`) or built with
//! `Config::default()`. All delays are expressed in `clock.unit`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::constants::{bytes_to_size_code, size_code_to_bytes};
use crate::common::{SimTime, TimeUnit};

/// Default configuration constants for the harness.
///
/// These values reproduce the reference bench: a 250 MHz clock, a single endpoint with a
/// 16 MiB BAR0 and a 64 KiB AXI RAM behind the bridge.
mod defaults {
    /// Clock period in `CLOCK_UNIT`s.
    pub const CLOCK_PERIOD: u64 = 4;

    /// Rising edges held before reset is asserted.
    pub const RESET_IDLE_EDGES: u32 = 2;

    /// Rising edges reset is held high.
    pub const RESET_ACTIVE_EDGES: u32 = 2;

    /// Rising edges waited after reset is released.
    pub const RESET_SETTLE_EDGES: u32 = 2;

    /// BAR0 size of the endpoint (16 MiB).
    pub const BAR0_SIZE: u64 = 16 * 1024 * 1024;

    /// PCI vendor id advertised by the endpoint.
    pub const VENDOR_ID: u16 = 0x1234;

    /// PCI device id advertised by the endpoint.
    pub const DEVICE_ID: u16 = 0x0001;

    /// Class code (memory controller, other).
    pub const CLASS_CODE: u32 = 0x05_80_00;

    /// Largest payload the endpoint advertises in Device Capabilities.
    pub const ENDPOINT_MAX_PAYLOAD: usize = 512;

    /// Largest payload the root complex supports.
    pub const ROOT_MAX_PAYLOAD: usize = 256;

    /// Max read request size programmed into Device Control.
    pub const MAX_READ_REQUEST: usize = 512;

    /// Clock cycles a TLP spends on the link before the endpoint sees it.
    pub const LINK_LATENCY_CYCLES: u64 = 4;

    /// Base of the root complex memory window used for BAR assignment.
    pub const MEM_WINDOW_BASE: u64 = 0x8000_0000;

    /// Size of the root complex memory window (1 GiB).
    pub const MEM_WINDOW_SIZE: u64 = 0x4000_0000;

    /// Completion timeout for non-posted requests, in clock units.
    pub const COMPLETION_TIMEOUT: u64 = 50_000;

    /// AXI RAM size in bytes (64 KiB).
    pub const AXI_RAM_SIZE: usize = 1 << 16;

    /// Request TLPs the bridge buffers before deasserting ready.
    pub const BRIDGE_QUEUE_DEPTH: usize = 4;

    /// Cycles between accepting a request and issuing it on AXI.
    pub const BRIDGE_PIPELINE_LATENCY: u64 = 2;

    /// Low TLP address bits forwarded onto the AXI address bus.
    pub const BRIDGE_AXI_ADDR_WIDTH: u32 = 24;

    /// Window-relative offset the write sweep targets.
    pub const WRITE_OFFSET: u64 = 0x1000;

    /// Per-byte component of the fixed settle delay.
    pub const SETTLE_PER_BYTE: u64 = 4;

    /// Constant component of the fixed settle delay.
    pub const SETTLE_MARGIN: u64 = 200;

    /// Upper bound on an acknowledged settle, in clock units.
    pub const SETTLE_TIMEOUT: u64 = 100_000;

    /// Write lengths exercised by the sweep.
    pub const WRITE_LENGTHS: [usize; 6] = [1, 4, 16, 64, 256, 1024];
}

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for `Config`.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How the driver decides a posted write has reached the AXI memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum SettleMode {
    /// Wait until AXI write responses cover the written range.
    ///
    /// Bounded by `protocol.settle_timeout`; a miss is a `ProtocolTimeout`.
    #[default]
    Acknowledged,
    /// Wait `length * settle_per_byte + settle_margin` clock units and trust the memory.
    ///
    /// Reproduces the reference bench timing. The bound is empirical, not proven.
    #[serde(alias = "Fixed")]
    FixedDelay,
}

/// Root configuration structure containing all harness settings.
///
/// # Examples
///
/// Creating a default configuration:
///
/// ```
/// use pcie_axi_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.pcie.bar0_size, 16 * 1024 * 1024);
/// assert_eq!(config.axi.ram_size, 65536);
/// assert_eq!(config.protocol.write_lengths, vec![1, 4, 16, 64, 256, 1024]);
/// ```
///
/// Deserializing from JSON; omitted fields keep their defaults:
///
/// ```
/// use pcie_axi_core::config::{Config, SettleMode};
///
/// let json = r#"{
///     "clock": { "period": 8, "unit": "ns" },
///     "pcie": { "bar0_size": 1048576 },
///     "protocol": {
///         "write_lengths": [8, 32],
///         "settle": "FixedDelay"
///     }
/// }"#;
///
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.clock.period, 8);
/// assert_eq!(config.pcie.bar0_size, 1 << 20);
/// assert_eq!(config.protocol.settle, SettleMode::FixedDelay);
/// assert_eq!(config.axi.ram_size, 65536);
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Clock generator settings
    #[serde(default)]
    pub clock: ClockConfig,
    /// Reset pulse shape
    #[serde(default)]
    pub reset: ResetConfig,
    /// Root complex, link and endpoint configuration space
    #[serde(default)]
    pub pcie: PcieConfig,
    /// AXI target memory
    #[serde(default)]
    pub axi: AxiConfig,
    /// Reference bridge model
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Test protocol driver
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

impl Config {
    /// Parses and validates a configuration from a JSON string.
    ///
    /// # Arguments
    ///
    /// * `json` - JSON text; every section and field is optional.
    ///
    /// # Returns
    ///
    /// The validated configuration, or the parse/validation error.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock.period < 2 || self.clock.period % 2 != 0 {
            return Err(ConfigError::Invalid(format!(
                "clock.period must be an even number of at least 2, got {}",
                self.clock.period
            )));
        }
        if !self.pcie.bar0_size.is_power_of_two() || self.pcie.bar0_size < 16 {
            return Err(ConfigError::Invalid(format!(
                "pcie.bar0_size must be a power of two >= 16, got {:#x}",
                self.pcie.bar0_size
            )));
        }
        if !self.axi.ram_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "axi.ram_size must be a power of two, got {:#x}",
                self.axi.ram_size
            )));
        }
        for (name, bytes) in [
            ("pcie.endpoint_max_payload", self.pcie.endpoint_max_payload),
            ("pcie.root_max_payload", self.pcie.root_max_payload),
            ("pcie.max_read_request", self.pcie.max_read_request),
        ] {
            if size_code_to_bytes(bytes_to_size_code(bytes)) != bytes {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be one of 128..=4096 bytes in powers of two, got {bytes}"
                )));
            }
        }
        if self.protocol.write_lengths.is_empty() {
            return Err(ConfigError::Invalid(
                "protocol.write_lengths must not be empty".into(),
            ));
        }
        if let Some(len) = self.protocol.write_lengths.iter().find(|&&len| len == 0) {
            return Err(ConfigError::Invalid(format!(
                "protocol.write_lengths contains an empty write ({len})"
            )));
        }
        let longest = self.protocol.write_lengths.iter().copied().max().unwrap_or(0) as u64;
        if self.protocol.offset + longest > self.pcie.bar0_size {
            return Err(ConfigError::Invalid(format!(
                "protocol.offset {:#x} + {longest} overruns BAR0",
                self.protocol.offset
            )));
        }
        if self.protocol.offset + longest > self.axi.ram_size as u64 {
            return Err(ConfigError::Invalid(format!(
                "protocol.offset {:#x} + {longest} overruns the AXI RAM",
                self.protocol.offset
            )));
        }
        if !(12..=64).contains(&self.bridge.axi_addr_width) {
            return Err(ConfigError::Invalid(format!(
                "bridge.axi_addr_width must be in 12..=64, got {}",
                self.bridge.axi_addr_width
            )));
        }
        if self.bridge.queue_depth == 0 {
            return Err(ConfigError::Invalid("bridge.queue_depth must be >= 1".into()));
        }
        Ok(())
    }

    /// Converts an amount of clock units into simulated time.
    pub const fn time(&self, amount: u64) -> SimTime {
        SimTime::new(amount, self.clock.unit)
    }
}

/// Clock generator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClockConfig {
    /// Clock period in `unit`s (even, so both phases are equal)
    #[serde(default = "ClockConfig::default_period")]
    pub period: u64,

    /// Unit of `period` and of every other delay in the configuration
    #[serde(default)]
    pub unit: TimeUnit,
}

impl ClockConfig {
    /// Returns the default clock period.
    fn default_period() -> u64 {
        defaults::CLOCK_PERIOD
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            period: defaults::CLOCK_PERIOD,
            unit: TimeUnit::Ns,
        }
    }
}

/// Reset pulse shape, in rising edges.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResetConfig {
    /// Edges with reset low before the pulse
    #[serde(default = "ResetConfig::default_idle")]
    pub idle_edges: u32,

    /// Edges with reset high
    #[serde(default = "ResetConfig::default_active")]
    pub active_edges: u32,

    /// Edges with reset low after the pulse
    #[serde(default = "ResetConfig::default_settle")]
    pub settle_edges: u32,
}

impl ResetConfig {
    /// Returns the default idle edge count.
    fn default_idle() -> u32 {
        defaults::RESET_IDLE_EDGES
    }

    /// Returns the default active edge count.
    fn default_active() -> u32 {
        defaults::RESET_ACTIVE_EDGES
    }

    /// Returns the default settle edge count.
    fn default_settle() -> u32 {
        defaults::RESET_SETTLE_EDGES
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            idle_edges: defaults::RESET_IDLE_EDGES,
            active_edges: defaults::RESET_ACTIVE_EDGES,
            settle_edges: defaults::RESET_SETTLE_EDGES,
        }
    }
}

/// Root complex, link and endpoint configuration-space settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PcieConfig {
    /// BAR0 size in bytes (power of two)
    #[serde(default = "PcieConfig::default_bar0_size")]
    pub bar0_size: u64,

    /// Vendor id of the endpoint function
    #[serde(default = "PcieConfig::default_vendor_id")]
    pub vendor_id: u16,

    /// Device id of the endpoint function
    #[serde(default = "PcieConfig::default_device_id")]
    pub device_id: u16,

    /// 24-bit class code of the endpoint function
    #[serde(default = "PcieConfig::default_class_code")]
    pub class_code: u32,

    /// Max payload size advertised by the endpoint, in bytes
    #[serde(default = "PcieConfig::default_endpoint_max_payload")]
    pub endpoint_max_payload: usize,

    /// Max payload size supported by the root complex, in bytes
    #[serde(default = "PcieConfig::default_root_max_payload")]
    pub root_max_payload: usize,

    /// Max read request size programmed during enumeration, in bytes
    #[serde(default = "PcieConfig::default_max_read_request")]
    pub max_read_request: usize,

    /// Link traversal latency in clock cycles
    #[serde(default = "PcieConfig::default_link_latency")]
    pub link_latency_cycles: u64,

    /// Base of the memory window BARs are allocated from
    #[serde(default = "PcieConfig::default_mem_window_base")]
    pub mem_window_base: u64,

    /// Size of the memory window BARs are allocated from
    #[serde(default = "PcieConfig::default_mem_window_size")]
    pub mem_window_size: u64,

    /// Completion timeout for non-posted requests, in clock units
    #[serde(default = "PcieConfig::default_completion_timeout")]
    pub completion_timeout: u64,
}

impl PcieConfig {
    /// Returns the default BAR0 size.
    fn default_bar0_size() -> u64 {
        defaults::BAR0_SIZE
    }

    /// Returns the default vendor id.
    fn default_vendor_id() -> u16 {
        defaults::VENDOR_ID
    }

    /// Returns the default device id.
    fn default_device_id() -> u16 {
        defaults::DEVICE_ID
    }

    /// Returns the default class code.
    fn default_class_code() -> u32 {
        defaults::CLASS_CODE
    }

    /// Returns the default endpoint max payload.
    fn default_endpoint_max_payload() -> usize {
        defaults::ENDPOINT_MAX_PAYLOAD
    }

    /// Returns the default root complex max payload.
    fn default_root_max_payload() -> usize {
        defaults::ROOT_MAX_PAYLOAD
    }

    /// Returns the default max read request size.
    fn default_max_read_request() -> usize {
        defaults::MAX_READ_REQUEST
    }

    /// Returns the default link latency.
    fn default_link_latency() -> u64 {
        defaults::LINK_LATENCY_CYCLES
    }

    /// Returns the default memory window base.
    fn default_mem_window_base() -> u64 {
        defaults::MEM_WINDOW_BASE
    }

    /// Returns the default memory window size.
    fn default_mem_window_size() -> u64 {
        defaults::MEM_WINDOW_SIZE
    }

    /// Returns the default completion timeout.
    fn default_completion_timeout() -> u64 {
        defaults::COMPLETION_TIMEOUT
    }
}

impl Default for PcieConfig {
    fn default() -> Self {
        Self {
            bar0_size: defaults::BAR0_SIZE,
            vendor_id: defaults::VENDOR_ID,
            device_id: defaults::DEVICE_ID,
            class_code: defaults::CLASS_CODE,
            endpoint_max_payload: defaults::ENDPOINT_MAX_PAYLOAD,
            root_max_payload: defaults::ROOT_MAX_PAYLOAD,
            max_read_request: defaults::MAX_READ_REQUEST,
            link_latency_cycles: defaults::LINK_LATENCY_CYCLES,
            mem_window_base: defaults::MEM_WINDOW_BASE,
            mem_window_size: defaults::MEM_WINDOW_SIZE,
            completion_timeout: defaults::COMPLETION_TIMEOUT,
        }
    }
}

/// AXI target memory settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AxiConfig {
    /// Memory size in bytes (power of two; addresses wrap)
    #[serde(default = "AxiConfig::default_ram_size")]
    pub ram_size: usize,
}

impl AxiConfig {
    /// Returns the default RAM size.
    fn default_ram_size() -> usize {
        defaults::AXI_RAM_SIZE
    }
}

impl Default for AxiConfig {
    fn default() -> Self {
        Self {
            ram_size: defaults::AXI_RAM_SIZE,
        }
    }
}

/// Reference bridge model settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Request TLPs buffered before `rx_req_tlp_ready` drops
    #[serde(default = "BridgeConfig::default_queue_depth")]
    pub queue_depth: usize,

    /// Cycles between accepting a request and issuing it on AXI
    #[serde(default = "BridgeConfig::default_pipeline_latency")]
    pub pipeline_latency: u64,

    /// Number of low TLP address bits forwarded onto the AXI address bus
    #[serde(default = "BridgeConfig::default_axi_addr_width")]
    pub axi_addr_width: u32,
}

impl BridgeConfig {
    /// Returns the default queue depth.
    fn default_queue_depth() -> usize {
        defaults::BRIDGE_QUEUE_DEPTH
    }

    /// Returns the default pipeline latency.
    fn default_pipeline_latency() -> u64 {
        defaults::BRIDGE_PIPELINE_LATENCY
    }

    /// Returns the default AXI address width.
    fn default_axi_addr_width() -> u32 {
        defaults::BRIDGE_AXI_ADDR_WIDTH
    }

    /// Mask applied to TLP addresses to form AXI addresses.
    pub const fn axi_addr_mask(&self) -> u64 {
        if self.axi_addr_width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.axi_addr_width) - 1
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_depth: defaults::BRIDGE_QUEUE_DEPTH,
            pipeline_latency: defaults::BRIDGE_PIPELINE_LATENCY,
            axi_addr_width: defaults::BRIDGE_AXI_ADDR_WIDTH,
        }
    }
}

/// Test protocol driver settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Lengths of the write sweep, in order
    #[serde(default = "ProtocolConfig::default_write_lengths")]
    pub write_lengths: Vec<usize>,

    /// BAR-relative offset of every write (also the AXI address)
    #[serde(default = "ProtocolConfig::default_offset")]
    pub offset: u64,

    /// Settle policy between write and verification
    #[serde(default)]
    pub settle: SettleMode,

    /// Per-byte component of the fixed settle delay, in clock units
    #[serde(default = "ProtocolConfig::default_settle_per_byte")]
    pub settle_per_byte: u64,

    /// Constant component of the fixed settle delay, in clock units
    #[serde(default = "ProtocolConfig::default_settle_margin")]
    pub settle_margin: u64,

    /// Upper bound on an acknowledged settle, in clock units
    #[serde(default = "ProtocolConfig::default_settle_timeout")]
    pub settle_timeout: u64,
}

impl ProtocolConfig {
    /// Returns the default write sweep.
    fn default_write_lengths() -> Vec<usize> {
        defaults::WRITE_LENGTHS.to_vec()
    }

    /// Returns the default write offset.
    fn default_offset() -> u64 {
        defaults::WRITE_OFFSET
    }

    /// Returns the default per-byte settle delay.
    fn default_settle_per_byte() -> u64 {
        defaults::SETTLE_PER_BYTE
    }

    /// Returns the default settle margin.
    fn default_settle_margin() -> u64 {
        defaults::SETTLE_MARGIN
    }

    /// Returns the default settle timeout.
    fn default_settle_timeout() -> u64 {
        defaults::SETTLE_TIMEOUT
    }

    /// Fixed settle delay for a write of `length` bytes, in clock units.
    pub const fn fixed_settle(&self, length: usize) -> u64 {
        (length as u64) * self.settle_per_byte + self.settle_margin
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            write_lengths: defaults::WRITE_LENGTHS.to_vec(),
            offset: defaults::WRITE_OFFSET,
            settle: SettleMode::default(),
            settle_per_byte: defaults::SETTLE_PER_BYTE,
            settle_margin: defaults::SETTLE_MARGIN,
            settle_timeout: defaults::SETTLE_TIMEOUT,
        }
    }
}
