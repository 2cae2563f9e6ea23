//! PCIe-to-AXI bridge testbench CLI.
//!
//! This binary runs the test protocol against the reference bridge model. It provides:
//! 1. **Run:** Reset, enumerate, enable and sweep write (and optionally read) lengths; the exit
//!    status is 0 when every case reaches DONE and 1 when the protocol ends in FAILED.
//! 2. **Dump config:** Print the effective configuration as JSON, for use as a starting point.

use std::process;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pcie_axi_core::config::{Config, SettleMode};
use pcie_axi_core::tb::{self, TestReport};
use pcie_axi_core::Testbench;

#[derive(Parser, Debug)]
#[command(
    name = "pcie-axi-tb",
    author,
    version,
    about = "PCIe-to-AXI bridge testbench",
    long_about = "Drive a PCIe-to-AXI bridge model through reset, enumeration and a length sweep, and check every write in the AXI memory.\n\nExamples:\n  pcie-axi-tb run\n  pcie-axi-tb run --config bench.json --lengths 1,4,4096 --settle fixed-delay\n  pcie-axi-tb dump-config > bench.json\n\nSet RUST_LOG=debug to see every TLP and AXI burst."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Settle {
    /// Wait for AXI write responses covering the written range.
    Acknowledged,
    /// Wait length * per_byte + margin time units.
    FixedDelay,
}

impl From<Settle> for SettleMode {
    fn from(s: Settle) -> Self {
        match s {
            Settle::Acknowledged => Self::Acknowledged,
            Settle::FixedDelay => Self::FixedDelay,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the test protocol.
    Run {
        /// JSON configuration file; defaults are used when omitted.
        #[arg(short, long)]
        config: Option<String>,

        /// Comma-separated transfer lengths overriding `protocol.write_lengths`.
        #[arg(short, long, value_delimiter = ',')]
        lengths: Vec<usize>,

        /// BAR-relative offset overriding `protocol.offset` (accepts 0x prefix).
        #[arg(long, value_parser = parse_u64)]
        offset: Option<u64>,

        /// Settle policy between a write and its check.
        #[arg(long, value_enum)]
        settle: Option<Settle>,

        /// Also run the read sweep after the write sweep.
        #[arg(long)]
        read: bool,

        /// Print component counters after the run.
        #[arg(long)]
        stats: bool,
    },

    /// Print the effective configuration as JSON.
    DumpConfig {
        /// JSON configuration file to merge over the defaults.
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run {
            config,
            lengths,
            offset,
            settle,
            read,
            stats,
        } => {
            let mut config = load_config(config.as_deref());
            if !lengths.is_empty() {
                config.protocol.write_lengths = lengths;
            }
            if let Some(offset) = offset {
                config.protocol.offset = offset;
            }
            if let Some(settle) = settle {
                config.protocol.settle = settle.into();
            }
            if let Err(e) = config.validate() {
                eprintln!("Error: {e}");
                process::exit(2);
            }
            cmd_run(config, read, stats)
        }
        Commands::DumpConfig { config } => {
            let config = load_config(config.as_deref());
            match serde_json::to_string_pretty(&config) {
                Ok(text) => {
                    println!("{text}");
                    0
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    2
                }
            }
        }
    };
    process::exit(code);
}

fn load_config(path: Option<&str>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    match Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    }
}

fn print_report(report: &TestReport) {
    println!(
        "{} sweep on {}: {} case(s), {}",
        report.access,
        report.device,
        report.cases.len(),
        report.state
    );
    for case in &report.cases {
        println!(
            "  len {:>5}  at {:#07x}  settled in {:<10}  done at {}",
            case.length, case.address, case.settle.to_string(), case.completed_at
        );
    }
}

/// Builds the bench and runs the requested sweeps.
///
/// Returns the process exit code: 0 for DONE, 1 for FAILED.
fn cmd_run(config: Config, read: bool, stats: bool) -> i32 {
    let started = Instant::now();
    let mut bench = match Testbench::new(config) {
        Ok(bench) => bench,
        Err(e) => {
            error!(%e, "failed to assemble the testbench");
            return 1;
        }
    };

    let mut code = 0;
    match tb::run_write_test(&mut bench) {
        Ok(report) => print_report(&report),
        Err(failure) => {
            error!(%failure, "write test FAILED");
            code = 1;
        }
    }
    if read && code == 0 {
        match tb::run_read_test(&mut bench) {
            Ok(report) => print_report(&report),
            Err(failure) => {
                error!(%failure, "read test FAILED");
                code = 1;
            }
        }
    }

    info!(sim_time = %bench.now(), "testbench finished");
    if stats {
        bench.stats().with_start(started).print();
    }
    code
}
