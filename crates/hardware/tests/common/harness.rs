use pcie_axi_core::Testbench;
use pcie_axi_core::config::Config;
use pcie_axi_core::dut::Dut;
use pcie_axi_core::pcie::BarWindow;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Default configuration with short timeouts so failure paths finish quickly.
pub fn quick_config() -> Config {
    let mut config = Config::default();
    config.pcie.completion_timeout = 2_000;
    config.protocol.settle_timeout = 2_000;
    config
}

pub struct TestContext {
    pub tb: Testbench,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(quick_config())
    }

    pub fn with_config(config: Config) -> Self {
        init_tracing();
        Self {
            tb: Testbench::new(config).unwrap(),
        }
    }

    pub fn with_dut(dut: Box<dyn Dut>) -> Self {
        init_tracing();
        Self {
            tb: Testbench::with_dut(quick_config(), dut).unwrap(),
        }
    }

    /// Resets, enumerates and enables function 0; returns its BAR0 window.
    pub fn bring_up(&mut self) -> BarWindow {
        self.tb.cycle_reset();
        assert_eq!(self.tb.enumerate().unwrap(), 1);
        let device = self.tb.enable_function(0).unwrap();
        device.bar_window(0).unwrap()
    }

    /// Writes through `window` and waits until the bench drains.
    pub fn write_and_drain(&mut self, window: &BarWindow, offset: u64, data: &[u8]) {
        window
            .write(&mut self.tb.rc, &mut self.tb.sim, offset, data)
            .unwrap();
        self.tb.drain(10_000).unwrap();
    }

    /// AXI address a window offset lands at.
    pub fn axi(&self, window: &BarWindow, offset: u64) -> u64 {
        self.tb.axi_address(window.base + offset)
    }
}
