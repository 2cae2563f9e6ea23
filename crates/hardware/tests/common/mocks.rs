use mockall::mock;
use pcie_axi_core::common::SimTime;
use pcie_axi_core::config::BridgeConfig;
use pcie_axi_core::dut::{Dut, DutPorts, ReferenceBridge};
use pcie_axi_core::sim::Clocked;

mock! {
    pub SilentDut {}
    impl Clocked for SilentDut {
        fn name(&self) -> &'static str;
        fn on_rising_edge(&mut self, ports: &mut DutPorts, now: SimTime);
    }
    impl Dut for SilentDut {
        fn is_idle(&self) -> bool;
    }
}

/// A DUT that accepts every request beat and never drives AXI or completions.
pub fn silent_dut() -> MockSilentDut {
    let mut dut = MockSilentDut::new();
    let _ = dut.expect_name().return_const("silent");
    let _ = dut.expect_is_idle().return_const(true);
    let _ = dut
        .expect_on_rising_edge()
        .returning(|ports, _| ports.rx_req_tlp.ready.set(true));
    dut
}

/// Reference bridge whose AXI write data is overwritten with `0xEE`.
#[derive(Debug)]
pub struct CorruptingBridge {
    inner: ReferenceBridge,
}

impl CorruptingBridge {
    pub fn new() -> Self {
        Self {
            inner: ReferenceBridge::new(&BridgeConfig::default()),
        }
    }
}

impl Clocked for CorruptingBridge {
    fn name(&self) -> &str {
        "corrupting-bridge"
    }

    fn on_rising_edge(&mut self, ports: &mut DutPorts, now: SimTime) {
        self.inner.on_rising_edge(ports, now);
        let w = &mut ports.m_axi.w;
        if w.valid.pending() {
            let mut beat = w.payload.pending();
            beat.data = [0xEE; 32];
            w.payload.set(beat);
        }
    }
}

impl Dut for CorruptingBridge {
    fn is_idle(&self) -> bool {
        self.inner.is_idle()
    }
}
