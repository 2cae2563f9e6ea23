//! # AXI Memory Tests
//!
//! What the bridge leaves in the AXI memory after BAR writes: exact bytes, nothing around them.

use pcie_axi_core::config::SettleMode;
use pcie_axi_core::tb::write_pattern;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::common::harness::{TestContext, quick_config};

#[test]
fn test_fixed_delay_write_touches_only_its_range() {
    let mut config = quick_config();
    config.protocol.settle = SettleMode::FixedDelay;
    let mut ctx = TestContext::with_config(config);
    let window = ctx.bring_up();

    let data = write_pattern(64);
    window
        .write(&mut ctx.tb.rc, &mut ctx.tb.sim, 0x1000, &data)
        .unwrap();
    let delay = ctx.tb.config.protocol.fixed_settle(64);
    assert_eq!(delay, 456);
    ctx.tb.wait_for(delay);

    let ram = &ctx.tb.sim.axi_ram;
    assert_eq!(ram.read(0x1000, 64), data);
    let image = ram.read(0, ram.size());
    let stray = image
        .iter()
        .enumerate()
        .filter(|&(i, &b)| !(0x1000..0x1040).contains(&i) && b != 0)
        .count();
    assert_eq!(stray, 0);
}

#[test]
fn test_write_is_acknowledged_over_its_range() {
    let mut ctx = TestContext::new();
    let window = ctx.bring_up();
    let mark = ctx.tb.sim.axi_ram.ack_mark();
    ctx.write_and_drain(&window, 0x1010, &write_pattern(100));

    let at = ctx.axi(&window, 0x1010);
    assert!(ctx.tb.sim.axi_ram.acked_covers(mark, at..at + 100));
    assert!(!ctx.tb.sim.axi_ram.acked_covers(mark, at..at + 101));
    let stats = ctx.tb.sim.axi_ram.stats();
    assert_eq!(stats.bytes_written, 100);
    assert!(stats.write_bursts >= 1);
}

#[test]
fn test_unaligned_tail_bytes_are_strobed() {
    let mut ctx = TestContext::new();
    let window = ctx.bring_up();
    let at = ctx.axi(&window, 0x3000);
    ctx.tb.sim.axi_ram.write(at, &[0x55; 16]);

    ctx.write_and_drain(&window, 0x3005, &[1, 2, 3]);
    assert_eq!(
        ctx.tb.sim.axi_ram.read(at, 10),
        vec![0x55, 0x55, 0x55, 0x55, 0x55, 1, 2, 3, 0x55, 0x55]
    );
}

#[test]
fn test_addresses_wrap_at_memory_size() {
    let mut ctx = TestContext::new();
    let window = ctx.bring_up();
    let size = ctx.tb.sim.axi_ram.size() as u64;

    // Above the RAM size but inside the bridge's 24-bit AXI window.
    ctx.write_and_drain(&window, size + 0x200, &[0xA5; 4]);
    assert_eq!(ctx.tb.sim.axi_ram.read(0x200, 4), vec![0xA5; 4]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_single_byte_write_leaves_neighbours(offset in 1u64..0xFFFE, value in 1u8..=255) {
        let mut ctx = TestContext::new();
        let window = ctx.bring_up();
        ctx.write_and_drain(&window, offset, &[value]);

        let ram = &ctx.tb.sim.axi_ram;
        prop_assert_eq!(ram.read(offset - 1, 3), vec![0, value, 0]);
    }

    #[test]
    fn prop_repeated_write_is_idempotent(len in 1usize..600, offset in 0u64..0x8000) {
        let data: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
        let mut ctx = TestContext::new();
        let window = ctx.bring_up();

        ctx.write_and_drain(&window, offset, &data);
        let once = ctx.tb.sim.axi_ram.read(0, ctx.tb.sim.axi_ram.size());
        ctx.write_and_drain(&window, offset, &data);
        let twice = ctx.tb.sim.axi_ram.read(0, ctx.tb.sim.axi_ram.size());
        prop_assert!(once == twice);
    }
}
