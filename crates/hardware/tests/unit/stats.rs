//! # Statistics Tests

use pcie_axi_core::tb::run_write_test;
use pretty_assertions::assert_eq;

use crate::common::harness::TestContext;

#[test]
fn test_counters_after_default_sweep() {
    let mut ctx = TestContext::new();
    let _ = run_write_test(&mut ctx.tb).unwrap();
    let stats = ctx.tb.stats();

    let total: u64 = [1, 4, 16, 64, 256, 1024].iter().sum();
    assert_eq!(stats.rc.bytes_written, total);
    assert_eq!(stats.axi.bytes_written, total);
    assert_eq!(stats.rc.memory_reads, 0);
    assert_eq!(stats.rc.unexpected_completions, 0);
    assert_eq!(stats.rc.failed_completions, 0);
    assert!(stats.rc.config_requests > 0);
    assert_eq!(stats.adapter.config_requests, stats.rc.config_requests);
    assert_eq!(stats.adapter.requests_forwarded, stats.rc.memory_writes);
    assert_eq!(stats.cycles, ctx.tb.sim.cycles());
    assert_eq!(stats.sim_time, ctx.tb.now());
}

#[test]
fn test_fresh_bench_has_no_traffic() {
    let ctx = TestContext::new();
    let stats = ctx.tb.stats();
    assert_eq!(stats.cycles, 0);
    assert_eq!(stats.rc.memory_writes, 0);
    assert_eq!(stats.axi.write_bursts, 0);
}
