/// Bench assembly for tests.
pub mod harness;

/// Mock and fault-injecting DUTs.
pub mod mocks;
