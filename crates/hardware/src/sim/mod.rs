//! Discrete-event simulation kernel.
//!
//! This module provides the time base every other component runs on:
//! 1. **Scheduler:** A min-heap of timed wake-ups and the single simulated-time cursor.
//! 2. **Clock:** A free-running clock that schedules its own edges.
//! 3. **Signals:** Two-phase wires and valid/ready channels.
//! 4. **Simulator:** The kernel loop that runs clocked components on each rising edge.

/// Free-running clock generator.
pub mod clock;

/// Timed event queue.
pub mod scheduler;

/// Two-phase signals and handshake channels.
pub mod signal;

/// Kernel loop and blocking waits.
pub mod simulator;

/// The clocked component trait.
pub mod traits;

pub use clock::Clock;
pub use scheduler::{EventKind, Scheduler, TimerId};
pub use signal::{Channel, Signal};
pub use simulator::Simulator;
pub use traits::{Clocked, Idle};
