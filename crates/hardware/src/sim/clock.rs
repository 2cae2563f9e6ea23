//! Free-running clock generator.

use super::scheduler::{EventKind, Scheduler};
use crate::common::{SimTime, TimeUnit};

/// A 50% duty-cycle clock that schedules its own edges.
///
/// The clock starts low; the first rising edge falls half a period after `start`.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    period: SimTime,
    high: bool,
    rising_edges: u64,
    running: bool,
}

impl Clock {
    /// Creates a stopped clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the clock with the given period.
    ///
    /// # Arguments
    ///
    /// * `scheduler` - Scheduler that receives the edge events.
    /// * `period` - Full period in `unit`s; an odd picosecond count is rounded down to even.
    /// * `unit` - Unit of `period`.
    pub fn start(&mut self, scheduler: &mut Scheduler, period: u64, unit: TimeUnit) {
        let period = SimTime::new(period, unit);
        self.period = SimTime(period.as_ps() & !1);
        self.high = false;
        self.running = true;
        scheduler.schedule_in(self.half_period(), EventKind::RisingEdge);
    }

    /// Full clock period.
    pub const fn period(&self) -> SimTime {
        self.period
    }

    /// Half of the clock period.
    pub const fn half_period(&self) -> SimTime {
        SimTime(self.period.as_ps() / 2)
    }

    /// Current clock level.
    pub const fn is_high(&self) -> bool {
        self.high
    }

    /// Rising edges generated since `start`.
    pub const fn rising_edges(&self) -> u64 {
        self.rising_edges
    }

    /// Whether `start` has been called.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Flips the level for a due edge event and schedules the opposite edge.
    pub(crate) fn on_edge(&mut self, scheduler: &mut Scheduler, kind: EventKind) {
        let next = match kind {
            EventKind::RisingEdge => {
                self.high = true;
                self.rising_edges += 1;
                EventKind::FallingEdge
            }
            EventKind::FallingEdge => {
                self.high = false;
                EventKind::RisingEdge
            }
            EventKind::Timer(_) => return,
        };
        scheduler.schedule_in(self.half_period(), next);
    }
}
