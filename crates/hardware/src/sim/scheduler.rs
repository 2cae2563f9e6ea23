//! Discrete-event scheduler.
//!
//! The scheduler owns the only time cursor in the harness and a min-heap of pending
//! wake-ups. Events scheduled for the same instant fire in insertion order, so a timer set
//! for the exact time of a clock edge fires after that edge if the edge was scheduled first.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::common::SimTime;

/// Handle of a one-shot timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

/// What happens when a scheduled entry comes due.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// The clock rises; every clocked component runs.
    RisingEdge,
    /// The clock falls; nothing samples on this edge.
    FallingEdge,
    /// A timer expires.
    Timer(TimerId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    at: SimTime,
    seq: u64,
    kind: EventKind,
}

/// Priority queue of wake-ups ordered by (time, insertion sequence).
#[derive(Debug, Default)]
pub struct Scheduler {
    now: SimTime,
    seq: u64,
    next_timer: u64,
    queue: BinaryHeap<Reverse<Scheduled>>,
}

impl Scheduler {
    /// Creates an empty scheduler at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    #[inline(always)]
    pub const fn now(&self) -> SimTime {
        self.now
    }

    /// Number of pending wake-ups.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Time of the next wake-up, if any.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|Reverse(s)| s.at)
    }

    /// Schedules `kind` at absolute time `at`; times in the past fire at `now`.
    pub fn schedule_at(&mut self, at: SimTime, kind: EventKind) {
        let at = at.max(self.now);
        self.seq += 1;
        self.queue.push(Reverse(Scheduled {
            at,
            seq: self.seq,
            kind,
        }));
    }

    /// Schedules `kind` after `delay`.
    pub fn schedule_in(&mut self, delay: SimTime, kind: EventKind) {
        self.schedule_at(self.now + delay, kind);
    }

    /// Arms a one-shot timer that fires after `delay`.
    pub fn start_timer(&mut self, delay: SimTime) -> TimerId {
        self.next_timer += 1;
        let id = TimerId(self.next_timer);
        self.schedule_in(delay, EventKind::Timer(id));
        id
    }

    /// Removes the earliest wake-up and moves the time cursor to it.
    pub fn pop(&mut self) -> Option<(SimTime, EventKind)> {
        let Reverse(next) = self.queue.pop()?;
        self.now = next.at;
        Some((next.at, next.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_then_insertion_order() {
        let mut s = Scheduler::new();
        s.schedule_at(SimTime(10), EventKind::FallingEdge);
        s.schedule_at(SimTime(5), EventKind::RisingEdge);
        let t = s.start_timer(SimTime(5));

        assert_eq!(s.pop(), Some((SimTime(5), EventKind::RisingEdge)));
        assert_eq!(s.pop(), Some((SimTime(5), EventKind::Timer(t))));
        assert_eq!(s.now(), SimTime(5));
        assert_eq!(s.pop(), Some((SimTime(10), EventKind::FallingEdge)));
        assert_eq!(s.pop(), None);
    }

    #[test]
    fn past_events_fire_now() {
        let mut s = Scheduler::new();
        s.schedule_at(SimTime(20), EventKind::RisingEdge);
        let _ = s.pop();
        s.schedule_at(SimTime(3), EventKind::FallingEdge);
        assert_eq!(s.peek_time(), Some(SimTime(20)));
    }
}
