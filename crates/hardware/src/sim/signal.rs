//! Two-phase signals and valid/ready channels.
//!
//! Every wire between the harness and the DUT is a `Signal`: components read the value
//! committed at the previous rising edge and write the value for the next one. The kernel
//! commits all signals after every component has run, which gives the same ordering
//! independence as non-blocking assignments in RTL.
//!
//! A `Channel` bundles `valid`, `ready` and a payload. A transfer happens on an edge where
//! both `valid` and `ready` were sampled high.

use std::collections::VecDeque;

/// A single wire (or bus) with a committed and a pending value.
#[derive(Debug, Clone, Default)]
pub struct Signal<T> {
    cur: T,
    next: T,
}

impl<T: Copy + PartialEq> Signal<T> {
    /// Creates a signal whose committed and pending values are both `value`.
    pub const fn new(value: T) -> Self {
        Self {
            cur: value,
            next: value,
        }
    }

    /// Returns the value committed at the last edge.
    #[inline(always)]
    pub fn get(&self) -> T {
        self.cur
    }

    /// Returns the value that will be committed at the next edge.
    #[inline(always)]
    pub fn pending(&self) -> T {
        self.next
    }

    /// Schedules `value` to become visible after the next commit.
    #[inline(always)]
    pub fn set(&mut self, value: T) {
        self.next = value;
    }

    /// Forces `value` immediately, bypassing the commit.
    pub fn set_immediate(&mut self, value: T) {
        self.cur = value;
        self.next = value;
    }

    /// Publishes the pending value; returns `true` if the committed value changed.
    pub fn commit(&mut self) -> bool {
        let changed = self.cur != self.next;
        self.cur = self.next;
        changed
    }
}

/// A valid/ready handshake channel carrying `T`.
#[derive(Debug, Clone, Default)]
pub struct Channel<T> {
    /// Source asserts when `payload` holds a transfer.
    pub valid: Signal<bool>,
    /// Sink asserts when it can accept a transfer.
    pub ready: Signal<bool>,
    /// Transfer contents; meaningful only while `valid` is high.
    pub payload: Signal<T>,
}

impl<T: Copy + PartialEq + Default> Channel<T> {
    /// Returns `true` if a transfer happens on the current edge.
    #[inline]
    pub fn fired(&self) -> bool {
        self.valid.get() && self.ready.get()
    }

    /// Commits all three signals.
    pub fn commit(&mut self) {
        let _ = self.valid.commit();
        let _ = self.ready.commit();
        let _ = self.payload.commit();
    }

    /// Drives the channel from a source queue.
    ///
    /// Pops the head of `queue` if it was transferred on this edge, then presents the new head
    /// (or deasserts `valid`). The head stays in the queue until the sink takes it.
    ///
    /// # Returns
    ///
    /// The item transferred on this edge, if any.
    pub fn drive_from(&mut self, queue: &mut VecDeque<T>) -> Option<T> {
        let sent = if self.fired() { queue.pop_front() } else { None };
        match queue.front() {
            Some(item) => {
                self.payload.set(*item);
                self.valid.set(true);
            }
            None => self.valid.set(false),
        }
        sent
    }

    /// Samples a sink transfer and sets `ready` for the next edge.
    ///
    /// # Returns
    ///
    /// The payload transferred on this edge, if any.
    pub fn accept(&mut self, ready_next: bool) -> Option<T> {
        let got = self.fired().then(|| self.payload.get());
        self.ready.set(ready_next);
        got
    }

    /// Deasserts both handshake signals immediately (used on reset).
    pub fn idle(&mut self) {
        self.valid.set(false);
        self.ready.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_invisible_until_commit() {
        let mut s = Signal::new(0u8);
        s.set(5);
        assert_eq!(s.get(), 0);
        assert_eq!(s.pending(), 5);
        assert!(s.commit());
        assert_eq!(s.get(), 5);
        assert!(!s.commit());
    }

    #[test]
    fn queue_head_held_until_handshake() {
        let mut ch: Channel<u32> = Channel::default();
        let mut q: VecDeque<u32> = [1, 2].into_iter().collect();

        assert_eq!(ch.drive_from(&mut q), None);
        ch.commit();
        assert!(ch.valid.get());
        assert_eq!(ch.payload.get(), 1);

        // Sink not ready: head is held.
        assert_eq!(ch.drive_from(&mut q), None);
        ch.commit();
        assert_eq!(ch.payload.get(), 1);

        ch.ready.set_immediate(true);
        assert_eq!(ch.drive_from(&mut q), Some(1));
        ch.commit();
        assert_eq!(ch.payload.get(), 2);
        assert_eq!(ch.drive_from(&mut q), Some(2));
        ch.commit();
        assert!(!ch.valid.get());
        assert!(q.is_empty());
    }
}
