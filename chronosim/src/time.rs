//! Virtual (logical) time.
//!
//! Simulation time is a monotonically non-decreasing count of abstract ticks,
//! not wall-clock time. [`VirtualTime`] plays the role that
//! [`MonotonicTime`](https://docs.rs/tai-time) plays in a wall-clock
//! discrete-event kernel, but counts ticks from an arbitrary epoch rather than
//! nanoseconds since a calendar date.

use std::fmt;
use std::ops::{Add, AddAssign};

use crate::util::sync_cell::TearableAtomic;
use std::sync::atomic::{AtomicU32, Ordering};

/// A non-negative delay, expressed in ticks.
///
/// `delay == 0` is legal: it schedules an event for the current time, to be
/// processed within the `advance` that is currently in progress (if any).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TickDuration(u64);

impl TickDuration {
    pub const ZERO: Self = Self(0);

    pub fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    pub fn as_ticks(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TickDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

/// A point on the simulation's logical timeline.
///
/// Time never decreases over the lifetime of a clock. Arithmetic saturates at
/// [`VirtualTime::MAX`] rather than panicking or wrapping, matching the
/// saturating-arithmetic convention of the teacher's own monotonic time type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The origin of the timeline.
    pub const EPOCH: Self = Self(0);
    /// The largest representable instant.
    pub const MAX: Self = Self(u64::MAX);

    pub fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    pub fn as_ticks(self) -> u64 {
        self.0
    }

    /// Ticks elapsed since `earlier`, saturating at zero if `earlier` is
    /// actually later (should not happen given the monotonicity invariant,
    /// but this keeps the method total rather than panicking).
    pub fn since(self, earlier: VirtualTime) -> TickDuration {
        TickDuration(self.0.saturating_sub(earlier.0))
    }
}

impl Add<TickDuration> for VirtualTime {
    type Output = VirtualTime;

    fn add(self, rhs: TickDuration) -> VirtualTime {
        VirtualTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign<TickDuration> for VirtualTime {
    fn add_assign(&mut self, rhs: TickDuration) {
        *self = *self + rhs;
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}

/// A seqlock-friendly, word-torn atomic mirror of a [`VirtualTime`].
///
/// Individually atomic 32-bit halves are written without a lock; consistency
/// across the two halves is restored by wrapping this type in a
/// [`SyncCell`](crate::util::sync_cell::SyncCell), whose generation counter
/// lets readers detect and retry a torn read. This mirrors the teacher's
/// `TearableAtomicTime` field on `Simulation`/`SimInit`, generalized from
/// wall-clock nanoseconds to an abstract tick count.
#[derive(Debug)]
pub struct TearableVirtualTime {
    hi: AtomicU32,
    lo: AtomicU32,
}

impl TearableAtomic for TearableVirtualTime {
    type Value = VirtualTime;

    fn new(value: VirtualTime) -> Self {
        let cell = Self {
            hi: AtomicU32::new(0),
            lo: AtomicU32::new(0),
        };
        cell.write(value);
        cell
    }

    fn write(&self, value: VirtualTime) {
        let bits = value.as_ticks();
        // Order doesn't matter for torn-read detection: the enclosing
        // `SyncCell` generation counter is what readers rely on.
        self.lo.store(bits as u32, Ordering::Relaxed);
        self.hi.store((bits >> 32) as u32, Ordering::Relaxed);
    }

    fn read(&self) -> VirtualTime {
        let hi = self.hi.load(Ordering::Relaxed) as u64;
        let lo = self.lo.load(Ordering::Relaxed) as u64;
        VirtualTime::from_ticks((hi << 32) | lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates_instead_of_overflowing() {
        let t = VirtualTime::MAX;
        assert_eq!(t + TickDuration::from_ticks(10), VirtualTime::MAX);
    }

    #[test]
    fn since_is_saturating() {
        let early = VirtualTime::from_ticks(5);
        let late = VirtualTime::from_ticks(10);
        assert_eq!(late.since(early), TickDuration::from_ticks(5));
        assert_eq!(early.since(late), TickDuration::ZERO);
    }

    #[test]
    fn tearable_roundtrip() {
        let cell = TearableVirtualTime::new(VirtualTime::from_ticks(0xFFFF_FFFF_0001));
        assert_eq!(cell.read(), VirtualTime::from_ticks(0xFFFF_FFFF_0001));
        cell.write(VirtualTime::from_ticks(42));
        assert_eq!(cell.read(), VirtualTime::from_ticks(42));
    }
}
