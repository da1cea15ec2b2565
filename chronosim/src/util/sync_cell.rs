//! A single-writer, multi-reader cell for values whose underlying atomic
//! representation may be written in more than one non-atomic step (a
//! "tearable" atomic).
//!
//! This is the same role the teacher's `util::sync_cell::SyncCell` plays for
//! `TearableAtomicTime`: it lets the virtual clock publish its current time
//! so that actor threads can read it without taking the scheduler lock, while
//! still guaranteeing readers never observe a half-written value.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::Backoff;

/// A value whose atomic representation may tear across more than one
/// underlying atomic word. Implementors provide plain, individually-atomic
/// `read`/`write` on `&self`; [`SyncCell`] is responsible for detecting torn
/// reads across the call to `write` and retrying.
pub trait TearableAtomic {
    type Value: Copy;

    fn new(value: Self::Value) -> Self;
    fn write(&self, value: Self::Value);
    fn read(&self) -> Self::Value;
}

struct Inner<T> {
    /// Even when no write is in progress, odd while `write` is executing.
    generation: AtomicUsize,
    value: T,
}

/// The write half of a tearable-atomic cell. Not `Clone`: there is exactly
/// one writer, matching the virtual clock's exclusive ownership of
/// `current_time`.
pub struct SyncCell<T: TearableAtomic> {
    inner: Arc<Inner<T>>,
}

impl<T: TearableAtomic> SyncCell<T> {
    pub fn new(init: T::Value) -> Self {
        Self {
            inner: Arc::new(Inner {
                generation: AtomicUsize::new(0),
                value: T::new(init),
            }),
        }
    }

    /// Publishes a new value. Must only be called by the cell's unique owner.
    pub fn write(&mut self, value: T::Value) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.value.write(value);
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Reads the current value, retrying until a non-torn snapshot is seen.
    pub fn read(&self) -> T::Value {
        self.inner.read()
    }

    /// Returns a cheaply cloneable, read-only handle to this cell.
    pub fn reader(&self) -> SyncCellReader<T> {
        SyncCellReader {
            inner: self.inner.clone(),
        }
    }
}

impl<T: TearableAtomic> Inner<T> {
    fn read(&self) -> T::Value {
        let backoff = Backoff::new();
        loop {
            let before = self.generation.load(Ordering::Acquire);
            if before & 1 != 0 {
                // A write is in progress; spin until it completes.
                backoff.spin();
                continue;
            }
            let value = self.value.read();
            let after = self.generation.load(Ordering::Acquire);
            if before == after {
                return value;
            }
            backoff.spin();
        }
    }
}

/// A cloneable read-only handle into a [`SyncCell`].
pub struct SyncCellReader<T: TearableAtomic> {
    inner: Arc<Inner<T>>,
}

impl<T: TearableAtomic> SyncCellReader<T> {
    pub fn read(&self) -> T::Value {
        self.inner.read()
    }
}

impl<T: TearableAtomic> Clone for SyncCellReader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

// Safety: `T::write`/`T::read` are documented to operate on their own
// interior atomics, so concurrent calls across threads are sound; the
// generation counter only orders *visibility*, not exclusion.
unsafe impl<T: TearableAtomic + Send> Send for SyncCell<T> {}
unsafe impl<T: TearableAtomic + Send> Sync for SyncCell<T> {}
unsafe impl<T: TearableAtomic + Send> Send for SyncCellReader<T> {}
unsafe impl<T: TearableAtomic + Send> Sync for SyncCellReader<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct PlainU64(AtomicU64);

    impl TearableAtomic for PlainU64 {
        type Value = u64;

        fn new(value: u64) -> Self {
            Self(AtomicU64::new(value))
        }

        fn write(&self, value: u64) {
            self.0.store(value, Ordering::Relaxed);
        }

        fn read(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn reader_observes_writes() {
        let mut cell: SyncCell<PlainU64> = SyncCell::new(0);
        let reader = cell.reader();
        assert_eq!(reader.read(), 0);
        cell.write(42);
        assert_eq!(reader.read(), 42);
        assert_eq!(cell.read(), 42);
    }

    #[test]
    fn reader_is_cloneable_and_independent_of_writer_lifetime() {
        let mut cell: SyncCell<PlainU64> = SyncCell::new(7);
        let reader = cell.reader();
        let reader2 = reader.clone();
        cell.write(9);
        drop(cell);
        assert_eq!(reader.read(), 9);
        assert_eq!(reader2.read(), 9);
    }
}
