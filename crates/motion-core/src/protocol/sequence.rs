//! Producer-side sequence numbering for input channel records.
//!
//! Every event record carries a `u32` sequence number that is unique on its
//! channel.  The consumer echoes it back in the matching `Finished` record, so
//! zero is reserved as "no sequence" and never handed out.  Numbers are reused
//! only after the channel is reset.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU32` internally, so a producer may share one counter
//! between a sampling thread and a control thread without a lock.

use std::sync::atomic::{AtomicU32, Ordering};

/// A thread-safe, monotonically increasing counter for record sequence numbers.
///
/// The first call to [`next`](Self::next) returns 1.  After `u32::MAX` the
/// counter wraps to 1, skipping the reserved zero.
///
/// # Examples
///
/// ```rust
/// use motion_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
pub struct SequenceCounter {
    /// Last value handed out; zero before the first call.
    inner: AtomicU32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Returns the next sequence number.
    ///
    /// `Ordering::Relaxed` is enough: the value orders records, it does not
    /// publish other memory.
    pub fn next(&self) -> u32 {
        loop {
            let previous = self.inner.fetch_add(1, Ordering::Relaxed);
            let value = previous.wrapping_add(1);
            if value != 0 {
                return value;
            }
        }
    }

    /// Returns the last value handed out without advancing.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }

    /// Starts numbering again from 1, as a producer does after the channel
    /// is re-created.
    pub fn reset(&self) {
        self.inner.store(0, Ordering::Relaxed);
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
