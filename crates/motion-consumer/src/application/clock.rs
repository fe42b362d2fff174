//! Monotonic timestamps in the producer's time base.

use motion_core::Nanos;
use nix::time::{clock_gettime, ClockId};

/// Source of "now" for `Finished` consume times.
pub type Clock = fn() -> Nanos;

/// Reads `CLOCK_MONOTONIC`, the clock event times are stamped with.
///
/// Returns 0 if the clock cannot be read, which the producer treats as
/// "consume time unknown".
pub fn monotonic_now() -> Nanos {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() * 1_000_000_000 + ts.tv_nsec(),
        Err(_) => 0,
    }
}
