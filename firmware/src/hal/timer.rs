//! Timer Abstractions
//!
//! Monotonic time sources for tachometer timestamps and the status LED.
//! Values are free-running `u32` counters; differences are taken with
//! wrapping subtraction so they stay correct across rollover.

/// Monotonic time source
pub trait Clock {
    /// Microseconds since boot, wrapping at `u32::MAX`
    fn now_micros(&self) -> u32;

    /// Milliseconds since boot, wrapping at `u32::MAX`
    fn now_millis(&self) -> u32;
}

/// Elapsed time between two wrapping timestamps
#[must_use]
pub const fn elapsed(since: u32, now: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Clock backed by the embassy time driver
#[cfg(feature = "embedded")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyClock;

#[cfg(feature = "embedded")]
impl Clock for EmbassyClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_micros(&self) -> u32 {
        embassy_time::Instant::now().as_micros() as u32
    }

    #[allow(clippy::cast_possible_truncation)]
    fn now_millis(&self) -> u32 {
        embassy_time::Instant::now().as_millis() as u32
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for EmbassyClock {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "EmbassyClock({}us)", self.now_micros());
    }
}
