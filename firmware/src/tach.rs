//! Tachometer & Stall Detector
//!
//! Each fan's tachometer line interrupts on both edges. The edge handler keeps
//! a ring of the last [`PULSE_RING_SIZE`] timestamps; the time between an edge
//! and the edge that landed in the same slot one lap earlier covers
//! `PULSE_RING_SIZE / 2` revolutions, which gives a speed reading averaged
//! over several turns without any division in interrupt context.
//!
//! Timestamps are 32-bit microsecond counters that wrap; all differences use
//! wrapping subtraction. The ring is owned by the edge interrupt and read from
//! thread mode inside a critical section, since `delta` and the timestamp are
//! wider than one atomic access on small cores.

use core::cell::Cell;

use critical_section::Mutex;

use crate::config::{
    EDGES_PER_REVOLUTION, NUM_CHANNELS, PULSE_RING_SIZE, RPM_TIMEOUT_US, STALL_TIMEOUT_US,
};
use crate::hal::timer::elapsed;
use crate::types::Channel;

/// Revolutions covered by one lap of the ring
const REVOLUTIONS_PER_LAP: u32 = PULSE_RING_SIZE as u32 / EDGES_PER_REVOLUTION;

/// Edge timestamp ring for one channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PulseCapture {
    index: u8,
    times: [u32; PULSE_RING_SIZE],
    delta: u32,
}

impl PulseCapture {
    /// Empty ring, no rotation seen
    #[must_use]
    pub const fn new() -> Self {
        Self {
            index: 0,
            times: [0; PULSE_RING_SIZE],
            delta: 0,
        }
    }

    /// Record an edge at `now_us`
    pub fn record_edge(&mut self, now_us: u32) {
        #[allow(clippy::cast_possible_truncation)]
        let next = ((usize::from(self.index) + 1) % PULSE_RING_SIZE) as u8;
        self.index = next;
        let slot = &mut self.times[usize::from(next)];
        self.delta = elapsed(*slot, now_us);
        *slot = now_us;
    }

    /// Stamp the most recent slot with `now_us` so a fan that has just been
    /// switched on is given a full timeout before it counts as stalled
    pub fn prime(&mut self, now_us: u32) {
        self.times[usize::from(self.index)] = now_us;
    }

    /// Time for one lap of the ring, 0 before the first full lap
    #[must_use]
    pub const fn delta(&self) -> u32 {
        self.delta
    }

    /// Timestamp of the most recent edge
    #[must_use]
    pub const fn last_edge(&self) -> u32 {
        self.times[self.index as usize]
    }

    /// The two values readers need
    #[must_use]
    pub const fn sample(&self) -> PulseSample {
        PulseSample {
            delta: self.delta,
            last_edge: self.last_edge(),
        }
    }
}

impl Default for PulseCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Consistent copy of a channel's capture state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PulseSample {
    /// Microseconds per lap of the ring (0 = no reading)
    pub delta: u32,
    /// Timestamp of the most recent edge
    pub last_edge: u32,
}

impl PulseSample {
    /// Fan speed, 0 when no edge arrived within [`RPM_TIMEOUT_US`]
    #[must_use]
    pub fn rpm(&self, now_us: u32) -> u16 {
        if self.delta == 0 || elapsed(self.last_edge, now_us) > RPM_TIMEOUT_US {
            return 0;
        }
        let rpm = 60_000_000 * REVOLUTIONS_PER_LAP / self.delta;
        u16::try_from(rpm).unwrap_or(u16::MAX)
    }

    /// No edge within [`STALL_TIMEOUT_US`], or no full lap yet
    #[must_use]
    pub const fn is_stalled(&self, now_us: u32) -> bool {
        self.delta == 0 || elapsed(self.last_edge, now_us) > STALL_TIMEOUT_US
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PulseSample {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Pulse(delta {}us, last {}us)", self.delta, self.last_edge);
    }
}

/// Pulse capture cells for every channel
///
/// Meant to live in a `static` shared between the edge interrupts and the
/// register engine. Every accessor takes its own critical section, which
/// restores the caller's interrupt state on exit, so it nests inside an
/// already-masked register dispatch.
pub struct Tachometer {
    channels: [Mutex<Cell<PulseCapture>>; NUM_CHANNELS],
}

impl Tachometer {
    /// All channels empty
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channels: [
                Mutex::new(Cell::new(PulseCapture::new())),
                Mutex::new(Cell::new(PulseCapture::new())),
            ],
        }
    }

    /// Edge interrupt entry point
    pub fn on_edge(&self, channel: Channel, now_us: u32) {
        self.update(channel, |capture| capture.record_edge(now_us));
    }

    /// Restart the stall timeout for a channel whose fan was just enabled
    pub fn prime(&self, channel: Channel, now_us: u32) {
        self.update(channel, |capture| capture.prime(now_us));
    }

    /// Copy out `delta` and the last timestamp under one critical section
    #[must_use]
    pub fn sample(&self, channel: Channel) -> PulseSample {
        critical_section::with(|cs| self.channels[channel.index()].borrow(cs).get().sample())
    }

    /// Fan speed in RPM
    #[must_use]
    pub fn rpm(&self, channel: Channel, now_us: u32) -> u16 {
        self.sample(channel).rpm(now_us)
    }

    /// Whether the channel's fan has stopped turning
    #[must_use]
    pub fn is_stalled(&self, channel: Channel, now_us: u32) -> bool {
        self.sample(channel).is_stalled(now_us)
    }

    fn update(&self, channel: Channel, f: impl FnOnce(&mut PulseCapture)) {
        critical_section::with(|cs| {
            let cell = self.channels[channel.index()].borrow(cs);
            let mut capture = cell.get();
            f(&mut capture);
            cell.set(capture);
        });
    }
}

impl Default for Tachometer {
    fn default() -> Self {
        Self::new()
    }
}
