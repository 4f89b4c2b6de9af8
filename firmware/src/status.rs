//! Status LED policy
//!
//! Decides what the status LED shows from the configured [`LedMode`] and the
//! stall detector. In auto mode the LED stays dark while the fans turn and
//! starts blinking once a stall has lasted longer than [`STALL_GRACE_MS`],
//! which leaves a freshly started fan time to spin up.

use crate::config::{BLINK_OFF_MS, BLINK_ON_MS, STALL_GRACE_MS};
use crate::hal::gpio::LedState;
use crate::hal::timer::elapsed;
use crate::types::LedMode;

/// LED state machine, driven by a millisecond clock
#[derive(Debug, Default)]
pub struct StatusLed {
    stall_since: Option<u32>,
    blink: LedState,
    toggled_at: Option<u32>,
}

impl StatusLed {
    /// LED off, no stall seen
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stall_since: None,
            blink: LedState::Off,
            toggled_at: None,
        }
    }

    /// Advance to `now_ms` and return the state the LED should show
    ///
    /// `stalled` is only looked at in [`LedMode::Auto`].
    pub fn update(&mut self, mode: LedMode, stalled: bool, now_ms: u32) -> LedState {
        let mode = match mode {
            LedMode::Auto => self.auto_mode(stalled, now_ms),
            other => other,
        };

        match mode {
            LedMode::On => LedState::On,
            LedMode::Blink => self.blink(now_ms),
            LedMode::Off | LedMode::Auto => LedState::Off,
        }
    }

    /// Whether auto mode currently reports a stall
    #[must_use]
    pub fn stall_reported(&self, now_ms: u32) -> bool {
        self.stall_since
            .is_some_and(|since| elapsed(since, now_ms) > STALL_GRACE_MS)
    }

    fn auto_mode(&mut self, stalled: bool, now_ms: u32) -> LedMode {
        if !stalled {
            self.stall_since = None;
            return LedMode::Off;
        }
        self.stall_since.get_or_insert(now_ms);
        if self.stall_reported(now_ms) {
            LedMode::Blink
        } else {
            LedMode::Off
        }
    }

    fn blink(&mut self, now_ms: u32) -> LedState {
        let hold = match self.blink {
            LedState::On => BLINK_ON_MS,
            LedState::Off => BLINK_OFF_MS,
        };
        let due = self
            .toggled_at
            .map_or(true, |at| elapsed(at, now_ms) >= hold);
        if due {
            self.blink = self.blink.toggle();
            self.toggled_at = Some(now_ms);
        }
        self.blink
    }
}
