//! GPIO Abstractions
//!
//! Status LED driver over any `embedded-hal` output pin.

use embedded_hal::digital::OutputPin;

/// Status LED state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LedState {
    /// LED is off
    #[default]
    Off,
    /// LED is on
    On,
}

impl LedState {
    /// Toggle the LED state
    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Off,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LedState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Off => defmt::write!(f, "OFF"),
            Self::On => defmt::write!(f, "ON"),
        }
    }
}

/// Status LED driver
///
/// Some boards wire the LED active low; `inverted` flips the pin level.
pub struct LedPin<P> {
    pin: P,
    inverted: bool,
    state: LedState,
}

impl<P: OutputPin> LedPin<P> {
    /// Create a new status LED (initially off)
    pub fn new(pin: P, inverted: bool) -> Self {
        let mut led = Self {
            pin,
            inverted,
            state: LedState::On,
        };
        led.set(LedState::Off);
        led
    }

    /// Drive the LED, touching the pin only on change
    pub fn set(&mut self, state: LedState) {
        if state == self.state {
            return;
        }
        let high = matches!(state, LedState::On) != self.inverted;
        // GPIO writes on this target are infallible
        let _ = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        self.state = state;
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> LedState {
        self.state
    }
}
