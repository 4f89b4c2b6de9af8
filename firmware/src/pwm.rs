//! PWM Channel Controller
//!
//! Both fan outputs share one timer and therefore one period. Duty and period
//! registers are double-buffered by the hardware and are written straight
//! away. Output enable bits are not, so switching a channel on or off is
//! staged in a single pending [`OutputMask`] and applied from the timer's
//! end-of-period interrupt, which then disarms itself.
//!
//! ```text
//! set_duty(ch, 0 -> n)        pending |= ch, arm
//!        │
//!        ▼  counter wraps
//! on_period_boundary()        outputs = pending, disarm
//! ```

use crate::hal::pwm::PwmTimer;
use crate::storage::ConfigRecord;
use crate::types::{Channel, OutputMask};

/// Effect of a duty write on a channel's output enable
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeChange {
    /// Enable state did not change
    Unchanged,
    /// Channel switched from off to on
    Enabled,
    /// Channel switched from on to off
    Disabled,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ModeChange {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Unchanged => defmt::write!(f, "unchanged"),
            Self::Enabled => defmt::write!(f, "enabled"),
            Self::Disabled => defmt::write!(f, "disabled"),
        }
    }
}

/// Duty/period control on top of a [`PwmTimer`]
pub struct PwmController<T> {
    timer: T,
    pending: OutputMask,
}

impl<T: PwmTimer> PwmController<T> {
    /// Program the timer from a configuration record
    ///
    /// Used at startup. Outputs are applied at once, without waiting for a
    /// period boundary.
    pub fn new(mut timer: T, record: &ConfigRecord) -> Self {
        let pending = program(&mut timer, record);
        Self { timer, pending }
    }

    /// Re-program the timer from a record, as on startup
    pub fn reload(&mut self, record: &ConfigRecord) {
        self.pending = program(&mut self.timer, record);
    }

    /// Set the shared period in timer ticks
    ///
    /// The running count restarts so a shorter period takes effect without
    /// one long cycle. A period of 0 wraps to the full 65536-tick range.
    pub fn set_period(&mut self, ticks: u16) {
        self.timer.set_period_register(ticks.wrapping_sub(1));
        self.timer.reset_counter();
    }

    /// Current period in timer ticks (wrapping)
    #[must_use]
    pub fn period(&self) -> u16 {
        self.timer.period_register().wrapping_add(1)
    }

    /// Set a channel's high time in timer ticks, 0 switches the output off
    ///
    /// Duty is not limited to the period; a duty at or above the period
    /// holds the output high.
    pub fn set_duty(&mut self, channel: Channel, ticks: u16) -> ModeChange {
        if ticks != 0 {
            self.timer.set_compare(channel, ticks - 1);
        }

        let next = self.pending.with(channel, ticks != 0);
        if next == self.pending {
            return ModeChange::Unchanged;
        }

        self.pending = next;
        self.timer.arm_period_interrupt();

        let change = if ticks != 0 {
            ModeChange::Enabled
        } else {
            ModeChange::Disabled
        };
        #[cfg(feature = "defmt")]
        defmt::debug!("{} output {}, pending {}", channel, change, next);
        change
    }

    /// Current high time in ticks, 0 when the channel is (being) switched off
    #[must_use]
    pub fn duty(&self, channel: Channel) -> u16 {
        if self.pending.is_enabled(channel) {
            self.timer.compare(channel).wrapping_add(1)
        } else {
            0
        }
    }

    /// Output enables that are in effect or waiting for the next boundary
    #[must_use]
    pub const fn pending(&self) -> OutputMask {
        self.pending
    }

    /// End-of-period interrupt body
    pub fn on_period_boundary(&mut self) {
        self.timer.set_outputs(self.pending);
        self.timer.disarm_period_interrupt();
    }

    /// Borrow the timer
    pub const fn timer(&self) -> &T {
        &self.timer
    }
}

fn program<T: PwmTimer>(timer: &mut T, record: &ConfigRecord) -> OutputMask {
    timer.disarm_period_interrupt();
    timer.set_period_register(record.pwm_period.wrapping_sub(1));

    let mut outputs = OutputMask::NONE;
    for channel in Channel::ALL {
        let duty = record.duty(channel);
        if duty != 0 {
            timer.set_compare(channel, duty - 1);
            outputs = outputs.with(channel, true);
        }
    }
    timer.set_outputs(outputs);
    timer.reset_counter();
    outputs
}
