//! PWM Timer Capability
//!
//! Models a timer peripheral whose period and compare registers are
//! double-buffered (safe to write at any time) but whose output-enable
//! register takes effect immediately and must only change at a period
//! boundary.

use crate::types::{Channel, OutputMask};

/// Register-level access to the fan PWM timer
///
/// Register values are raw: period register = ticks - 1, compare = duty - 1.
pub trait PwmTimer {
    /// Write the period (auto-reload) register
    fn set_period_register(&mut self, top: u16);

    /// Read back the period register
    fn period_register(&self) -> u16;

    /// Restart the running count so a shortened period does not stretch
    fn reset_counter(&mut self);

    /// Write a channel's compare register (takes effect at the next period)
    fn set_compare(&mut self, channel: Channel, value: u16);

    /// Read back a channel's compare register
    fn compare(&self, channel: Channel) -> u16;

    /// Write the output-enable bits (takes effect immediately)
    fn set_outputs(&mut self, mask: OutputMask);

    /// Clear any stale boundary flag and enable the end-of-period interrupt
    fn arm_period_interrupt(&mut self);

    /// Disable the end-of-period interrupt and clear its flag
    fn disarm_period_interrupt(&mut self);
}

#[cfg(feature = "embedded")]
pub use self::stm32::Stm32PwmTimer;

#[cfg(feature = "embedded")]
mod stm32 {
    use embassy_stm32::pac::timer::{vals, TimGp16};

    use super::PwmTimer;
    use crate::types::{Channel, OutputMask};

    /// General-purpose 16-bit timer driven directly through its registers
    ///
    /// Channels 1 and 2 of the timer run in PWM mode 1 with compare preload,
    /// edge-aligned, counting up.
    pub struct Stm32PwmTimer {
        regs: TimGp16,
    }

    impl Stm32PwmTimer {
        /// Take over a timer (e.g. `embassy_stm32::pac::TIM3`)
        ///
        /// The timer clock must already be enabled; outputs start disabled.
        #[must_use]
        pub fn new(regs: TimGp16) -> Self {
            regs.cr1().modify(|w| {
                w.set_cen(false);
                w.set_arpe(false);
            });
            regs.dier().write(|w| w.set_uie(false));
            regs.psc().write_value(0);
            regs.ccer().write(|w| {
                w.set_cce(0, false);
                w.set_cce(1, false);
            });
            regs.ccmr_output(0).modify(|w| {
                for ch in 0..2 {
                    w.set_ocm(ch, vals::Ocm::PWM_MODE1);
                    w.set_ocpe(ch, true);
                }
            });
            regs.egr().write(|w| w.set_ug(true));
            regs.sr().write_value(Default::default());
            regs.cr1().modify(|w| w.set_cen(true));
            Self { regs }
        }
    }

    impl PwmTimer for Stm32PwmTimer {
        fn set_period_register(&mut self, top: u16) {
            self.regs.arr().write(|w| w.set_arr(top));
        }

        fn period_register(&self) -> u16 {
            self.regs.arr().read().arr()
        }

        fn reset_counter(&mut self) {
            self.regs.cnt().write(|w| w.set_cnt(0));
        }

        fn set_compare(&mut self, channel: Channel, value: u16) {
            self.regs.ccr(channel.index()).write(|w| w.set_ccr(value));
        }

        fn compare(&self, channel: Channel) -> u16 {
            self.regs.ccr(channel.index()).read().ccr()
        }

        fn set_outputs(&mut self, mask: OutputMask) {
            self.regs.ccer().modify(|w| {
                for ch in Channel::ALL {
                    w.set_cce(ch.index(), mask.is_enabled(ch));
                }
            });
        }

        fn arm_period_interrupt(&mut self) {
            self.regs.sr().modify(|w| w.set_uif(false));
            self.regs.dier().modify(|w| w.set_uie(true));
        }

        fn disarm_period_interrupt(&mut self) {
            self.regs.dier().modify(|w| w.set_uie(false));
            self.regs.sr().modify(|w| w.set_uif(false));
        }
    }
}
