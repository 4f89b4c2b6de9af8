//! Tachometer Edge Interrupts
//!
//! Routes both tachometer pins to their EXTI lines with rising and falling
//! triggers. The line handlers in the application stamp each edge with the
//! microsecond clock before returning, so timestamps carry only interrupt
//! latency.

use embassy_stm32::pac;

use crate::config::{TACH_EXTI_LINES, TACH_EXTI_PORT};
use crate::types::Channel;

/// Connect the tachometer lines and unmask their interrupts
///
/// The NVIC lines still have to be enabled by the caller.
pub fn enable_tach_edges() {
    pac::RCC.apb2enr().modify(|w| w.set_syscfgen(true));
    for line in TACH_EXTI_LINES {
        pac::SYSCFG
            .exticr(line / 4)
            .modify(|w| w.set_exti(line % 4, TACH_EXTI_PORT));
        pac::EXTI.rtsr(0).modify(|w| w.set_line(line, true));
        pac::EXTI.ftsr(0).modify(|w| w.set_line(line, true));
        pac::EXTI.pr(0).write(|w| w.set_line(line, true));
        pac::EXTI.imr(0).modify(|w| w.set_line(line, true));
    }
}

/// Acknowledge a channel's pending edge
pub fn clear_edge(channel: Channel) {
    let line = TACH_EXTI_LINES[channel.index()];
    pac::EXTI.pr(0).write(|w| w.set_line(line, true));
}
