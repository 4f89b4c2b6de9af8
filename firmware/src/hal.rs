//! Hardware Abstraction Layer
//!
//! Capability traits the control engine is written against, with the
//! STM32G474 register-level implementations behind the `embedded` feature
//! and recording test doubles on host builds.

pub mod gpio;
pub mod pwm;
pub mod system;
pub mod timer;

#[cfg(feature = "embedded")]
pub mod exti;

#[cfg(feature = "embedded")]
pub mod flash;

#[cfg(not(feature = "embedded"))]
pub mod mock;
