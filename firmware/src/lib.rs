//! USB PWM Fan Controller Firmware Library
//!
//! Core functionality for an STM32G474-based fan controller that drives two
//! 4-pin PWM fans, measures their speed from the tachometer lines, blinks a
//! status LED on stall and persists its settings in flash. The host talks to
//! it through a small register map, reachable both as USB vendor control
//! transfers and as a typed serial console.
//!
//! # Architecture
//!
//! The firmware is organized in layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TRANSPORT LAYER                           │
//! │  USB vendor requests  │  Serial command parser  │  Status LED │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 REGISTER PROTOCOL CORE                       │
//! │  FanDevice: register map, config lifecycle, reboot control   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    CONTROL LAYER                             │
//! │  PWM controller  │  Tachometer / stall  │  Config store       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   HAL / DRIVER LAYER                         │
//! │  PWM timer  │  Clock  │  Flash  │  GPIO  │  System reset     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    RTOS / SCHEDULER                          │
//! │           embassy-rs (async/await executor)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - **Hardware behind capabilities**: the control logic sees traits, so the
//!   whole register engine runs on the host against recording mocks
//! - **Interrupt-shared state in critical sections**: tachometer cells and
//!   the device are only touched inside `critical_section::with`
//! - **Unsafe kept to the bootloader jump**: register access goes through the PAC
//! - **Explicit error handling**: fallible operations return `Result`, and
//!   reboots are values returned to the caller instead of diverging calls

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Re-export dependencies needed by applications (only in embedded mode)
#[cfg(feature = "embedded")]
pub use embassy_executor;
#[cfg(feature = "embedded")]
pub use embassy_stm32;
#[cfg(feature = "embedded")]
pub use embassy_time;
#[cfg(feature = "embedded")]
pub use embassy_usb;

/// Hardware Abstraction Layer
///
/// Capability traits plus STM32G474 implementations and host mocks.
pub mod hal;

/// PWM Channel Controller
///
/// Duty/period control with output enables deferred to the period boundary.
pub mod pwm;

/// Tachometer & Stall Detector
pub mod tach;

/// Persistent Configuration Store
///
/// Versioned, CRC-checked configuration record.
pub mod storage;

/// Register Protocol Core
pub mod registers;

/// Serial Command Protocol
///
/// `R<reg>` / `W<reg>,<value>` console parser.
pub mod protocol;

/// Status LED policy
pub mod status;

/// USB Subsystem
///
/// Vendor register interface and CDC ACM console support.
pub mod usb;

/// Shared types used across modules
pub mod types;

/// System configuration and constants
pub mod config;

/// Prelude module for common imports
#[cfg(feature = "embedded")]
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::*;
    pub use crate::types::*;

    pub use crate::hal::timer::Clock;
    pub use crate::registers::RegisterMap;

    // Embassy
    pub use embassy_time::{Duration, Instant, Timer};

    // Logging
    pub use defmt::{debug, error, info, trace, warn};
}
