//! Shared types used across the fan controller firmware
//!
//! This module defines domain-specific types that enforce invariants
//! at compile time and provide type safety throughout the codebase.

use core::fmt;

/// PWM/tachometer channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Fan 1 (registers 0x1X)
    One,
    /// Fan 2 (registers 0x2X)
    Two,
}

impl Channel {
    /// Every channel, in register order
    pub const ALL: [Self; 2] = [Self::One, Self::Two];

    /// Zero-based channel index
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }

    /// Offset added to channel 1 register addresses to reach this channel
    #[must_use]
    pub const fn register_offset(self) -> u8 {
        match self {
            Self::One => 0x00,
            Self::Two => 0x10,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Channel {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::One => defmt::write!(f, "CH1"),
            Self::Two => defmt::write!(f, "CH2"),
        }
    }
}

/// Status LED operating mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LedMode {
    /// Off while fans spin, blinking on stall
    #[default]
    Auto,
    /// Always on
    On,
    /// Always off
    Off,
    /// Always blinking
    Blink,
}

impl LedMode {
    /// Highest valid register encoding
    pub const MAX: u8 = 3;

    /// Decode a register value, `None` if out of range
    #[must_use]
    pub const fn from_register(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Auto),
            1 => Some(Self::On),
            2 => Some(Self::Off),
            3 => Some(Self::Blink),
            _ => None,
        }
    }

    /// Register/storage encoding
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Auto => 0,
            Self::On => 1,
            Self::Off => 2,
            Self::Blink => 3,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LedMode {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Auto => defmt::write!(f, "AUTO"),
            Self::On => defmt::write!(f, "ON"),
            Self::Off => defmt::write!(f, "OFF"),
            Self::Blink => defmt::write!(f, "BLINK"),
        }
    }
}

/// Per-channel PWM output enable bits
///
/// The timer's output-enable register is not double-buffered, so the
/// enable bits of both channels travel together as one word.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputMask(u8);

impl OutputMask {
    /// Both outputs disabled
    pub const NONE: Self = Self(0);

    /// Both outputs enabled
    pub const ALL: Self = Self(0b11);

    /// Check whether a channel output is enabled
    #[must_use]
    pub const fn is_enabled(self, channel: Channel) -> bool {
        self.0 & Self::bit(channel) != 0
    }

    /// Copy of this mask with one channel changed
    #[must_use]
    pub const fn with(self, channel: Channel, enabled: bool) -> Self {
        if enabled {
            Self(self.0 | Self::bit(channel))
        } else {
            Self(self.0 & !Self::bit(channel))
        }
    }

    const fn bit(channel: Channel) -> u8 {
        1 << channel.index()
    }
}

impl fmt::Debug for OutputMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputMask({:02b})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for OutputMask {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "OutputMask({=u8:b})", self.0);
    }
}

/// Non-returning device action requested through register 0xF0
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebootAction {
    /// Regular reboot
    Reboot,
    /// Reboot into the bootloader
    Bootloader,
    /// Persisted configuration was erased, reboot to factory defaults
    FactoryReset,
    /// Stop feeding the watchdog and wait for it to fire
    WatchdogTest,
}

#[cfg(feature = "defmt")]
impl defmt::Format for RebootAction {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Reboot => defmt::write!(f, "reboot"),
            Self::Bootloader => defmt::write!(f, "bootloader"),
            Self::FactoryReset => defmt::write!(f, "factory reset"),
            Self::WatchdogTest => defmt::write!(f, "watchdog test"),
        }
    }
}

/// Register address map
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    /// Firmware version (minor, major)
    Version,
    /// PWM duty ticks for a channel
    Duty(Channel),
    /// PWM period ticks shared by both channels
    Period,
    /// Tachometer speed for a channel
    Rpm(Channel),
    /// Reboot control
    RebootControl,
    /// Status LED mode
    LedMode,
    /// Configuration control
    ConfigControl,
    /// Device short name
    ShortName,
}

impl Register {
    /// Decode a register address
    #[must_use]
    pub const fn from_address(address: u8) -> Option<Self> {
        match address {
            0x00 => Some(Self::Version),
            0x10 => Some(Self::Duty(Channel::One)),
            0x20 => Some(Self::Duty(Channel::Two)),
            0x11 => Some(Self::Period),
            0x12 => Some(Self::Rpm(Channel::One)),
            0x22 => Some(Self::Rpm(Channel::Two)),
            0xF0 => Some(Self::RebootControl),
            0xF1 => Some(Self::LedMode),
            0xF2 => Some(Self::ConfigControl),
            0xF8 => Some(Self::ShortName),
            _ => None,
        }
    }

    /// Register address
    #[must_use]
    pub const fn address(self) -> u8 {
        match self {
            Self::Version => 0x00,
            Self::Duty(ch) => 0x10 + ch.register_offset(),
            Self::Period => 0x11,
            Self::Rpm(ch) => 0x12 + ch.register_offset(),
            Self::RebootControl => 0xF0,
            Self::LedMode => 0xF1,
            Self::ConfigControl => 0xF2,
            Self::ShortName => 0xF8,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Register {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "R{=u8:#x}", self.address());
    }
}
