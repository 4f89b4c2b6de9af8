//! System configuration and hardware constants
//!
//! This module defines compile-time constants for the fan controller hardware.
//! Pin mappings, clock frequencies, register-level limits and timing thresholds
//! are centralized here. Runtime settings live in the persisted
//! [`ConfigRecord`](crate::storage::ConfigRecord).

/// System clock frequency (STM32G474 running from HSI16)
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// PWM timer tick rate (timer prescaler of 1)
pub const PWM_TICK_HZ: u32 = 16_000_000;

/// Default PWM period in timer ticks (25 kHz, the standard 4-pin fan frequency)
pub const DEFAULT_PWM_PERIOD: u16 = 640;

/// Firmware major version reported by register 0x00
pub const VERSION_MAJOR: u8 = 1;

/// Firmware minor version reported by register 0x00
pub const VERSION_MINOR: u8 = 0;

/// Number of PWM/tachometer channels
pub const NUM_CHANNELS: usize = 2;

/// Tachometer edges kept per channel (one lap of the ring)
pub const PULSE_RING_SIZE: usize = 16;

/// Tachometer edges per fan revolution (two-pole open-collector output)
pub const EDGES_PER_REVOLUTION: u32 = 2;

/// EXTI line of each channel's tachometer pin
pub const TACH_EXTI_LINES: [usize; NUM_CHANNELS] = [0, 1];

/// EXTI source port of the tachometer pins (0 = GPIOA, 1 = GPIOB)
pub const TACH_EXTI_PORT: u8 = 1;

/// Time without an edge after which the RPM register reads zero
pub const RPM_TIMEOUT_US: u32 = 1_000_000;

/// Time without an edge after which an enabled channel counts as stalled
pub const STALL_TIMEOUT_US: u32 = 500_000;

/// Stall must persist this long before the status LED reports it
pub const STALL_GRACE_MS: u32 = 1_000;

/// Status LED on-time while blinking
pub const BLINK_ON_MS: u32 = 10;

/// Status LED off-time while blinking
pub const BLINK_OFF_MS: u32 = 140;

/// Byte offset of the configuration record inside its storage area
pub const CONFIG_OFFSET: u32 = 0;

/// Size of the storage area reserved for the configuration record
pub const CONFIG_AREA_SIZE: usize = 16;

/// Flash offset of the configuration page (last 2 KiB page of bank 1)
pub const CONFIG_FLASH_OFFSET: u32 = 0x0003_F800;

/// Start of the ROM bootloader's vector table (system memory)
pub const SYSTEM_MEMORY_BASE: u32 = 0x1FFF_0000;

/// Flash page size
pub const FLASH_PAGE_SIZE: u32 = 2048;

/// Number of hardware unique-id bytes used for the short name
pub const UNIQUE_ID_BYTES: usize = 10;

/// Length of the device short name (five bits per character)
pub const SHORT_NAME_LEN: usize = UNIQUE_ID_BYTES * 8 / 5;

/// Serial console response scratch buffer size
pub const RESPONSE_BUFFER_SIZE: usize = 20;

/// Serial console output buffer size
pub const CONSOLE_BUFFER_SIZE: usize = 128;

/// USB CDC ACM packet size
pub const USB_CDC_PACKET_SIZE: u16 = 64;

/// USB VID (use test VID for development)
pub const USB_VID: u16 = 0x1209;

/// USB PID (get from pid.codes for production)
pub const USB_PID: u16 = 0x0002;

/// Vendor interface class code
pub const USB_VENDOR_CLASS: u8 = 0xFF;

/// Vendor interface subclass identifying the fan register interface
pub const USB_VENDOR_SUBCLASS: u8 = 0xFD;

/// Vendor interface protocol
pub const USB_VENDOR_PROTOCOL: u8 = 0xFF;

/// Hardware watchdog timeout in microseconds
pub const WATCHDOG_TIMEOUT_US: u32 = 2_000_000;

/// Pin assignments for GPIO
pub mod pins {
    //! GPIO pin assignments matching the schematic

    /// Status LED
    pub const LED_STATUS: &str = "PA5";

    /// Fan 1 PWM output (TIM3 CH1)
    pub const FAN1_PWM: &str = "PA6";

    /// Fan 2 PWM output (TIM3 CH2)
    pub const FAN2_PWM: &str = "PA4";

    /// Fan 1 tachometer input (EXTI0)
    pub const FAN1_TACH: &str = "PB0";

    /// Fan 2 tachometer input (EXTI1)
    pub const FAN2_TACH: &str = "PB1";

    /// USB D+ (handled by USB peripheral)
    pub const USB_DP: &str = "PA12";

    /// USB D- (handled by USB peripheral)
    pub const USB_DM: &str = "PA11";
}
