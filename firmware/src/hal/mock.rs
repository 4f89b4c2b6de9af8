//! Host test doubles for the hardware capabilities
//!
//! `MockPwmTimer` records every register write as a snapshot of the timer
//! state, `MemStorage` is an in-memory byte store, `ManualClock` is a clock
//! tests advance by hand, `MockPin` remembers its output level and
//! `MockBackupRegister` stands in for the reset-surviving backup word.

use core::cell::Cell;
use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_storage::{ReadStorage, Storage};

use super::pwm::PwmTimer;
use super::system::BackupRegister;
use super::timer::Clock;
use crate::config::CONFIG_AREA_SIZE;
use crate::types::{Channel, OutputMask};

/// Timer register contents after a write
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TimerSnapshot {
    /// Period register (ticks - 1)
    pub period_register: u16,
    /// Compare registers (duty - 1) per channel
    pub compare: [u16; 2],
    /// Output-enable bits
    pub outputs: OutputMask,
}

/// Recording PWM timer
#[derive(Debug, Default)]
pub struct MockPwmTimer {
    state: TimerSnapshot,
    history: Vec<TimerSnapshot>,
    armed: bool,
    arm_count: usize,
    counter_resets: usize,
}

impl MockPwmTimer {
    /// Timer with all registers zero and the boundary interrupt disarmed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current register contents
    #[must_use]
    pub fn state(&self) -> TimerSnapshot {
        self.state
    }

    /// Register contents after each write, oldest first
    #[must_use]
    pub fn history(&self) -> &[TimerSnapshot] {
        &self.history
    }

    /// Output-enable bits currently driving the pins
    #[must_use]
    pub fn outputs(&self) -> OutputMask {
        self.state.outputs
    }

    /// Whether the end-of-period interrupt is enabled
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Number of times the end-of-period interrupt was armed
    #[must_use]
    pub fn arm_count(&self) -> usize {
        self.arm_count
    }

    /// Number of counter resets
    #[must_use]
    pub fn counter_resets(&self) -> usize {
        self.counter_resets
    }

    fn record(&mut self) {
        self.history.push(self.state);
    }
}

impl PwmTimer for MockPwmTimer {
    fn set_period_register(&mut self, top: u16) {
        self.state.period_register = top;
        self.record();
    }

    fn period_register(&self) -> u16 {
        self.state.period_register
    }

    fn reset_counter(&mut self) {
        self.counter_resets += 1;
    }

    fn set_compare(&mut self, channel: Channel, value: u16) {
        self.state.compare[channel.index()] = value;
        self.record();
    }

    fn compare(&self, channel: Channel) -> u16 {
        self.state.compare[channel.index()]
    }

    fn set_outputs(&mut self, mask: OutputMask) {
        self.state.outputs = mask;
        self.record();
    }

    fn arm_period_interrupt(&mut self) {
        self.armed = true;
        self.arm_count += 1;
    }

    fn disarm_period_interrupt(&mut self) {
        self.armed = false;
    }
}

/// In-memory storage area, erased to `0xFF`
#[derive(Clone, Debug)]
pub struct MemStorage {
    bytes: [u8; CONFIG_AREA_SIZE],
    writes: usize,
    write_protected: bool,
}

impl MemStorage {
    /// Erased storage
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: [0xFF; CONFIG_AREA_SIZE],
            writes: 0,
            write_protected: false,
        }
    }

    /// Storage pre-filled from a byte slice (remaining bytes erased)
    #[must_use]
    pub fn with_contents(contents: &[u8]) -> Self {
        let mut storage = Self::new();
        storage.bytes[..contents.len()].copy_from_slice(contents);
        storage
    }

    /// Raw contents
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable raw contents, for corrupting records in tests
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Make every following write fail
    pub fn set_write_protected(&mut self, protected: bool) {
        self.write_protected = protected;
    }

    /// Number of successful `Storage::write` calls so far
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory storage failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemStorageError {
    /// Access outside the storage area
    OutOfBounds,
    /// Write while write protection is on
    WriteProtected,
}

impl ReadStorage for MemStorage {
    type Error = MemStorageError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let src = self
            .bytes
            .get(start..start + bytes.len())
            .ok_or(MemStorageError::OutOfBounds)?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        CONFIG_AREA_SIZE
    }
}

impl Storage for MemStorage {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.write_protected {
            return Err(MemStorageError::WriteProtected);
        }
        let start = offset as usize;
        let dst = self
            .bytes
            .get_mut(start..start + bytes.len())
            .ok_or(MemStorageError::OutOfBounds)?;
        dst.copy_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }
}

/// Clock advanced by hand
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: Cell<u32>,
}

impl ManualClock {
    /// Clock reading `start_us`
    #[must_use]
    pub fn new(start_us: u32) -> Self {
        Self {
            micros: Cell::new(start_us),
        }
    }

    /// Move the clock forward (wrapping)
    pub fn advance_us(&self, us: u32) {
        self.micros.set(self.micros.get().wrapping_add(us));
    }

    /// Move the clock forward in milliseconds (wrapping)
    pub fn advance_ms(&self, ms: u32) {
        self.advance_us(ms.wrapping_mul(1_000));
    }

    /// Jump to an absolute time
    pub fn set_us(&self, us: u32) {
        self.micros.set(us);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u32 {
        self.micros.get()
    }

    fn now_millis(&self) -> u32 {
        self.micros.get() / 1_000
    }
}

/// Output pin that remembers its level
#[derive(Debug, Default)]
pub struct MockPin {
    high: bool,
    writes: usize,
}

impl MockPin {
    /// Pin driven low
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level
    #[must_use]
    pub fn is_high(&self) -> bool {
        self.high
    }

    /// Number of level writes
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.writes += 1;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.writes += 1;
        Ok(())
    }
}

/// Backup register kept in memory
#[derive(Debug, Default)]
pub struct MockBackupRegister {
    value: u32,
}

impl MockBackupRegister {
    /// Register holding `value`, as left behind by an earlier boot
    #[must_use]
    pub const fn holding(value: u32) -> Self {
        Self { value }
    }
}

impl BackupRegister for MockBackupRegister {
    fn read(&self) -> u32 {
        self.value
    }

    fn write(&mut self, value: u32) {
        self.value = value;
    }
}
