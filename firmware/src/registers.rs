//! Register Protocol Core
//!
//! Every transport speaks the same register map: an 8-bit address and, for
//! writes, a 16-bit value. [`FanDevice`] owns the live configuration, the PWM
//! controller and the config store and dispatches reads and writes to them.
//!
//! | Addr | Dir | Meaning                                   |
//! |------|-----|-------------------------------------------|
//! | 0x00 | R   | firmware version (minor, major)           |
//! | 0x10 | R/W | channel 1 duty ticks                      |
//! | 0x11 | R/W | PWM period ticks                          |
//! | 0x12 | R   | channel 1 RPM                             |
//! | 0x20 | R/W | channel 2 duty ticks                      |
//! | 0x22 | R   | channel 2 RPM                             |
//! | 0xF0 | W   | reboot control                            |
//! | 0xF1 | R/W | status LED mode                           |
//! | 0xF2 | W   | configuration control (1 = persist)       |
//! | 0xF8 | R   | 16-character short name                   |
//!
//! Callers hold a critical section around each dispatch so the edge and
//! period interrupts see consistent state.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;

use embedded_storage::{ReadStorage, Storage};
use heapless::Vec;

use crate::config::{SHORT_NAME_LEN, UNIQUE_ID_BYTES, VERSION_MAJOR, VERSION_MINOR};
use crate::hal::pwm::PwmTimer;
use crate::pwm::{ModeChange, PwmController};
use crate::storage::{ConfigRecord, ConfigStore};
use crate::tach::Tachometer;
use crate::types::{Channel, LedMode, RebootAction, Register};

/// Reboot control (0xF0) values
pub mod reboot_codes {
    /// Discard in-memory settings and reload the stored ones
    pub const RELOAD: u16 = 1;
    /// Regular reboot
    pub const REBOOT: u16 = 2;
    /// Reboot into the bootloader
    pub const BOOTLOADER: u16 = 3;
    /// Erase stored settings, then reboot
    pub const FACTORY_RESET: u16 = 4;
    /// Stop feeding the watchdog
    pub const WATCHDOG_TEST: u16 = 255;
}

/// Configuration control (0xF2) value that persists the live settings
pub const CONFIG_PERSIST: u16 = 1;

/// Register access failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterError {
    /// No register at this address for the requested direction
    UnknownRegister(u8),
    /// Device not set up yet
    Unavailable,
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRegister(address) => write!(f, "unknown register 0x{address:02x}"),
            Self::Unavailable => f.write_str("device not initialized"),
        }
    }
}

#[cfg(not(feature = "embedded"))]
impl std::error::Error for RegisterError {}

#[cfg(feature = "defmt")]
impl defmt::Format for RegisterError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::UnknownRegister(address) => {
                defmt::write!(f, "unknown register {=u8:#x}", address);
            }
            Self::Unavailable => defmt::write!(f, "device not initialized"),
        }
    }
}

/// Value returned by a register read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterValue {
    /// 16-bit numeric register
    Word(u16),
    /// Printable ASCII name
    Name([u8; SHORT_NAME_LEN]),
}

impl RegisterValue {
    /// Wire encoding: little-endian for words, raw bytes for names
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8, SHORT_NAME_LEN> {
        let mut bytes = Vec::new();
        // Both encodings fit the capacity
        let _ = match self {
            Self::Word(value) => bytes.extend_from_slice(&value.to_le_bytes()),
            Self::Name(name) => bytes.extend_from_slice(name),
        };
        bytes
    }
}

/// Result of a successful register write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Write applied, carry on
    Done,
    /// The device must now perform this action and will not come back
    Terminal(RebootAction),
}

/// Register access as needed by the transports
///
/// Implemented by [`FanDevice`] and by whatever shared handle the application
/// wraps it in.
pub trait RegisterMap {
    /// Read a register
    ///
    /// # Errors
    ///
    /// Fails for addresses that cannot be read.
    fn read_register(&self, address: u8, now_us: u32) -> Result<RegisterValue, RegisterError>;

    /// Write a register
    ///
    /// # Errors
    ///
    /// Fails for addresses that cannot be written.
    fn write_register(
        &mut self,
        address: u8,
        value: u16,
        now_us: u32,
    ) -> Result<WriteOutcome, RegisterError>;
}

/// Device short name from the MCU unique id
///
/// The id bytes are consumed least significant bit first, five bits per
/// character, mapped onto `0-9A-V`.
#[must_use]
pub fn short_name(uid: &[u8; UNIQUE_ID_BYTES]) -> [u8; SHORT_NAME_LEN] {
    let mut name = [b'0'; SHORT_NAME_LEN];
    let mut bytes = uid.iter();
    let mut bits: u16 = 0;
    let mut have: u32 = 0;

    for c in &mut name {
        if have < 5 {
            if let Some(&byte) = bytes.next() {
                bits |= u16::from(byte) << have;
                have += 8;
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        let n = (bits & 0x1F) as u8;
        *c = if n < 10 { b'0' + n } else { b'A' + n - 10 };
        bits >>= 5;
        have = have.saturating_sub(5);
    }
    name
}

/// The fan controller as seen through its register map
pub struct FanDevice<'a, T, S> {
    config: ConfigRecord,
    pwm: PwmController<T>,
    store: ConfigStore<S>,
    tach: &'a Tachometer,
    name: [u8; SHORT_NAME_LEN],
}

impl<'a, T, S> FanDevice<'a, T, S>
where
    T: PwmTimer,
    S: ReadStorage + Storage,
{
    /// Load the stored configuration and program the timer from it
    pub fn new(timer: T, storage: S, tach: &'a Tachometer, uid: &[u8; UNIQUE_ID_BYTES]) -> Self {
        let mut store = ConfigStore::new(storage);
        let config = store.load();
        let pwm = PwmController::new(timer, &config);
        Self {
            config,
            pwm,
            store,
            tach,
            name: short_name(uid),
        }
    }

    /// Read a register
    ///
    /// # Errors
    ///
    /// [`RegisterError::UnknownRegister`] for unmapped and write-only
    /// addresses.
    pub fn read(&self, address: u8, now_us: u32) -> Result<RegisterValue, RegisterError> {
        let register =
            Register::from_address(address).ok_or(RegisterError::UnknownRegister(address))?;
        let value = match register {
            Register::Version => u16::from_le_bytes([VERSION_MINOR, VERSION_MAJOR]),
            Register::Duty(channel) => self.pwm.duty(channel),
            Register::Period => self.pwm.period(),
            Register::Rpm(channel) => self.tach.rpm(channel, now_us),
            Register::LedMode => u16::from(self.config.led_mode.as_u8()),
            Register::ShortName => return Ok(RegisterValue::Name(self.name)),
            Register::RebootControl | Register::ConfigControl => {
                return Err(RegisterError::UnknownRegister(address))
            }
        };
        Ok(RegisterValue::Word(value))
    }

    /// Write a register
    ///
    /// Out-of-range LED modes and unrecognized control codes are accepted and
    /// ignored.
    ///
    /// # Errors
    ///
    /// [`RegisterError::UnknownRegister`] for unmapped and read-only
    /// addresses.
    pub fn write(
        &mut self,
        address: u8,
        value: u16,
        now_us: u32,
    ) -> Result<WriteOutcome, RegisterError> {
        let register =
            Register::from_address(address).ok_or(RegisterError::UnknownRegister(address))?;
        match register {
            Register::Duty(channel) => self.write_duty(channel, value, now_us),
            Register::Period => {
                self.config.pwm_period = value;
                self.pwm.set_period(value);
            }
            Register::RebootControl => return Ok(self.reboot_control(value)),
            Register::LedMode => {
                if let Some(mode) = LedMode::from_register(value) {
                    self.config.led_mode = mode;
                }
            }
            Register::ConfigControl => {
                if value == CONFIG_PERSIST {
                    self.config = self.store.save(&self.config);
                }
            }
            Register::Version | Register::Rpm(_) | Register::ShortName => {
                return Err(RegisterError::UnknownRegister(address))
            }
        }
        Ok(WriteOutcome::Done)
    }

    fn write_duty(&mut self, channel: Channel, ticks: u16, now_us: u32) {
        self.config.set_duty(channel, ticks);
        if self.pwm.set_duty(channel, ticks) == ModeChange::Enabled {
            // A fan that was off has no recent edges yet
            self.tach.prime(channel, now_us);
        }
    }

    fn reboot_control(&mut self, code: u16) -> WriteOutcome {
        let action = match code {
            reboot_codes::RELOAD => {
                self.config = self.store.load();
                self.pwm.reload(&self.config);
                return WriteOutcome::Done;
            }
            reboot_codes::REBOOT => RebootAction::Reboot,
            reboot_codes::BOOTLOADER => RebootAction::Bootloader,
            reboot_codes::FACTORY_RESET => {
                self.store.factory_reset();
                RebootAction::FactoryReset
            }
            reboot_codes::WATCHDOG_TEST => RebootAction::WatchdogTest,
            _ => return WriteOutcome::Done,
        };
        #[cfg(feature = "defmt")]
        defmt::info!("{} requested", action);
        WriteOutcome::Terminal(action)
    }

    /// Whether any enabled channel's fan has stopped turning
    #[must_use]
    pub fn check_stall(&self, now_us: u32) -> bool {
        let enabled = self.pwm.pending();
        Channel::ALL
            .into_iter()
            .filter(|&channel| enabled.is_enabled(channel))
            .any(|channel| self.tach.is_stalled(channel, now_us))
    }

    /// End-of-period interrupt body
    pub fn on_period_boundary(&mut self) {
        self.pwm.on_period_boundary();
    }

    /// Live status LED mode
    #[must_use]
    pub const fn led_mode(&self) -> LedMode {
        self.config.led_mode
    }

    /// Live (unsaved) configuration
    #[must_use]
    pub const fn config(&self) -> &ConfigRecord {
        &self.config
    }

    /// Device short name
    #[must_use]
    pub const fn short_name(&self) -> &[u8; SHORT_NAME_LEN] {
        &self.name
    }

    /// Borrow the PWM controller
    #[must_use]
    pub const fn pwm(&self) -> &PwmController<T> {
        &self.pwm
    }

    /// Borrow the config store
    #[must_use]
    pub const fn store(&self) -> &ConfigStore<S> {
        &self.store
    }
}

impl<T, S> RegisterMap for FanDevice<'_, T, S>
where
    T: PwmTimer,
    S: ReadStorage + Storage,
{
    fn read_register(&self, address: u8, now_us: u32) -> Result<RegisterValue, RegisterError> {
        self.read(address, now_us)
    }

    fn write_register(
        &mut self,
        address: u8,
        value: u16,
        now_us: u32,
    ) -> Result<WriteOutcome, RegisterError> {
        self.write(address, value, now_us)
    }
}

/// Slot for a device shared between thread mode and interrupts
pub type DeviceCell<'a, T, S> = Mutex<RefCell<Option<FanDevice<'a, T, S>>>>;

/// Handle to a device kept in a [`DeviceCell`]
///
/// Every access runs inside its own critical section. Accesses made before
/// the slot is filled fail with [`RegisterError::Unavailable`] or do nothing.
pub struct SharedDevice<'d, 'a, T, S> {
    cell: &'d DeviceCell<'a, T, S>,
}

impl<T, S> Clone for SharedDevice<'_, '_, T, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, S> Copy for SharedDevice<'_, '_, T, S> {}

impl<'d, 'a, T, S> SharedDevice<'d, 'a, T, S>
where
    T: PwmTimer,
    S: ReadStorage + Storage,
{
    /// Wrap a device slot
    #[must_use]
    pub const fn new(cell: &'d DeviceCell<'a, T, S>) -> Self {
        Self { cell }
    }

    /// Put the device into its slot
    pub fn install(&self, device: FanDevice<'a, T, S>) {
        critical_section::with(|cs| {
            self.cell.borrow_ref_mut(cs).replace(device);
        });
    }

    /// Run `f` on the device under a critical section
    pub fn with<R>(&self, f: impl FnOnce(&mut FanDevice<'a, T, S>) -> R) -> Option<R> {
        critical_section::with(|cs| self.cell.borrow_ref_mut(cs).as_mut().map(f))
    }

    /// See [`FanDevice::check_stall`]
    #[must_use]
    pub fn check_stall(&self, now_us: u32) -> bool {
        self.with(|device| device.check_stall(now_us))
            .unwrap_or(false)
    }

    /// See [`FanDevice::led_mode`]
    #[must_use]
    pub fn led_mode(&self) -> LedMode {
        self.with(|device| device.led_mode()).unwrap_or_default()
    }

    /// See [`FanDevice::on_period_boundary`]
    pub fn on_period_boundary(&self) {
        self.with(FanDevice::on_period_boundary);
    }
}

impl<T, S> RegisterMap for SharedDevice<'_, '_, T, S>
where
    T: PwmTimer,
    S: ReadStorage + Storage,
{
    fn read_register(&self, address: u8, now_us: u32) -> Result<RegisterValue, RegisterError> {
        self.with(|device| device.read(address, now_us))
            .unwrap_or(Err(RegisterError::Unavailable))
    }

    fn write_register(
        &mut self,
        address: u8,
        value: u16,
        now_us: u32,
    ) -> Result<WriteOutcome, RegisterError> {
        self.with(|device| device.write(address, value, now_us))
            .unwrap_or(Err(RegisterError::Unavailable))
    }
}
