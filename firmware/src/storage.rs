//! Persistent Configuration Store
//!
//! The configuration record is a small, fixed-size block kept at the start of
//! a byte-addressable storage area. A revision byte guards against reading a
//! layout written by incompatible firmware and a CRC-8 over the whole block
//! catches corruption. Anything that fails either check loads as the default
//! record; nothing is written back until a persist is requested.

use embedded_storage::{ReadStorage, Storage};

use crate::config::{CONFIG_OFFSET, DEFAULT_PWM_PERIOD};
use crate::types::{Channel, LedMode};

/// Layout revision of the current record format
///
/// `0x00` and `0xFF` (erased) are never used as revisions.
pub const CURRENT_REVISION: u8 = 2;

/// Revision byte value of erased storage
pub const ERASED_REVISION: u8 = 0xFF;

/// Encoded record size in bytes
pub const RECORD_SIZE: usize = 9;

/// CRC-8 (polynomial 0x07, initial value 0xFF) over a byte slice
///
/// Running it over a block followed by that block's CRC yields zero.
#[must_use]
pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0xFF, |crc, &byte| crc8_update(crc, byte))
}

const fn crc8_update(crc: u8, byte: u8) -> u8 {
    let mut crc = crc ^ byte;
    let mut bit = 0;
    while bit < 8 {
        crc = if crc & 0x80 != 0 {
            (crc << 1) ^ 0x07
        } else {
            crc << 1
        };
        bit += 1;
    }
    crc
}

/// Persisted device configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigRecord {
    /// Layout revision
    pub revision: u8,
    /// Status LED mode
    pub led_mode: LedMode,
    /// PWM period in timer ticks
    pub pwm_period: u16,
    /// Channel 1 duty in timer ticks (0 = output off)
    pub pwm1_duty: u16,
    /// Channel 2 duty in timer ticks (0 = output off)
    pub pwm2_duty: u16,
    /// CRC-8 of the preceding encoded bytes
    pub checksum: u8,
}

impl ConfigRecord {
    /// Factory defaults: 25 kHz, both outputs off, LED in auto mode
    pub const DEFAULT: Self = Self {
        revision: CURRENT_REVISION,
        led_mode: LedMode::Auto,
        pwm_period: DEFAULT_PWM_PERIOD,
        pwm1_duty: 0,
        pwm2_duty: 0,
        checksum: 0,
    };

    /// Duty ticks for a channel
    #[must_use]
    pub const fn duty(&self, channel: Channel) -> u16 {
        match channel {
            Channel::One => self.pwm1_duty,
            Channel::Two => self.pwm2_duty,
        }
    }

    /// Set the duty ticks for a channel
    pub fn set_duty(&mut self, channel: Channel, ticks: u16) {
        match channel {
            Channel::One => self.pwm1_duty = ticks,
            Channel::Two => self.pwm2_duty = ticks,
        }
    }

    /// Encode with the stored checksum byte as-is
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let period = self.pwm_period.to_le_bytes();
        let duty1 = self.pwm1_duty.to_le_bytes();
        let duty2 = self.pwm2_duty.to_le_bytes();
        [
            self.revision,
            self.led_mode.as_u8(),
            period[0],
            period[1],
            duty1[0],
            duty1[1],
            duty2[0],
            duty2[1],
            self.checksum,
        ]
    }

    /// Copy of this record with the checksum recomputed
    #[must_use]
    pub fn sealed(&self) -> Self {
        let bytes = self.to_bytes();
        Self {
            checksum: crc8(&bytes[..RECORD_SIZE - 1]),
            ..*self
        }
    }

    /// Decode and validate a stored block
    ///
    /// Returns `None` for a foreign revision, a failed checksum or an LED
    /// mode byte outside the known range.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Option<Self> {
        if bytes[0] != CURRENT_REVISION || crc8(bytes) != 0 {
            return None;
        }
        Some(Self {
            revision: bytes[0],
            led_mode: LedMode::from_register(u16::from(bytes[1]))?,
            pwm_period: u16::from_le_bytes([bytes[2], bytes[3]]),
            pwm1_duty: u16::from_le_bytes([bytes[4], bytes[5]]),
            pwm2_duty: u16::from_le_bytes([bytes[6], bytes[7]]),
            checksum: bytes[8],
        })
    }
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConfigRecord {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Config(rev {}, led {}, period {}, duty {}/{})",
            self.revision,
            self.led_mode,
            self.pwm_period,
            self.pwm1_duty,
            self.pwm2_duty
        );
    }
}

/// Configuration record persistence over a byte-addressable store
pub struct ConfigStore<S> {
    storage: S,
}

impl<S> ConfigStore<S>
where
    S: ReadStorage + Storage,
{
    /// Wrap a storage area
    pub const fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Read the stored record, or the default if absent or damaged
    pub fn load(&mut self) -> ConfigRecord {
        let mut bytes = [0u8; RECORD_SIZE];
        if self.storage.read(CONFIG_OFFSET, &mut bytes).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("config read failed, using defaults");
            return ConfigRecord::DEFAULT;
        }

        match ConfigRecord::from_bytes(&bytes) {
            Some(record) => {
                #[cfg(feature = "defmt")]
                defmt::info!("loaded {}", record);
                record
            }
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("stored config invalid (rev {=u8}), using defaults", bytes[0]);
                ConfigRecord::DEFAULT
            }
        }
    }

    /// Checksum and write the whole record in one storage operation
    ///
    /// Returns the record as written. Storage failures are not reported
    /// to the caller.
    pub fn save(&mut self, current: &ConfigRecord) -> ConfigRecord {
        let sealed = current.sealed();
        if self.storage.write(CONFIG_OFFSET, &sealed.to_bytes()).is_err() {
            #[cfg(feature = "defmt")]
            defmt::error!("config write failed");
        } else {
            #[cfg(feature = "defmt")]
            defmt::info!("saved {}", sealed);
        }
        sealed
    }

    /// Invalidate the stored record by erasing its revision byte
    pub fn factory_reset(&mut self) {
        if self.storage.write(CONFIG_OFFSET, &[ERASED_REVISION]).is_err() {
            #[cfg(feature = "defmt")]
            defmt::error!("config erase failed");
        } else {
            #[cfg(feature = "defmt")]
            defmt::info!("stored config erased");
        }
    }

    /// Borrow the underlying storage
    pub fn storage(&self) -> &S {
        &self.storage
    }
}
