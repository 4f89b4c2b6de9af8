//! Flash-backed Configuration Storage
//!
//! Presents one flash page as a small byte-addressable store so the
//! configuration record can use the `embedded-storage` `Storage` traits.
//! Writes compare first and skip the erase when nothing changed.

use embassy_stm32::flash::{Blocking, Error, Flash};
use embedded_storage::{ReadStorage, Storage};

use crate::config::{CONFIG_AREA_SIZE, CONFIG_FLASH_OFFSET, FLASH_PAGE_SIZE};

/// Flash write granularity on STM32G4 (one double word)
const WRITE_SIZE: usize = 8;

/// Configuration area at the end of flash bank 1
pub struct FlashConfigStorage<'d> {
    flash: Flash<'d, Blocking>,
}

impl<'d> FlashConfigStorage<'d> {
    /// Wrap the flash peripheral
    #[must_use]
    pub fn new(flash: Flash<'d, Blocking>) -> Self {
        Self { flash }
    }
}

impl ReadStorage for FlashConfigStorage<'_> {
    type Error = Error;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if offset as usize + bytes.len() > CONFIG_AREA_SIZE {
            return Err(Error::Size);
        }
        self.flash.blocking_read(CONFIG_FLASH_OFFSET + offset, bytes)
    }

    fn capacity(&self) -> usize {
        CONFIG_AREA_SIZE
    }
}

impl Storage for FlashConfigStorage<'_> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > CONFIG_AREA_SIZE {
            return Err(Error::Size);
        }

        let mut area = [0xFFu8; CONFIG_AREA_SIZE];
        self.flash.blocking_read(CONFIG_FLASH_OFFSET, &mut area)?;
        if area[start..end] == *bytes {
            return Ok(());
        }
        area[start..end].copy_from_slice(bytes);

        self.flash
            .blocking_erase(CONFIG_FLASH_OFFSET, CONFIG_FLASH_OFFSET + FLASH_PAGE_SIZE)?;
        for (i, chunk) in area.chunks(WRITE_SIZE).enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let at = CONFIG_FLASH_OFFSET + (i * WRITE_SIZE) as u32;
            self.flash.blocking_write(at, chunk)?;
        }
        Ok(())
    }
}
