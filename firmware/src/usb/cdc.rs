//! USB CDC ACM (Serial) Support
//!
//! Output buffering for the serial console and the descriptor strings and
//! IDs the USB device is built with.

use core::fmt;

use crate::config::{CONSOLE_BUFFER_SIZE, SHORT_NAME_LEN, USB_PID, USB_VID};

/// Console output collected between USB writes
///
/// Text beyond the capacity is dropped.
pub struct CdcWriteBuffer {
    buffer: [u8; CONSOLE_BUFFER_SIZE],
    len: usize,
}

impl CdcWriteBuffer {
    /// Create a new write buffer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0; CONSOLE_BUFFER_SIZE],
            len: 0,
        }
    }

    /// Append bytes, returning how many fit
    pub fn write(&mut self, data: &[u8]) -> usize {
        let to_write = data.len().min(self.free());
        self.buffer[self.len..self.len + to_write].copy_from_slice(&data[..to_write]);
        self.len += to_write;
        to_write
    }

    /// Get buffer contents
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Get used length
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get free space
    #[must_use]
    pub const fn free(&self) -> usize {
        CONSOLE_BUFFER_SIZE - self.len
    }
}

impl Default for CdcWriteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for CdcWriteBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.write(s.as_bytes()) == s.len() {
            Ok(())
        } else {
            Err(fmt::Error)
        }
    }
}

/// USB device descriptor strings
pub struct UsbStrings<'a> {
    /// Manufacturer name
    pub manufacturer: &'a str,
    /// Product name
    pub product: &'a str,
    /// Serial number
    pub serial: &'a str,
}

impl<'a> UsbStrings<'a> {
    /// Default strings with the device short name as serial number
    ///
    /// Falls back to the default serial if the name is not valid UTF-8,
    /// which a name built from `0-9A-V` always is.
    #[must_use]
    pub fn with_short_name(name: &'a [u8; SHORT_NAME_LEN]) -> Self {
        let mut strings = Self::default();
        if let Ok(serial) = core::str::from_utf8(name) {
            strings.serial = serial;
        }
        strings
    }
}

impl Default for UsbStrings<'_> {
    fn default() -> Self {
        Self {
            manufacturer: "USB PWM Fan Project",
            product: "USB PWM Fan Controller",
            serial: "0000000000000000",
        }
    }
}

/// USB device info for descriptor
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceInfo {
    /// Vendor ID
    pub vid: u16,
    /// Product ID
    pub pid: u16,
    /// Device release number (BCD major.minor)
    pub device_release: u16,
}

impl Default for UsbDeviceInfo {
    fn default() -> Self {
        Self {
            vid: USB_VID,
            pid: USB_PID,
            device_release: u16::from_be_bytes([
                crate::config::VERSION_MAJOR,
                crate::config::VERSION_MINOR,
            ]),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for UsbDeviceInfo {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "USB({:04X}:{:04X})", self.vid, self.pid);
    }
}
