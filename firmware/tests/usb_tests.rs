//! USB Interface Tests
//!
//! Tests for vendor control request decoding and dispatch, the console
//! write buffer and the descriptor strings.

use core::fmt::Write;

use fan_firmware::config::{CONSOLE_BUFFER_SIZE, USB_PID, USB_VID};
use fan_firmware::hal::mock::{MemStorage, MockPwmTimer};
use fan_firmware::registers::{short_name, FanDevice};
use fan_firmware::tach::Tachometer;
use fan_firmware::types::RebootAction;
use fan_firmware::usb::cdc::{CdcWriteBuffer, UsbDeviceInfo, UsbStrings};
use fan_firmware::usb::vendor::{
    handle, ControlOutcome, SetupPacket, VendorRequest, REQUEST_TYPE_READ, REQUEST_TYPE_WRITE,
};

const INTERFACE: u8 = 0;

fn read_setup(register: u8, length: u16) -> SetupPacket {
    SetupPacket {
        request_type: REQUEST_TYPE_READ,
        request: register,
        value: 0,
        index: u16::from(INTERFACE),
        length,
    }
}

fn write_setup(register: u8, value: u16) -> SetupPacket {
    SetupPacket {
        request_type: REQUEST_TYPE_WRITE,
        request: register,
        value,
        index: u16::from(INTERFACE),
        length: 0,
    }
}

fn control(
    device: &mut FanDevice<'_, MockPwmTimer, MemStorage>,
    setup: &SetupPacket,
    buf: &mut [u8],
) -> ControlOutcome {
    let request = VendorRequest::decode(setup, INTERFACE).expect("vendor request");
    handle(request, device, 0, buf)
}

// ============================================================================
// Decode Tests
// ============================================================================

#[test]
fn test_decode_read() {
    assert_eq!(
        VendorRequest::decode(&read_setup(0x11, 2), INTERFACE),
        Some(VendorRequest::Read {
            register: 0x11,
            length: 2
        })
    );
}

#[test]
fn test_decode_write() {
    assert_eq!(
        VendorRequest::decode(&write_setup(0x10, 320), INTERFACE),
        Some(VendorRequest::Write {
            register: 0x10,
            value: 320
        })
    );
}

#[test]
fn test_decode_other_interface() {
    let setup = read_setup(0x11, 2);
    assert_eq!(VendorRequest::decode(&setup, INTERFACE + 1), None);
}

#[test]
fn test_decode_other_request_types() {
    for request_type in [0x00, 0x80, 0x21, 0xA1, 0xC0, 0x40, 0xC2] {
        let setup = SetupPacket {
            request_type,
            ..read_setup(0x11, 2)
        };
        assert_eq!(VendorRequest::decode(&setup, INTERFACE), None, "{request_type:#x}");
    }
}

// ============================================================================
// Dispatch Tests
// ============================================================================

#[test]
fn test_read_period_little_endian() {
    let tach = Tachometer::new();
    let mut device = FanDevice::new(MockPwmTimer::new(), MemStorage::new(), &tach, &[0; 10]);
    let mut buf = [0u8; 64];
    assert_eq!(
        control(&mut device, &read_setup(0x11, 64), &mut buf),
        ControlOutcome::Data(2)
    );
    assert_eq!(&buf[..2], &640u16.to_le_bytes());
}

#[test]
fn test_read_truncated_to_length() {
    let tach = Tachometer::new();
    let mut device = FanDevice::new(MockPwmTimer::new(), MemStorage::new(), &tach, &[0; 10]);
    let mut buf = [0u8; 64];
    assert_eq!(
        control(&mut device, &read_setup(0x11, 1), &mut buf),
        ControlOutcome::Data(1)
    );
    assert_eq!(buf[0], 0x80);
}

#[test]
fn test_read_truncated_to_buffer() {
    let tach = Tachometer::new();
    let mut device = FanDevice::new(MockPwmTimer::new(), MemStorage::new(), &tach, &[0; 10]);
    let mut buf = [0u8; 4];
    assert_eq!(
        control(&mut device, &read_setup(0xF8, 64), &mut buf),
        ControlOutcome::Data(4)
    );
}

#[test]
fn test_read_short_name() {
    let uid = [0xA5; 10];
    let tach = Tachometer::new();
    let mut device = FanDevice::new(MockPwmTimer::new(), MemStorage::new(), &tach, &uid);
    let mut buf = [0u8; 64];
    assert_eq!(
        control(&mut device, &read_setup(0xF8, 64), &mut buf),
        ControlOutcome::Data(16)
    );
    assert_eq!(&buf[..16], &short_name(&uid));
}

#[test]
fn test_read_unknown_rejected() {
    let tach = Tachometer::new();
    let mut device = FanDevice::new(MockPwmTimer::new(), MemStorage::new(), &tach, &[0; 10]);
    let mut buf = [0u8; 64];
    assert_eq!(
        control(&mut device, &read_setup(0x42, 2), &mut buf),
        ControlOutcome::Rejected
    );
}

#[test]
fn test_write_accepted() {
    let tach = Tachometer::new();
    let mut device = FanDevice::new(MockPwmTimer::new(), MemStorage::new(), &tach, &[0; 10]);
    assert_eq!(
        control(&mut device, &write_setup(0x10, 320), &mut []),
        ControlOutcome::Accepted
    );
    assert_eq!(device.config().pwm1_duty, 320);
}

#[test]
fn test_write_read_only_rejected() {
    let tach = Tachometer::new();
    let mut device = FanDevice::new(MockPwmTimer::new(), MemStorage::new(), &tach, &[0; 10]);
    assert_eq!(
        control(&mut device, &write_setup(0x00, 1), &mut []),
        ControlOutcome::Rejected
    );
}

#[test]
fn test_bootloader_write_is_terminal() {
    let tach = Tachometer::new();
    let mut device = FanDevice::new(MockPwmTimer::new(), MemStorage::new(), &tach, &[0; 10]);
    assert_eq!(
        control(&mut device, &write_setup(0xF0, 3), &mut []),
        ControlOutcome::Terminal(RebootAction::Bootloader)
    );
}

// ============================================================================
// Console Buffer Tests
// ============================================================================

#[test]
fn test_buffer_starts_empty() {
    let buf = CdcWriteBuffer::new();
    assert!(buf.is_empty());
    assert_eq!(buf.len(), 0);
    assert_eq!(buf.free(), CONSOLE_BUFFER_SIZE);
}

#[test]
fn test_buffer_collects_text() {
    let mut buf = CdcWriteBuffer::default();
    write!(buf, "R17\r\n{}\r\n", 640).unwrap();
    assert_eq!(buf.as_bytes(), b"R17\r\n640\r\n");
    buf.clear();
    assert!(buf.is_empty());
}

#[test]
fn test_buffer_overflow_reports_error() {
    let mut buf = CdcWriteBuffer::new();
    let filler = "x".repeat(CONSOLE_BUFFER_SIZE - 2);
    assert!(buf.write_str(&filler).is_ok());
    assert!(buf.write_str("abc").is_err());
    assert_eq!(buf.len(), CONSOLE_BUFFER_SIZE);
    assert_eq!(&buf.as_bytes()[CONSOLE_BUFFER_SIZE - 2..], b"ab");
}

#[test]
fn test_buffer_partial_write_count() {
    let mut buf = CdcWriteBuffer::new();
    assert_eq!(buf.write(&[0; CONSOLE_BUFFER_SIZE + 10]), CONSOLE_BUFFER_SIZE);
    assert_eq!(buf.write(b"more"), 0);
}

// ============================================================================
// Descriptor Tests
// ============================================================================

#[test]
fn test_default_strings() {
    let strings = UsbStrings::default();
    assert_eq!(strings.manufacturer, "USB PWM Fan Project");
    assert_eq!(strings.product, "USB PWM Fan Controller");
    assert_eq!(strings.serial.len(), 16);
}

#[test]
fn test_serial_is_short_name() {
    let name = short_name(&[0x5A; 10]);
    let strings = UsbStrings::with_short_name(&name);
    assert_eq!(strings.serial.as_bytes(), &name);
}

#[test]
fn test_device_info() {
    let info = UsbDeviceInfo::default();
    assert_eq!(info.vid, USB_VID);
    assert_eq!(info.pid, USB_PID);
    assert_eq!(info.device_release, 0x0100);
}
