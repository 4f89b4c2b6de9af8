//! System Control Tests
//!
//! Tests for the bootloader request handshake across a reset.

use fan_firmware::hal::mock::MockBackupRegister;
use fan_firmware::hal::system::{
    request_bootloader, take_bootloader_request, BackupRegister, BOOTLOADER_REQUEST,
};

// ============================================================================
// Bootloader Request Tests
// ============================================================================

#[test]
fn test_cold_boot_runs_firmware() {
    let mut backup = MockBackupRegister::default();
    assert!(!take_bootloader_request(&mut backup));
    assert_eq!(backup.read(), 0);
}

#[test]
fn test_request_is_seen_by_next_boot() {
    let mut backup = MockBackupRegister::default();
    request_bootloader(&mut backup);
    assert_eq!(backup.read(), BOOTLOADER_REQUEST);
    assert!(take_bootloader_request(&mut backup));
}

#[test]
fn test_request_is_consumed_once() {
    let mut backup = MockBackupRegister::holding(BOOTLOADER_REQUEST);
    assert!(take_bootloader_request(&mut backup));
    assert_eq!(backup.read(), 0);
    // Leaving the bootloader resets into the firmware again
    assert!(!take_bootloader_request(&mut backup));
}

#[test]
fn test_other_values_are_left_alone() {
    for value in [1, 0xFFFF_FFFF, BOOTLOADER_REQUEST ^ 1] {
        let mut backup = MockBackupRegister::holding(value);
        assert!(!take_bootloader_request(&mut backup));
        assert_eq!(backup.read(), value);
    }
}
