//! Register Protocol Core Tests
//!
//! Tests for register dispatch, configuration lifecycle and reboot control,
//! with the device built on the mock timer and in-memory storage.

use core::cell::RefCell;

use critical_section::Mutex;
use fan_firmware::hal::mock::{MemStorage, MockPwmTimer};
use fan_firmware::registers::{
    reboot_codes, DeviceCell, FanDevice, RegisterError, RegisterMap, RegisterValue, SharedDevice,
    WriteOutcome, CONFIG_PERSIST,
};
use fan_firmware::storage::{ConfigRecord, ConfigStore, CURRENT_REVISION};
use fan_firmware::tach::Tachometer;
use fan_firmware::types::{Channel, LedMode, OutputMask, RebootAction};

const UID: [u8; 10] = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x11, 0x22];

type Device<'a> = FanDevice<'a, MockPwmTimer, MemStorage>;

fn device(tach: &Tachometer) -> Device<'_> {
    FanDevice::new(MockPwmTimer::new(), MemStorage::new(), tach, &UID)
}

fn device_with(tach: &Tachometer, storage: MemStorage) -> Device<'_> {
    FanDevice::new(MockPwmTimer::new(), storage, tach, &UID)
}

fn stored(record: &ConfigRecord) -> MemStorage {
    MemStorage::with_contents(&record.sealed().to_bytes())
}

fn word(dev: &Device<'_>, address: u8) -> u16 {
    match dev.read(address, 0) {
        Ok(RegisterValue::Word(value)) => value,
        other => panic!("register {address:#x}: {other:?}"),
    }
}

/// Spin a channel at one edge every `period_us` for a full ring lap
fn spin(tach: &Tachometer, channel: Channel, start_us: u32, period_us: u32) -> u32 {
    let mut now = start_us;
    for _ in 0..20 {
        now += period_us;
        tach.on_edge(channel, now);
    }
    now
}

// ============================================================================
// Startup Tests
// ============================================================================

#[test]
fn test_blank_storage_starts_with_defaults() {
    let tach = Tachometer::new();
    let dev = device(&tach);
    assert_eq!(*dev.config(), ConfigRecord::DEFAULT);
    assert_eq!(word(&dev, 0x11), 640);
    assert_eq!(word(&dev, 0x10), 0);
    assert_eq!(word(&dev, 0x20), 0);
    assert_eq!(dev.pwm().timer().outputs(), OutputMask::NONE);
}

#[test]
fn test_stored_config_is_applied() {
    let tach = Tachometer::new();
    let record = ConfigRecord {
        pwm_period: 800,
        pwm1_duty: 400,
        led_mode: LedMode::Blink,
        ..ConfigRecord::DEFAULT
    };
    let dev = device_with(&tach, stored(&record));
    assert_eq!(word(&dev, 0x11), 800);
    assert_eq!(word(&dev, 0x10), 400);
    assert_eq!(word(&dev, 0x20), 0);
    assert_eq!(word(&dev, 0xF1), 3);
    // Startup enables outputs without waiting for a boundary
    let outputs = dev.pwm().timer().outputs();
    assert!(outputs.is_enabled(Channel::One));
    assert!(!outputs.is_enabled(Channel::Two));
}

#[test]
fn test_corrupt_config_loads_defaults() {
    let tach = Tachometer::new();
    let mut storage = stored(&ConfigRecord {
        pwm_period: 800,
        ..ConfigRecord::DEFAULT
    });
    storage.bytes_mut()[3] ^= 0x01;
    let dev = device_with(&tach, storage);
    assert_eq!(*dev.config(), ConfigRecord::DEFAULT);
}

#[test]
fn test_foreign_revision_loads_defaults() {
    let tach = Tachometer::new();
    let record = ConfigRecord {
        revision: CURRENT_REVISION + 1,
        pwm_period: 800,
        ..ConfigRecord::DEFAULT
    };
    let dev = device_with(&tach, stored(&record));
    assert_eq!(word(&dev, 0x11), 640);
}

#[test]
fn test_loading_defaults_does_not_write() {
    let tach = Tachometer::new();
    let dev = device(&tach);
    assert_eq!(dev.store().storage().write_count(), 0);
}

// ============================================================================
// Read Tests
// ============================================================================

#[test]
fn test_read_version() {
    let tach = Tachometer::new();
    let dev = device(&tach);
    assert_eq!(dev.read(0x00, 0), Ok(RegisterValue::Word(0x0100)));
    assert_eq!(
        dev.read(0x00, 0).map(|v| v.to_bytes().to_vec()),
        Ok(vec![0x00, 0x01])
    );
}

#[test]
fn test_read_unknown_register() {
    let tach = Tachometer::new();
    let dev = device(&tach);
    for address in [0x01, 0x0A, 0x13, 0x30, 0xF3, 0xFF] {
        assert_eq!(
            dev.read(address, 0),
            Err(RegisterError::UnknownRegister(address))
        );
    }
}

#[test]
fn test_write_only_registers_not_readable() {
    let tach = Tachometer::new();
    let dev = device(&tach);
    assert_eq!(dev.read(0xF0, 0), Err(RegisterError::UnknownRegister(0xF0)));
    assert_eq!(dev.read(0xF2, 0), Err(RegisterError::UnknownRegister(0xF2)));
}

#[test]
fn test_read_short_name() {
    let tach = Tachometer::new();
    let dev = device(&tach);
    let Ok(RegisterValue::Name(name)) = dev.read(0xF8, 0) else {
        panic!("expected a name");
    };
    assert_eq!(&name, dev.short_name());
    assert!(name
        .iter()
        .all(|&c| c.is_ascii_digit() || (b'A'..=b'V').contains(&c)));
}

#[test]
fn test_read_rpm_of_spinning_fan() {
    let tach = Tachometer::new();
    let dev = device(&tach);
    let now = spin(&tach, Channel::Two, 0, 2_000);
    // 16 edges x 2000 us per lap
    assert_eq!(dev.read(0x22, now), Ok(RegisterValue::Word(15_000)));
    assert_eq!(dev.read(0x12, now), Ok(RegisterValue::Word(0)));
}

#[test]
fn test_rpm_drops_to_zero_after_timeout() {
    let tach = Tachometer::new();
    let dev = device(&tach);
    let now = spin(&tach, Channel::One, 0, 2_000);
    assert_ne!(word_at(&dev, 0x12, now + 1_000_000), 0);
    assert_eq!(word_at(&dev, 0x12, now + 1_000_001), 0);
}

#[test]
fn test_switched_off_fan_reads_zero_rpm() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    dev.write(0x10, 320, 0).unwrap();
    dev.on_period_boundary();
    let now = spin(&tach, Channel::One, 0, 2_000);
    assert_eq!(word_at(&dev, 0x12, now), 15_000);

    dev.write(0x10, 0, now).unwrap();
    dev.on_period_boundary();
    assert!(!dev.pwm().timer().outputs().is_enabled(Channel::One));
    assert_eq!(word(&dev, 0x10), 0);

    // The fan winds down and the last edge goes stale
    let later = now + 1_000_001;
    assert_eq!(word_at(&dev, 0x12, later), 0);
    assert!(!dev.check_stall(later));
}

fn word_at(dev: &Device<'_>, address: u8, now: u32) -> u16 {
    match dev.read(address, now) {
        Ok(RegisterValue::Word(value)) => value,
        other => panic!("register {address:#x}: {other:?}"),
    }
}

// ============================================================================
// Write Tests
// ============================================================================

#[test]
fn test_write_duty_updates_config_and_timer() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    assert_eq!(dev.write(0x10, 320, 0), Ok(WriteOutcome::Done));
    assert_eq!(dev.config().pwm1_duty, 320);
    assert_eq!(dev.pwm().timer().state().compare[0], 319);
    assert_eq!(word(&dev, 0x10), 320);
}

#[test]
fn test_write_duty_above_period_is_kept() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    dev.write(0x20, 1000, 0).unwrap();
    assert_eq!(word(&dev, 0x20), 1000);
    assert_eq!(word(&dev, 0x11), 640);
}

#[test]
fn test_enable_waits_for_period_boundary() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    dev.write(0x10, 320, 0).unwrap();
    assert_eq!(dev.pwm().timer().outputs(), OutputMask::NONE);
    assert!(dev.pwm().timer().is_armed());

    dev.on_period_boundary();
    assert!(dev.pwm().timer().outputs().is_enabled(Channel::One));
    assert!(!dev.pwm().timer().is_armed());
}

#[test]
fn test_write_period() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    dev.write(0x11, 1280, 0).unwrap();
    assert_eq!(dev.config().pwm_period, 1280);
    assert_eq!(word(&dev, 0x11), 1280);
    assert_eq!(dev.pwm().timer().state().period_register, 1279);
}

#[test]
fn test_write_led_mode() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    dev.write(0xF1, 1, 0).unwrap();
    assert_eq!(dev.led_mode(), LedMode::On);
    assert_eq!(word(&dev, 0xF1), 1);
}

#[test]
fn test_out_of_range_led_mode_ignored() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    dev.write(0xF1, 2, 0).unwrap();
    assert_eq!(dev.write(0xF1, 4, 0), Ok(WriteOutcome::Done));
    assert_eq!(dev.led_mode(), LedMode::Off);
}

#[test]
fn test_write_read_only_register() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    for address in [0x00, 0x12, 0x22, 0xF8] {
        assert_eq!(
            dev.write(address, 1, 0),
            Err(RegisterError::UnknownRegister(address))
        );
    }
}

#[test]
fn test_write_unknown_register() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    assert_eq!(dev.write(0x0A, 1, 0), Err(RegisterError::UnknownRegister(0x0A)));
}

// ============================================================================
// Stall Detection Tests
// ============================================================================

#[test]
fn test_disabled_channels_never_stall() {
    let tach = Tachometer::new();
    let dev = device(&tach);
    assert!(!dev.check_stall(10_000_000));
}

#[test]
fn test_enabling_primes_stall_timer() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    spin(&tach, Channel::One, 0, 2_000);

    // Fan was off for a long time, then switched on
    let enable_at = 50_000_000;
    dev.write(0x10, 320, enable_at).unwrap();
    assert!(!dev.check_stall(enable_at + 500_000));
    assert!(dev.check_stall(enable_at + 500_001));
}

#[test]
fn test_spinning_fan_not_stalled() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    dev.write(0x10, 320, 0).unwrap();
    let now = spin(&tach, Channel::One, 0, 2_000);
    assert!(!dev.check_stall(now));
}

#[test]
fn test_fan_without_full_lap_is_stalled() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    dev.write(0x20, 320, 1_000).unwrap();
    assert!(dev.check_stall(1_000));
}

// ============================================================================
// Configuration Control Tests
// ============================================================================

#[test]
fn test_persist_then_reload_survives() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    dev.write(0x10, 320, 0).unwrap();
    dev.write(0x11, 800, 0).unwrap();
    dev.write(0xF1, 3, 0).unwrap();
    dev.write(0xF2, CONFIG_PERSIST, 0).unwrap();
    assert_eq!(dev.store().storage().write_count(), 1);

    // A fresh device on the same storage comes up with the saved settings
    let saved = dev.store().storage().clone();
    let dev = device_with(&tach, saved);
    assert_eq!(word(&dev, 0x10), 320);
    assert_eq!(word(&dev, 0x11), 800);
    assert_eq!(dev.led_mode(), LedMode::Blink);
}

#[test]
fn test_other_config_control_values_ignored() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    assert_eq!(dev.write(0xF2, 2, 0), Ok(WriteOutcome::Done));
    assert_eq!(dev.write(0xF2, 0, 0), Ok(WriteOutcome::Done));
    assert_eq!(dev.store().storage().write_count(), 0);
}

#[test]
fn test_reload_discards_unsaved_changes() {
    let tach = Tachometer::new();
    let record = ConfigRecord {
        pwm1_duty: 200,
        ..ConfigRecord::DEFAULT
    };
    let mut dev = device_with(&tach, stored(&record));
    dev.write(0x10, 500, 0).unwrap();
    dev.write(0x11, 1000, 0).unwrap();

    assert_eq!(
        dev.write(0xF0, reboot_codes::RELOAD, 0),
        Ok(WriteOutcome::Done)
    );
    assert_eq!(word(&dev, 0x10), 200);
    assert_eq!(word(&dev, 0x11), 640);
    assert_eq!(dev.config().pwm1_duty, 200);
}

#[test]
fn test_reload_of_blank_storage_restores_defaults() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    dev.write(0x20, 500, 0).unwrap();
    dev.write(0xF0, reboot_codes::RELOAD, 0).unwrap();
    assert_eq!(*dev.config(), ConfigRecord::DEFAULT);
    assert_eq!(word(&dev, 0x20), 0);
}

// ============================================================================
// Reboot Control Tests
// ============================================================================

#[test]
fn test_terminal_reboot_codes() {
    let cases = [
        (reboot_codes::REBOOT, RebootAction::Reboot),
        (reboot_codes::BOOTLOADER, RebootAction::Bootloader),
        (reboot_codes::FACTORY_RESET, RebootAction::FactoryReset),
        (reboot_codes::WATCHDOG_TEST, RebootAction::WatchdogTest),
    ];
    for (code, action) in cases {
        let tach = Tachometer::new();
        let mut dev = device(&tach);
        assert_eq!(
            dev.write(0xF0, code, 0),
            Ok(WriteOutcome::Terminal(action)),
            "code {code}"
        );
    }
}

#[test]
fn test_unrecognized_reboot_codes_ignored() {
    let tach = Tachometer::new();
    let mut dev = device(&tach);
    for code in [0, 5, 254, 256, 0xFFFF] {
        assert_eq!(dev.write(0xF0, code, 0), Ok(WriteOutcome::Done));
    }
}

#[test]
fn test_factory_reset_erases_stored_config() {
    let tach = Tachometer::new();
    let record = ConfigRecord {
        pwm_period: 800,
        ..ConfigRecord::DEFAULT
    };
    let mut dev = device_with(&tach, stored(&record));
    dev.write(0xF0, reboot_codes::FACTORY_RESET, 0).unwrap();

    let mut store = ConfigStore::new(dev.store().storage().clone());
    assert_eq!(store.load(), ConfigRecord::DEFAULT);
}

// ============================================================================
// Shared Device Tests
// ============================================================================

#[test]
fn test_shared_device_before_install() {
    let cell: DeviceCell<'_, MockPwmTimer, MemStorage> = Mutex::new(RefCell::new(None));
    let mut shared = SharedDevice::new(&cell);
    assert_eq!(shared.read_register(0x11, 0), Err(RegisterError::Unavailable));
    assert_eq!(
        shared.write_register(0x11, 1, 0),
        Err(RegisterError::Unavailable)
    );
    assert!(!shared.check_stall(0));
    assert_eq!(shared.led_mode(), LedMode::Auto);
    shared.on_period_boundary();
}

#[test]
fn test_shared_device_dispatches() {
    let tach = Tachometer::new();
    let cell: DeviceCell<'_, MockPwmTimer, MemStorage> = Mutex::new(RefCell::new(None));
    let mut shared = SharedDevice::new(&cell);
    shared.install(device(&tach));

    shared.write_register(0x10, 320, 0).unwrap();
    assert_eq!(shared.read_register(0x10, 0), Ok(RegisterValue::Word(320)));

    shared.on_period_boundary();
    let outputs = shared.with(|dev| dev.pwm().timer().outputs());
    assert_eq!(outputs.map(|o| o.is_enabled(Channel::One)), Some(true));
}

#[test]
fn test_shared_device_copies_share_state() {
    let tach = Tachometer::new();
    let cell: DeviceCell<'_, MockPwmTimer, MemStorage> = Mutex::new(RefCell::new(None));
    let shared = SharedDevice::new(&cell);
    shared.install(device(&tach));

    let mut writer = shared;
    writer.write_register(0xF1, 1, 0).unwrap();
    assert_eq!(shared.led_mode(), LedMode::On);
}

#[test]
fn test_register_error_display() {
    assert_eq!(
        RegisterError::UnknownRegister(0x0A).to_string(),
        "unknown register 0x0a"
    );
}
