//! System Control
//!
//! Terminal device actions (reboot, bootloader entry, watchdog test). These
//! are reached only through [`WriteOutcome::Terminal`](crate::registers::WriteOutcome)
//! so the register engine itself never diverges.
//!
//! Bootloader entry takes two boots. The request leaves a magic word in a
//! backup register that survives the system reset, and the next boot
//! consumes it with [`take_bootloader_request`] before any peripheral is set
//! up and jumps to the ROM bootloader.

use crate::types::RebootAction;

/// Executes terminal actions
pub trait SystemControl {
    /// Carry out the action; never returns
    fn enter(&mut self, action: RebootAction) -> !;
}

/// A word that keeps its value across a system reset
pub trait BackupRegister {
    /// Current contents
    fn read(&self) -> u32;

    /// Replace the contents
    fn write(&mut self, value: u32);
}

/// Magic value left in backup register 0 to request bootloader entry
pub const BOOTLOADER_REQUEST: u32 = 0xB007_10AD;

/// Leave a bootloader request for the next boot
pub fn request_bootloader<B: BackupRegister>(backup: &mut B) {
    backup.write(BOOTLOADER_REQUEST);
}

/// Consume a pending bootloader request
///
/// The register is cleared when a request is found, so the boot after the
/// bootloader runs the firmware again.
pub fn take_bootloader_request<B: BackupRegister>(backup: &mut B) -> bool {
    if backup.read() != BOOTLOADER_REQUEST {
        return false;
    }
    backup.write(0);
    true
}

#[cfg(feature = "embedded")]
pub use self::cortex::{enter_requested_bootloader, CortexMSystem, TampBackup};

#[cfg(feature = "embedded")]
mod cortex {
    use cortex_m::peripheral::SCB;
    use embassy_stm32::pac;

    use super::{request_bootloader, take_bootloader_request, BackupRegister, SystemControl};
    use crate::config::SYSTEM_MEMORY_BASE;
    use crate::types::RebootAction;

    /// TAMP backup register 0
    pub struct TampBackup(());

    impl TampBackup {
        /// Clock the RTC/TAMP APB interface and unlock the backup domain
        #[must_use]
        pub fn new() -> Self {
            pac::RCC.apb1enr1().modify(|w| {
                w.set_pwren(true);
                w.set_rtcapben(true);
            });
            pac::PWR.cr1().modify(|w| w.set_dbp(true));
            Self(())
        }
    }

    impl Default for TampBackup {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BackupRegister for TampBackup {
        fn read(&self) -> u32 {
            pac::TAMP.bkpr(0).read().bkp()
        }

        fn write(&mut self, value: u32) {
            pac::TAMP.bkpr(0).write(|w| w.set_bkp(value));
        }
    }

    /// Jump to the ROM bootloader if the previous boot asked for it
    ///
    /// Must run first thing after reset, while every peripheral is still in
    /// its reset state.
    #[allow(unsafe_code)]
    pub fn enter_requested_bootloader() {
        if take_bootloader_request(&mut TampBackup::new()) {
            cortex_m::interrupt::disable();
            // SAFETY: system memory holds a valid vector table, and nothing
            // has been configured yet that the bootloader could trip over
            unsafe { cortex_m::asm::bootload(SYSTEM_MEMORY_BASE as *const u32) }
        }
    }

    /// Cortex-M system reset and watchdog control
    #[derive(Default)]
    pub struct CortexMSystem;

    impl SystemControl for CortexMSystem {
        fn enter(&mut self, action: RebootAction) -> ! {
            defmt::warn!("entering {}", action);
            cortex_m::interrupt::disable();
            match action {
                // The watchdog started at boot is no longer fed
                RebootAction::WatchdogTest => loop {
                    cortex_m::asm::wfi();
                },
                RebootAction::Bootloader => {
                    request_bootloader(&mut TampBackup::new());
                    SCB::sys_reset()
                }
                RebootAction::Reboot | RebootAction::FactoryReset => SCB::sys_reset(),
            }
        }
    }
}
