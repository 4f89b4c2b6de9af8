//! USB PWM Fan Controller Main Application
//!
//! Entry point for the STM32G474-based fan controller firmware.
//! Initializes hardware, installs the register engine and spawns the
//! USB and reboot tasks. Tachometer edges and PWM period boundaries are
//! handled in interrupts. The main loop renders the status LED
//! and feeds the watchdog.

#![no_std]
#![no_main]

use core::cell::RefCell;

use critical_section::Mutex;
use defmt::{info, unwrap, warn};
use embassy_executor::Spawner;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::InterruptExt;
use embassy_stm32::usb::{self as stm32_usb, Driver};
use embassy_stm32::wdg::IndependentWatchdog;
use embassy_stm32::{bind_interrupts, pac, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, UsbDevice};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use fan_firmware::hal::exti;
use fan_firmware::hal::flash::FlashConfigStorage;
use fan_firmware::hal::gpio::LedPin;
use fan_firmware::hal::pwm::Stm32PwmTimer;
use fan_firmware::hal::system::{enter_requested_bootloader, CortexMSystem, SystemControl};
use fan_firmware::hal::timer::EmbassyClock;
use fan_firmware::prelude::*;
use fan_firmware::protocol::CommandParser;
use fan_firmware::registers::{short_name, DeviceCell, FanDevice, SharedDevice};
use fan_firmware::status::StatusLed;
use fan_firmware::tach::Tachometer;
use fan_firmware::usb::cdc::{CdcWriteBuffer, UsbDeviceInfo, UsbStrings};
use fan_firmware::usb::vendor::VendorHandler;

type Storage = FlashConfigStorage<'static>;
type Shared = SharedDevice<'static, 'static, Stm32PwmTimer, Storage>;
type UsbDriver = Driver<'static, peripherals::USB>;

static TACH: Tachometer = Tachometer::new();
static DEVICE: DeviceCell<'static, Stm32PwmTimer, Storage> = Mutex::new(RefCell::new(None));
static REBOOT: Signal<CriticalSectionRawMutex, RebootAction> = Signal::new();

// Bind interrupt handlers
bind_interrupts!(struct Irqs {
    USB_LP => stm32_usb::InterruptHandler<peripherals::USB>;
});

fn shared() -> Shared {
    SharedDevice::new(&DEVICE)
}

/// Fan timer end-of-period interrupt: apply pending output enables
#[interrupt]
fn TIM3() {
    shared().on_period_boundary();
}

/// Fan 1 tachometer edge
#[interrupt]
fn EXTI0() {
    tach_edge(Channel::One);
}

/// Fan 2 tachometer edge
#[interrupt]
fn EXTI1() {
    tach_edge(Channel::Two);
}

fn tach_edge(channel: Channel) {
    exti::clear_edge(channel);
    TACH.on_edge(channel, EmbassyClock.now_micros());
}

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // A bootloader request from the previous boot wins over everything else
    enter_requested_bootloader();

    info!("USB PWM fan controller v{}", env!("CARGO_PKG_VERSION"));

    // HSI16 system clock, HSI48 trimmed from USB SOF for the USB peripheral
    let mut config = embassy_stm32::Config::default();
    {
        use embassy_stm32::rcc::{mux, Hsi48Config};
        config.rcc.hsi48 = Some(Hsi48Config {
            sync_from_usb: true,
        });
        config.rcc.mux.clk48sel = mux::Clk48sel::HSI48;
    }
    let p = embassy_stm32::init(config);

    let mut wdg = IndependentWatchdog::new(p.IWDG, WATCHDOG_TIMEOUT_US);
    wdg.unleash();

    info!("Peripherals initialized");

    // Fan PWM timer, driven at register level
    let _claimed = (p.TIM3, p.PA6, p.PA4);
    enable_fan_timer();
    let timer = Stm32PwmTimer::new(pac::TIM3);

    let mut uid = [0u8; UNIQUE_ID_BYTES];
    uid.copy_from_slice(&embassy_stm32::uid::uid()[..UNIQUE_ID_BYTES]);

    let storage = FlashConfigStorage::new(Flash::new_blocking(p.FLASH));
    let device = FanDevice::new(timer, storage, &TACH, &uid);
    info!("Config: {}", device.config());
    shared().install(device);

    // SAFETY: the handler only reaches the device through a critical section
    unsafe { interrupt::TIM3.enable() };

    // Tachometer inputs, open collector
    let _tach1 = Input::new(p.PB0, Pull::Up);
    let _tach2 = Input::new(p.PB1, Pull::Up);
    exti::enable_tach_edges();
    // SAFETY: the handlers only touch the tachometer cells, under a critical section
    unsafe {
        interrupt::EXTI0.enable();
        interrupt::EXTI1.enable();
    }

    // USB device with vendor register interface and CDC console
    static NAME: StaticCell<[u8; SHORT_NAME_LEN]> = StaticCell::new();
    let name = NAME.init(short_name(&uid));
    let strings = UsbStrings::with_short_name(name);
    let info = UsbDeviceInfo::default();
    info!("{} serial {}", info, strings.serial);

    let driver = Driver::new(p.USB, Irqs, p.PA12, p.PA11);
    let mut usb_config = embassy_usb::Config::new(info.vid, info.pid);
    usb_config.manufacturer = Some(strings.manufacturer);
    usb_config.product = Some(strings.product);
    usb_config.serial_number = Some(strings.serial);
    usb_config.device_release = info.device_release;
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    static CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    let mut builder = Builder::new(
        driver,
        usb_config,
        CONFIG_DESC.init([0; 256]),
        BOS_DESC.init([0; 256]),
        &mut [], // no MS OS descriptors
        CONTROL_BUF.init([0; 64]),
    );

    let mut function = builder.function(USB_VENDOR_CLASS, USB_VENDOR_SUBCLASS, USB_VENDOR_PROTOCOL);
    let mut interface = function.interface();
    let interface_number = interface.interface_number();
    interface.alt_setting(USB_VENDOR_CLASS, USB_VENDOR_SUBCLASS, USB_VENDOR_PROTOCOL, None);
    drop(function);

    static VENDOR: StaticCell<VendorHandler<Shared, EmbassyClock>> = StaticCell::new();
    builder.handler(VENDOR.init(VendorHandler::new(
        shared(),
        EmbassyClock,
        interface_number,
        &REBOOT,
    )));

    static CDC_STATE: StaticCell<State> = StaticCell::new();
    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), USB_CDC_PACKET_SIZE);

    let usb = builder.build();
    unwrap!(spawner.spawn(usb_task(usb)));
    unwrap!(spawner.spawn(console_task(class)));
    unwrap!(spawner.spawn(reboot_task()));

    info!("Tasks spawned, entering main loop");

    let mut led = LedPin::new(Output::new(p.PA5, Level::Low, Speed::Low), false);
    let mut status = StatusLed::new();
    let clock = EmbassyClock;
    let device = shared();
    loop {
        let stalled = device.check_stall(clock.now_micros());
        led.set(status.update(device.led_mode(), stalled, clock.now_millis()));
        wdg.pet();
        Timer::after(Duration::from_millis(5)).await;
    }
}

/// Turn on the TIM3 clock and route CH1/CH2 to the fan pins (AF2)
fn enable_fan_timer() {
    use pac::gpio::vals::Moder;

    pac::RCC.apb1enr1().modify(|w| w.set_tim3en(true));
    for pin in [4, 6] {
        pac::GPIOA.afr(0).modify(|w| w.set_afr(pin, 2));
        pac::GPIOA.moder().modify(|w| w.set_moder(pin, Moder::ALTERNATE));
    }
}

/// USB device state machine
#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}

/// Serial console on the CDC ACM interface
#[embassy_executor::task]
async fn console_task(mut class: CdcAcmClass<'static, UsbDriver>) {
    let mut parser = CommandParser::new();
    let mut out = CdcWriteBuffer::new();
    loop {
        class.wait_connection().await;
        info!("Console connected");
        if let Err(e) = serve_console(&mut class, &mut parser, &mut out).await {
            warn!("Console closed: {}", e);
        }
        out.clear();
    }
}

async fn serve_console(
    class: &mut CdcAcmClass<'static, UsbDriver>,
    parser: &mut CommandParser,
    out: &mut CdcWriteBuffer,
) -> Result<(), EndpointError> {
    let clock = EmbassyClock;
    let mut device = shared();
    let mut packet = [0u8; USB_CDC_PACKET_SIZE as usize];
    loop {
        let n = class.read_packet(&mut packet).await?;
        for &byte in &packet[..n] {
            let action = parser.feed(byte, &mut device, clock.now_micros(), out);
            if let Some(action) = action {
                flush(class, out).await?;
                REBOOT.signal(action);
            }
            // Leave room for one full response line
            if out.free() < RESPONSE_BUFFER_SIZE {
                flush(class, out).await?;
            }
        }
        flush(class, out).await?;
    }
}

async fn flush(
    class: &mut CdcAcmClass<'static, UsbDriver>,
    out: &mut CdcWriteBuffer,
) -> Result<(), EndpointError> {
    let max = usize::from(class.max_packet_size());
    for chunk in out.as_bytes().chunks(max) {
        class.write_packet(chunk).await?;
    }
    if !out.is_empty() && out.len() % max == 0 {
        // Terminate a transfer that ended on a packet boundary
        class.write_packet(&[]).await?;
    }
    out.clear();
    Ok(())
}

/// Carry out reboot requests once the request has been answered
#[embassy_executor::task]
async fn reboot_task() {
    let action = REBOOT.wait().await;
    // Let the control transfer status stage or console reply go out
    Timer::after(Duration::from_millis(50)).await;
    CortexMSystem.enter(action)
}
