//! Macropad firmware for nRF52840 + S140.
//!
//! Wires the peripherals, spawns the transport tasks and runs the
//! scheduler loop. The SoftDevice runs on a higher-priority interrupt
//! executor so flash operations issued from the scheduler can complete
//! while it blocks.
//!
//! Pin map:
//!   columns  P0.02 P0.29 P0.31 P1.13 (active low)
//!   rows     P0.17 P0.20 P0.22 P0.24 P1.00 (pull-up)
//!   encoder  CLK P0.09, DT P0.10, SW P1.11 (pull-up)
//!   backlight P1.15 (PWM0)
//!   companion UART TX P0.06, RX P0.08

#![no_std]
#![no_main]

extern crate alloc;

use core::mem::MaybeUninit;

use defmt::{error, info, unwrap};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_nrf::gpio::{AnyPin, Input, Level, Output, OutputDrive, Pin, Pull};
use embassy_nrf::interrupt;
use embassy_nrf::interrupt::{InterruptExt, Priority};
use embassy_nrf::peripherals::PWM0;
use embassy_nrf::pwm::SimplePwm;
use embassy_nrf::usb::vbus_detect::SoftwareVbusDetect;
use embassy_time::{Delay, Instant, Timer};
use embassy_usb::class::cdc_acm::CdcAcmClass;
use embassy_usb::class::hid::HidWriter;
use embassy_usb::UsbDevice;
use embedded_alloc::Heap;
use nrf_softdevice::{Flash, Softdevice};
use panic_probe as _;
use static_cell::StaticCell;

use macropad::backlight::PwmDimmer;
use macropad::ble::server::{self, Bonder, MacropadServer, SdRadio, BLE_EVENTS};
use macropad::config::TICK_MS;
use macropad::encoder::Encoder;
use macropad::matrix::Matrix;
use macropad::storage::{FlashLayout, FlashStore};
use macropad::uart::port::{self, UartLink, UartRx, UartTx};
use macropad::usb::hid_device::{self, ChannelSink, ConsoleLink, UsbDriver, HID_PACKET_SIZE};
use macropad::{Parts, Platform, Runtime, TickOutcome};

#[global_allocator]
static HEAP: Heap = Heap::empty();
const HEAP_SIZE: usize = 32 * 1024;

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static VBUS: StaticCell<SoftwareVbusDetect> = StaticCell::new();
static SERVER: StaticCell<MacropadServer> = StaticCell::new();
static BONDER: StaticCell<Bonder> = StaticCell::new();

#[interrupt]
unsafe fn EGU3_SWI3() {
    EXECUTOR_HIGH.on_interrupt()
}

struct Nrf52840;

impl Platform for Nrf52840 {
    type Column = Output<'static>;
    type Row = Input<'static>;
    type Delay = Delay;
    type EncoderPin = Input<'static>;
    type UsbSink = ChannelSink;
    type Radio = SdRadio;
    type Console = ConsoleLink;
    type Uart = UartLink;
    type Store = FlashStore<Flash>;
    type Dimmer = PwmDimmer<PWM0>;
}

fn init_heap() {
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    unsafe { HEAP.init(core::ptr::addr_of_mut!(HEAP_MEM) as usize, HEAP_SIZE) }
}

fn now_ms() -> u32 {
    Instant::now().as_millis() as u32
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice, vbus: &'static SoftwareVbusDetect) -> ! {
    server::run_softdevice(sd, vbus).await
}

#[embassy_executor::task]
async fn usb_task(device: UsbDevice<'static, UsbDriver>) -> ! {
    hid_device::run_usb_device(device).await
}

#[embassy_executor::task]
async fn hid_task(hid: HidWriter<'static, UsbDriver, HID_PACKET_SIZE>) -> ! {
    hid_device::hid_writer_task(hid).await
}

#[embassy_executor::task]
async fn console_task(class: CdcAcmClass<'static, UsbDriver>) -> ! {
    hid_device::console_task(class).await
}

#[embassy_executor::task]
async fn uart_rx_task(rx: UartRx) -> ! {
    port::rx_task(rx).await
}

#[embassy_executor::task]
async fn uart_tx_task(tx: UartTx) -> ! {
    port::tx_task(tx).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    init_heap();
    info!("macropad starting");

    // Priorities 0, 1 and 4 belong to the SoftDevice.
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = Priority::P2;
    nrf_config.time_interrupt_priority = Priority::P2;
    let p = embassy_nrf::init(nrf_config);
    interrupt::USBD.set_priority(Priority::P2);
    interrupt::UARTE0.set_priority(Priority::P3);

    let sd = Softdevice::enable(&server::softdevice_config());
    let ble_server: Option<&'static MacropadServer> = match MacropadServer::new(sd) {
        Ok(s) => Some(SERVER.init(s)),
        Err(e) => {
            error!("ble: service registration failed: {:?}", e);
            None
        }
    };
    let sd: &'static Softdevice = sd;
    let vbus: &'static SoftwareVbusDetect = VBUS.init(SoftwareVbusDetect::new(true, true));

    interrupt::EGU3_SWI3.set_priority(Priority::P5);
    let high = EXECUTOR_HIGH.start(interrupt::EGU3_SWI3);
    unwrap!(high.spawn(softdevice_task(sd, vbus)));

    let usb = hid_device::init(p.USBD, vbus);
    unwrap!(spawner.spawn(usb_task(usb.device)));
    unwrap!(spawner.spawn(hid_task(usb.hid)));
    unwrap!(spawner.spawn(console_task(usb.console)));

    let (uart_tx, uart_rx) = port::init(
        p.UARTE0,
        p.TIMER1,
        p.PPI_CH0,
        p.PPI_CH1,
        p.P0_08.degrade(),
        p.P0_06.degrade(),
    );
    unwrap!(spawner.spawn(uart_rx_task(uart_rx)));
    unwrap!(spawner.spawn(uart_tx_task(uart_tx)));

    let radio = ble_server.map(|server| {
        let bonder = BONDER.init(Bonder::default());
        unwrap!(spawner.spawn(server::advertise_task(spawner, sd, server, bonder)));
        SdRadio::new(sd, server)
    });

    let store = FlashStore::open(Flash::take(sd), FlashLayout::nrf52840());

    let col = |pin: AnyPin| Output::new(pin, Level::High, OutputDrive::Standard);
    let row = |pin: AnyPin| Input::new(pin, Pull::Up);
    let matrix = Matrix::new(
        [
            col(p.P0_02.degrade()),
            col(p.P0_29.degrade()),
            col(p.P0_31.degrade()),
            col(p.P1_13.degrade()),
        ],
        [
            row(p.P0_17.degrade()),
            row(p.P0_20.degrade()),
            row(p.P0_22.degrade()),
            row(p.P0_24.degrade()),
            row(p.P1_00.degrade()),
        ],
        Delay,
    );
    let encoder = Encoder::new(
        Input::new(p.P0_09.degrade(), Pull::Up),
        Input::new(p.P0_10.degrade(), Pull::Up),
        Input::new(p.P1_11.degrade(), Pull::Up),
    );
    let dimmer = PwmDimmer::new(SimplePwm::new_1ch(p.PWM0, p.P1_15));

    let parts = Parts::<Nrf52840> {
        matrix,
        encoder,
        usb: Some(ChannelSink),
        radio,
        console: Some(ConsoleLink),
        uart: Some(UartLink),
        store,
        dimmer,
    };
    let mut runtime = Runtime::new(parts, now_ms());
    info!("scheduler running");

    loop {
        let events = core::iter::from_fn(|| BLE_EVENTS.try_receive().ok());
        if runtime.tick(now_ms(), events) == TickOutcome::Reset {
            cortex_m::peripheral::SCB::sys_reset();
        }
        Timer::after_millis(TICK_MS).await;
    }
}
