//! USB composite device: HID keyboard/consumer + CDC-ACM console.
//!
//! Initialises the Embassy USB stack on the nRF52840 USBD peripheral.
//! VBUS comes from the SoftDevice's power events (see `ble::server`),
//! so the driver uses `SoftwareVbusDetect`.
//!
//! The scheduler side only sees [`ChannelSink`] and [`ConsoleLink`];
//! the tasks here move bytes between those queues and the endpoints.

use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{debug, info, warn};
use embassy_nrf::usb::vbus_detect::SoftwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_nrf::{self, bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::pipe::Pipe;
use embassy_usb::class::cdc_acm::{self, CdcAcmClass};
use embassy_usb::class::hid::{Config as HidConfig, HidWriter, State};
use embassy_usb::{Builder, Config, UsbDevice};
use heapless::Vec;
use static_cell::StaticCell;

use super::ReportSink;
use crate::config;
use crate::error::{Error, TransportError};
use crate::hid::{HID_REPORT_MAP, MAX_REPORT_SIZE};
use crate::uart::{queue_whole, SerialLink};

bind_interrupts!(struct Irqs {
    USBD => embassy_nrf::usb::InterruptHandler<peripherals::USBD>;
});

pub type UsbDriver = Driver<'static, peripherals::USBD, &'static SoftwareVbusDetect>;

/// HID endpoint packet size; every report fits in one packet.
pub const HID_PACKET_SIZE: usize = 16;
const CDC_PACKET_SIZE: u16 = 64;
const REPORT_QUEUE_DEPTH: usize = 16;
const CONSOLE_RX_SIZE: usize = 512;
const CONSOLE_TX_SIZE: usize = 2048;

type Frame = Vec<u8, MAX_REPORT_SIZE>;

static REPORTS: Channel<CriticalSectionRawMutex, Frame, REPORT_QUEUE_DEPTH> = Channel::new();
static CONSOLE_RX: Pipe<CriticalSectionRawMutex, CONSOLE_RX_SIZE> = Pipe::new();
static CONSOLE_TX: Pipe<CriticalSectionRawMutex, CONSOLE_TX_SIZE> = Pipe::new();

/// Host has selected a configuration.
static CONFIGURED: AtomicBool = AtomicBool::new(false);
/// The CDC endpoints are enabled.
static CONSOLE_OPEN: AtomicBool = AtomicBool::new(false);

static HID_STATE: StaticCell<State> = StaticCell::new();
static CDC_STATE: StaticCell<cdc_acm::State> = StaticCell::new();
static USB_CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
static USB_CTRL_BUF: StaticCell<[u8; 128]> = StaticCell::new();
static USB_HANDLER: StaticCell<UsbStateHandler> = StaticCell::new();

struct UsbStateHandler;

impl embassy_usb::Handler for UsbStateHandler {
    fn reset(&mut self) {
        CONFIGURED.store(false, Ordering::Release);
    }

    fn configured(&mut self, configured: bool) {
        info!("usb: configured = {}", configured);
        CONFIGURED.store(configured, Ordering::Release);
    }

    fn suspended(&mut self, suspended: bool) {
        debug!("usb: suspended = {}", suspended);
    }
}

/// Scheduler-side handle to the HID report queue.
pub struct ChannelSink;

impl ReportSink for ChannelSink {
    fn is_ready(&self) -> bool {
        CONFIGURED.load(Ordering::Acquire)
    }

    fn try_send(&mut self, report: &[u8]) -> Result<(), TransportError> {
        let frame = Frame::from_slice(report).map_err(|_| TransportError::Raw(report.len() as u32))?;
        REPORTS.try_send(frame).map_err(|_| TransportError::Busy)
    }
}

/// Scheduler-side handle to the CDC console.
pub struct ConsoleLink;

impl SerialLink for ConsoleLink {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        CONSOLE_RX.try_read(buf).unwrap_or(0)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), Error> {
        // Nobody listening: drop rather than fill the pipe with stale lines.
        if !CONSOLE_OPEN.load(Ordering::Acquire) {
            return Ok(());
        }
        let free = CONSOLE_TX.free_capacity();
        if queue_whole(data, free, |chunk| CONSOLE_TX.try_write(chunk).unwrap_or(0)) {
            Ok(())
        } else {
            Err(Error::BufferOverflow)
        }
    }
}

/// Everything the USB tasks need.
pub struct UsbParts {
    pub device: UsbDevice<'static, UsbDriver>,
    pub hid: HidWriter<'static, UsbDriver, HID_PACKET_SIZE>,
    pub console: CdcAcmClass<'static, UsbDriver>,
}

/// Build the composite device. Must be called exactly once.
pub fn init(usbd: peripherals::USBD, vbus: &'static SoftwareVbusDetect) -> UsbParts {
    let driver = Driver::new(usbd, Irqs, vbus);

    let mut usb_config = Config::new(config::USB_VID, config::USB_PID);
    usb_config.manufacturer = Some(config::USB_MANUFACTURER);
    usb_config.product = Some(config::USB_PRODUCT);
    usb_config.serial_number = Some(config::USB_SERIAL_NUMBER);
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;
    // CDC needs an interface association descriptor.
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    let mut builder = Builder::new(
        driver,
        usb_config,
        USB_CONFIG_DESC.init([0u8; 256]),
        USB_BOS_DESC.init([0u8; 256]),
        USB_MSOS_DESC.init([0u8; 256]),
        USB_CTRL_BUF.init([0u8; 128]),
    );
    builder.handler(USB_HANDLER.init(UsbStateHandler));

    let hid_config = HidConfig {
        report_descriptor: HID_REPORT_MAP,
        request_handler: None,
        poll_ms: config::USB_HID_POLL_MS,
        max_packet_size: HID_PACKET_SIZE as u16,
    };
    let hid = HidWriter::new(&mut builder, HID_STATE.init(State::new()), hid_config);

    let console = CdcAcmClass::new(&mut builder, CDC_STATE.init(cdc_acm::State::new()), CDC_PACKET_SIZE);

    let device = builder.build();
    info!("usb: composite device initialised (hid + cdc)");

    UsbParts { device, hid, console }
}

/// Run the USB device stack - spawn as a dedicated task.
pub async fn run_usb_device(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    device.run().await
}

/// Drain the report queue into the HID IN endpoint.
pub async fn hid_writer_task(mut hid: HidWriter<'static, UsbDriver, HID_PACKET_SIZE>) -> ! {
    loop {
        let frame = REPORTS.receive().await;
        if hid.write(&frame).await.is_err() {
            warn!("usb: hid write failed");
        }
    }
}

/// Shuttle bytes between the CDC endpoints and the console pipes.
pub async fn console_task(class: CdcAcmClass<'static, UsbDriver>) -> ! {
    let (mut tx, mut rx) = class.split();
    let mut rx_buf = [0u8; CDC_PACKET_SIZE as usize];
    // One byte short of a full packet so no zero-length terminator is needed.
    let mut tx_buf = [0u8; CDC_PACKET_SIZE as usize - 1];

    loop {
        rx.wait_connection().await;
        CONSOLE_OPEN.store(true, Ordering::Release);
        info!("usb: console opened");

        let inbound = async {
            loop {
                match rx.read_packet(&mut rx_buf).await {
                    Ok(n) => CONSOLE_RX.write_all(&rx_buf[..n]).await,
                    Err(_) => break,
                }
            }
        };
        let outbound = async {
            loop {
                let n = CONSOLE_TX.read(&mut tx_buf).await;
                if tx.write_packet(&tx_buf[..n]).await.is_err() {
                    break;
                }
            }
        };
        embassy_futures::select::select(inbound, outbound).await;

        CONSOLE_OPEN.store(false, Ordering::Release);
        CONSOLE_TX.clear();
        info!("usb: console closed");
    }
}
