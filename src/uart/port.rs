//! UARTE binding for the companion MCU.
//!
//! RX runs with idle-line detection so short telemetry bursts are
//! handed over as soon as the line goes quiet. Both directions go
//! through pipes; [`UartLink`] is the scheduler's non-blocking end.

use defmt::{info, warn};
use embassy_nrf::peripherals::{TIMER1, UARTE0};
use embassy_nrf::uarte::{self, UarteRxWithIdle, UarteTx};
use embassy_nrf::{bind_interrupts, gpio::AnyPin, peripherals, Peripheral};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;

use super::{queue_whole, SerialLink};
use crate::config::UART_BAUD;
use crate::error::Error;

bind_interrupts!(struct Irqs {
    UARTE0 => uarte::InterruptHandler<peripherals::UARTE0>;
});

const RX_PIPE_SIZE: usize = 512;
const TX_PIPE_SIZE: usize = 1024;
const DMA_CHUNK: usize = 64;

static UART_RX: Pipe<CriticalSectionRawMutex, RX_PIPE_SIZE> = Pipe::new();
static UART_TX: Pipe<CriticalSectionRawMutex, TX_PIPE_SIZE> = Pipe::new();

pub type UartRx = UarteRxWithIdle<'static, UARTE0, TIMER1>;
pub type UartTx = UarteTx<'static, UARTE0>;

/// Scheduler-side end of the companion link.
pub struct UartLink;

impl SerialLink for UartLink {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        UART_RX.try_read(buf).unwrap_or(0)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), Error> {
        // A cut record would desync the companion's parser.
        let free = UART_TX.free_capacity();
        if queue_whole(data, free, |chunk| UART_TX.try_write(chunk).unwrap_or(0)) {
            Ok(())
        } else {
            Err(Error::Uart)
        }
    }
}

/// Configure UARTE0 at the companion baud rate and split it.
pub fn init(
    uarte: UARTE0,
    timer: TIMER1,
    ppi_ch1: impl Peripheral<P = impl embassy_nrf::ppi::ConfigurableChannel> + 'static,
    ppi_ch2: impl Peripheral<P = impl embassy_nrf::ppi::ConfigurableChannel> + 'static,
    rxd: AnyPin,
    txd: AnyPin,
) -> (UartTx, UartRx) {
    let mut config = uarte::Config::default();
    config.parity = uarte::Parity::EXCLUDED;
    config.baudrate = match UART_BAUD {
        9_600 => uarte::Baudrate::BAUD9600,
        57_600 => uarte::Baudrate::BAUD57600,
        _ => uarte::Baudrate::BAUD115200,
    };

    let uart = uarte::Uarte::new(uarte, Irqs, rxd, txd, config);
    let (tx, rx) = uart.split_with_idle(timer, ppi_ch1, ppi_ch2);
    info!("uart: companion link at {} baud", UART_BAUD);
    (tx, rx)
}

pub async fn rx_task(mut rx: UartRx) -> ! {
    let mut buf = [0u8; DMA_CHUNK];
    loop {
        match rx.read_until_idle(&mut buf).await {
            Ok(n) => UART_RX.write_all(&buf[..n]).await,
            Err(e) => warn!("uart: rx error {:?}", e),
        }
    }
}

pub async fn tx_task(mut tx: UartTx) -> ! {
    // EasyDMA reads from RAM only; stage every chunk here.
    let mut buf = [0u8; DMA_CHUNK];
    loop {
        let n = UART_TX.read(&mut buf).await;
        if let Err(e) = tx.write(&buf[..n]).await {
            warn!("uart: tx error {:?}", e);
        }
    }
}
