//! Nordic SoftDevice binding for the BLE peripheral.
//!
//! Registers the HID and serial services, runs advertising and one
//! GATT server task per connection. Those tasks never touch runtime
//! state: connects, disconnects and serial writes are pushed into
//! [`BLE_EVENTS`] for the scheduler, and the scheduler talks back
//! through [`SdRadio`].

use core::cell::RefCell;
use core::mem;

use defmt::{debug, info, warn};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::usb::vbus_detect::SoftwareVbusDetect;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Timer;
use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, NotifyValueError, RegisterError, SetValueError, WriteOp};
use nrf_softdevice::ble::peripheral::{self, ConnectableAdvertisement};
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{Connection, EncryptionInfo, IdentityKey, MasterId, SecurityMode, Uuid};
use nrf_softdevice::{raw, RawError, SocEvent, Softdevice};

use super::advertise::AdvPayload;
use super::gatt::{
    Characteristic, HidCharacteristic, HID_INFORMATION, HID_SERVICE_UUID16, INPUT_REPORT_REFERENCE,
    PROTOCOL_MODE_REPORT, REPORT_REFERENCE_UUID16, SERIAL_CHAR_UUID128, SERIAL_SERVICE_UUID128,
};
use super::peripheral::GattRadio;
use super::{BleEvent, ConnHandle, BLE_EVENT_QUEUE_DEPTH};
use crate::config::{
    BLE_ADVERTISE_RESTART_MS, BLE_ADV_INTERVAL, BLE_DEVICE_NAME, BLE_MAX_CONNECTIONS,
    BLE_SERIAL_MAX_WRITE,
};
use crate::error::TransportError;
use crate::hid::{HID_REPORT_MAP, MAX_REPORT_SIZE};

/// Stack-to-scheduler queue, drained once per tick.
pub static BLE_EVENTS: Channel<CriticalSectionRawMutex, BleEvent, BLE_EVENT_QUEUE_DEPTH> =
    Channel::new();

/// Latest advertising request; a newer one replaces a pending one.
static ADVERTISE: Signal<CriticalSectionRawMutex, AdvRequest> = Signal::new();

/// Remembered bonds; lost on reset.
const MAX_BONDS: usize = 4;

struct AdvRequest {
    adv: AdvPayload,
    scan: AdvPayload,
}

/// SoftDevice configuration for a peripheral-only device.
pub fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: BLE_MAX_CONNECTIONS as u8,
            event_length: 24,
        }),
        // Room for a full serial write in one ATT payload.
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: BLE_SERIAL_MAX_WRITE as u16 + 3,
        }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: BLE_MAX_CONNECTIONS as u8,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: BLE_DEVICE_NAME.as_ptr() as _,
            current_len: BLE_DEVICE_NAME.len() as u16,
            max_len: BLE_DEVICE_NAME.len() as u16,
            write_perm: unsafe { mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        conn_gatts: Some(raw::ble_gatts_conn_cfg_t {
            hvn_tx_queue_size: 4,
        }),
        ..Default::default()
    }
}

/// HID-over-GATT: one input report carrying both report IDs.
struct HidService {
    input_report: u16,
    protocol_mode: u16,
    control_point: u16,
}

impl HidService {
    fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let mut service = ServiceBuilder::new(sd, Uuid::new_16(HID_SERVICE_UUID16))?;

        service
            .add_characteristic(
                Uuid::new_16(HidCharacteristic::HidInformation.uuid16()),
                Attribute::new(HID_INFORMATION).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read()),
            )?
            .build();

        service
            .add_characteristic(
                Uuid::new_16(HidCharacteristic::ReportMap.uuid16()),
                Attribute::new(HID_REPORT_MAP).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read()),
            )?
            .build();

        let control_point = service
            .add_characteristic(
                Uuid::new_16(HidCharacteristic::HidControlPoint.uuid16()),
                Attribute::new([0u8]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().write_without_response()),
            )?
            .build();

        let protocol_mode = service
            .add_characteristic(
                Uuid::new_16(HidCharacteristic::ProtocolMode.uuid16()),
                Attribute::new([PROTOCOL_MODE_REPORT]).security(SecurityMode::JustWorks),
                Metadata::new(Properties::new().read().write_without_response()),
            )?
            .build();

        let mut input = service.add_characteristic(
            Uuid::new_16(HidCharacteristic::Report.uuid16()),
            Attribute::new([0u8; MAX_REPORT_SIZE])
                .variable_len(MAX_REPORT_SIZE as u16)
                .security(SecurityMode::JustWorks),
            Metadata::new(Properties::new().read().notify()),
        )?;
        input.add_descriptor(
            Uuid::new_16(REPORT_REFERENCE_UUID16),
            Attribute::new(INPUT_REPORT_REFERENCE).security(SecurityMode::JustWorks),
        )?;
        let input = input.build();

        service.build();

        Ok(Self {
            input_report: input.value_handle,
            protocol_mode: protocol_mode.value_handle,
            control_point: control_point.value_handle,
        })
    }
}

/// Vendor serial service: one read/write/notify characteristic.
struct SerialService {
    value: u16,
}

impl SerialService {
    fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let mut service = ServiceBuilder::new(sd, Uuid::new_128(&SERIAL_SERVICE_UUID128))?;
        let value = service
            .add_characteristic(
                Uuid::new_128(&SERIAL_CHAR_UUID128),
                Attribute::new([0u8; BLE_SERIAL_MAX_WRITE]).variable_len(BLE_SERIAL_MAX_WRITE as u16),
                Metadata::new(
                    Properties::new()
                        .read()
                        .write()
                        .write_without_response()
                        .notify(),
                ),
            )?
            .build();
        service.build();
        Ok(Self {
            value: value.value_handle,
        })
    }
}

pub struct MacropadServer {
    hid: HidService,
    serial: SerialService,
}

impl MacropadServer {
    pub fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let hid = HidService::new(sd)?;
        let serial = SerialService::new(sd)?;
        info!("ble: gatt services registered");
        Ok(Self { hid, serial })
    }

    fn value_handle(&self, characteristic: Characteristic) -> u16 {
        match characteristic {
            Characteristic::InputReport => self.hid.input_report,
            Characteristic::Serial => self.serial.value,
        }
    }
}

impl gatt_server::Server for MacropadServer {
    type Event = ();

    fn on_write(
        &self,
        conn: &Connection,
        handle: u16,
        _op: WriteOp,
        _offset: usize,
        data: &[u8],
    ) -> Option<Self::Event> {
        if handle == self.serial.value {
            let Some(conn_handle) = conn.handle() else {
                return None;
            };
            if BLE_EVENTS.try_send(BleEvent::serial_write(conn_handle, data)).is_err() {
                warn!("ble: event queue full, serial write dropped");
            }
        } else if handle == self.hid.protocol_mode {
            debug!("ble: protocol mode write {:?}", data);
        } else if handle == self.hid.control_point {
            debug!("ble: hid control point {:?}", data);
        }
        None
    }
}

#[derive(Clone, Copy)]
struct Bond {
    master_id: MasterId,
    key: EncryptionInfo,
    peer: IdentityKey,
}

/// Just Works pairing with bonds kept in RAM.
pub struct Bonder {
    bonds: RefCell<heapless::Vec<Bond, MAX_BONDS>>,
}

impl Default for Bonder {
    fn default() -> Self {
        Self {
            bonds: RefCell::new(heapless::Vec::new()),
        }
    }
}

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        IoCapabilities::None
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        true
    }

    fn display_passkey(&self, passkey: &[u8; 6]) {
        info!("ble: passkey {:?}", passkey);
    }

    fn on_security_update(&self, _conn: &Connection, security_mode: SecurityMode) {
        info!("ble: security mode {:?}", security_mode);
    }

    fn on_bonded(&self, _conn: &Connection, master_id: MasterId, key: EncryptionInfo, peer: IdentityKey) {
        let mut bonds = self.bonds.borrow_mut();
        bonds.retain(|b| b.peer.addr != peer.addr);
        if bonds.is_full() {
            bonds.remove(0);
        }
        let _ = bonds.push(Bond {
            master_id,
            key,
            peer,
        });
        info!("ble: bonded, {} bonds held", bonds.len());
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        self.bonds
            .borrow()
            .iter()
            .find(|b| b.master_id == master_id)
            .map(|b| b.key)
    }
}

fn notify_error(e: NotifyValueError) -> TransportError {
    match e {
        NotifyValueError::Disconnected => TransportError::Disconnected,
        NotifyValueError::Raw(RawError::BleInvalidConnHandle) => TransportError::InvalidHandle,
        NotifyValueError::Raw(RawError::Busy | RawError::Resources) => TransportError::Busy,
        NotifyValueError::Raw(raw) => TransportError::Raw(raw as u32),
    }
}

fn set_value_error(e: SetValueError) -> TransportError {
    match e {
        SetValueError::Raw(raw) => TransportError::Raw(raw as u32),
    }
}

/// [`GattRadio`] backed by the SoftDevice.
pub struct SdRadio {
    sd: &'static Softdevice,
    server: &'static MacropadServer,
}

impl SdRadio {
    pub fn new(sd: &'static Softdevice, server: &'static MacropadServer) -> Self {
        Self { sd, server }
    }
}

impl GattRadio for SdRadio {
    fn set_value(&mut self, characteristic: Characteristic, value: &[u8]) -> Result<(), TransportError> {
        gatt_server::set_value(self.sd, self.server.value_handle(characteristic), value)
            .map_err(set_value_error)
    }

    fn notify(
        &mut self,
        conn: ConnHandle,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<(), TransportError> {
        let conn = Connection::from_handle(conn).ok_or(TransportError::Disconnected)?;
        gatt_server::notify_value(&conn, self.server.value_handle(characteristic), value)
            .map_err(notify_error)
    }

    fn advertise(&mut self, adv_data: &[u8], scan_data: &[u8]) -> Result<(), TransportError> {
        let adv = AdvPayload::from_slice(adv_data).map_err(|_| TransportError::Raw(adv_data.len() as u32))?;
        let scan =
            AdvPayload::from_slice(scan_data).map_err(|_| TransportError::Raw(scan_data.len() as u32))?;
        ADVERTISE.signal(AdvRequest { adv, scan });
        Ok(())
    }
}

/// Drive the SoftDevice and feed USB power events to the USB driver.
pub async fn run_softdevice(sd: &'static Softdevice, vbus: &'static SoftwareVbusDetect) -> ! {
    unsafe {
        raw::sd_power_usbpwrrdy_enable(1);
        raw::sd_power_usbdetected_enable(1);
        raw::sd_power_usbremoved_enable(1);
    }

    let mut usb_reg: u32 = 0;
    unsafe { raw::sd_power_usbregstatus_get(&mut usb_reg) };
    if usb_reg & 0x1 != 0 {
        vbus.detected(true);
    }
    if usb_reg & 0x2 != 0 {
        vbus.ready();
    }

    sd.run_with_callback(|event: SocEvent| match event {
        SocEvent::PowerUsbRemoved => vbus.detected(false),
        SocEvent::PowerUsbDetected => vbus.detected(true),
        SocEvent::PowerUsbPowerReady => vbus.ready(),
        _ => {}
    })
    .await
}

/// Advertise whenever the scheduler asks; hand each new link to a
/// connection task.
#[embassy_executor::task]
pub async fn advertise_task(
    spawner: Spawner,
    sd: &'static Softdevice,
    server: &'static MacropadServer,
    bonder: &'static Bonder,
) -> ! {
    let mut request = ADVERTISE.wait().await;
    loop {
        let mut config = peripheral::Config::default();
        config.interval = BLE_ADV_INTERVAL;

        let outcome = {
            let adv = ConnectableAdvertisement::ScannableUndirected {
                adv_data: &request.adv,
                scan_data: &request.scan,
            };
            select(
                peripheral::advertise_pairable(sd, adv, &config, bonder),
                ADVERTISE.wait(),
            )
            .await
        };

        match outcome {
            Either::First(Ok(conn)) => {
                if spawner.spawn(connection_task(conn, server)).is_err() {
                    warn!("ble: no free connection task, dropping link");
                }
                request = ADVERTISE.wait().await;
            }
            Either::First(Err(e)) => {
                warn!("ble: advertising failed: {:?}", e);
                Timer::after_millis(BLE_ADVERTISE_RESTART_MS as u64).await;
            }
            Either::Second(next) => request = next,
        }
    }
}

// One task per link; the pool matches BLE_MAX_CONNECTIONS.
#[embassy_executor::task(pool_size = 2)]
async fn connection_task(conn: Connection, server: &'static MacropadServer) {
    let Some(handle) = conn.handle() else {
        return;
    };
    BLE_EVENTS.send(BleEvent::Connected { handle }).await;
    let reason = gatt_server::run(&conn, server, |_| {}).await;
    info!("ble: connection {} closed: {:?}", handle, reason);
    BLE_EVENTS.send(BleEvent::Disconnected { handle }).await;
}
