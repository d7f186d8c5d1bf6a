//! SoftDevice Integration
//!
//! Registers the light service with the S140 SoftDevice, turns GATT server
//! callbacks into [`ControllerEvent`]s and implements [`Transport`] on top of
//! the nrf-softdevice high-level APIs.

use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::advertisement_builder::{Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload};
use nrf_softdevice::ble::gatt_server::builder::ServiceBuilder;
use nrf_softdevice::ble::gatt_server::characteristic::{Attribute, Metadata, Properties};
use nrf_softdevice::ble::gatt_server::{self, RegisterError, WriteOp};
use nrf_softdevice::ble::peripheral::{self, ConnectableAdvertisement, NonconnectableAdvertisement};
use nrf_softdevice::ble::{Connection, Uuid};
use nrf_softdevice::{RawError, Softdevice};

use crate::ble::advertising::AdvertisingMode;
use crate::ble::connection::Address;
use crate::ble::events::{self, ControllerEvent};
use crate::ble::services::{char_properties, Characteristic, GattHandles, StatusFlags};
use crate::config::{ADV_INTERVAL, DEVICE_NAME, MAX_CONNECTIONS};
use crate::core::transport::{Transport, TransportError};

/// Device Information service
const DEVICE_INFORMATION_UUID: u16 = 0x180A;
/// System ID characteristic
const SYSTEM_ID_UUID: u16 = 0x2A23;

/// HCI reason reported for every link loss; `gatt_server::run` does not
/// expose the real one.
const REMOTE_USER_TERMINATED: u8 = 0x13;

/// Advertising requests from the transport to the advertising task
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum AdvertisingCommand {
    Start(AdvertisingMode),
    Stop,
}

static ADVERTISING: Signal<CriticalSectionRawMutex, AdvertisingCommand> = Signal::new();

/// GATT server for the light service
pub struct LightServer {
    handles: GattHandles,
    /// CCCD attribute ids, indexed like `Characteristic::ALL`
    cccd_handles: [u16; Characteristic::COUNT],
    system_id_handle: u16,
}

impl LightServer {
    /// Register the light service and the System ID characteristic.
    pub fn register(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        let mut sb = ServiceBuilder::new(sd, Uuid::new_128(&crate::ble::services::LIGHT_SERVICE_UUID))?;

        let mut value_handles = [0u16; Characteristic::COUNT];
        let mut cccd_handles = [0u16; Characteristic::COUNT];
        for characteristic in Characteristic::ALL {
            let initial = [0u8; 6];
            let attr = Attribute::new(&initial[..characteristic.payload_len()]);
            let metadata = Metadata::new(properties(characteristic.properties()));
            let handles = sb
                .add_characteristic(Uuid::new_128(&characteristic.uuid()), attr, metadata)?
                .build();

            debug!(
                "GATT: {:?} value_handle {} cccd_handle {}",
                characteristic, handles.value_handle, handles.cccd_handle
            );
            value_handles[characteristic.index()] = handles.value_handle;
            cccd_handles[characteristic.index()] = handles.cccd_handle;
        }
        sb.build();

        let mut sb = ServiceBuilder::new(sd, Uuid::new_16(DEVICE_INFORMATION_UUID))?;
        let system_id = sb
            .add_characteristic(
                Uuid::new_16(SYSTEM_ID_UUID),
                Attribute::new([0u8; 8]),
                Metadata::new(Properties::new().read()),
            )?
            .build();
        sb.build();

        info!("GATT: Light service registered");
        Ok(Self {
            handles: GattHandles {
                light_state: value_handles[0],
                trigger_source: value_handles[1],
                source_address: value_handles[2],
            },
            cccd_handles,
            system_id_handle: system_id.value_handle,
        })
    }

    pub fn handles(&self) -> GattHandles {
        self.handles
    }

    pub fn system_id_handle(&self) -> u16 {
        self.system_id_handle
    }

    fn characteristic_for_cccd(&self, handle: u16) -> Option<Characteristic> {
        Characteristic::ALL
            .into_iter()
            .find(|characteristic| self.cccd_handles[characteristic.index()] == handle)
    }
}

fn properties(flags: u8) -> Properties {
    let mut props = Properties::new();
    if flags & char_properties::READ != 0 {
        props = props.read();
    }
    if flags & char_properties::WRITE != 0 {
        props = props.write();
    }
    if flags & char_properties::NOTIFY != 0 {
        props = props.notify();
    }
    if flags & char_properties::INDICATE != 0 {
        props = props.indicate();
    }
    props
}

impl gatt_server::Server for LightServer {
    type Event = ControllerEvent;

    fn on_write(&self, conn: &Connection, handle: u16, _op: WriteOp, _offset: usize, data: &[u8]) -> Option<Self::Event> {
        let conn_handle = conn.handle()?;

        if let Some(characteristic) = self.characteristic_for_cccd(handle) {
            let client_config = match data {
                [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
                [lo] => u16::from(*lo),
                [] => return None,
            };
            return Some(ControllerEvent::CharacteristicStatus {
                handle: conn_handle,
                attribute: self.handles.attribute(characteristic),
                status_flags: StatusFlags::ClientConfig as u8,
                client_config,
            });
        }

        match events::create_characteristic_write_event(conn_handle, handle, data) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("GATT: Dropping write on {}: {:?}", handle, e);
                None
            }
        }
    }

    fn on_indicate_confirm(&self, conn: &Connection, handle: u16) {
        let Some(conn_handle) = conn.handle() else {
            return;
        };
        let _ = events::post_event(ControllerEvent::CharacteristicStatus {
            handle: conn_handle,
            attribute: handle,
            status_flags: StatusFlags::Confirmation as u8,
            client_config: 0,
        });
    }
}

/// [`Transport`] backed by the SoftDevice
pub struct SoftdeviceTransport {
    sd: &'static Softdevice,
    handles: GattHandles,
    system_id_handle: u16,
}

impl SoftdeviceTransport {
    pub fn new(sd: &'static Softdevice, server: &LightServer) -> Self {
        Self {
            sd,
            handles: server.handles(),
            system_id_handle: server.system_id_handle(),
        }
    }

    fn connection(handle: u16) -> Result<Connection, TransportError> {
        Connection::from_handle(handle).ok_or(TransportError::NotConnected)
    }

    fn set_value(&self, attribute: u16, data: &[u8]) -> Result<(), TransportError> {
        gatt_server::set_value(self.sd, attribute, data).map_err(|e| match e {
            gatt_server::SetValueError::Raw(raw) => raw_error(raw),
        })
    }
}

fn raw_error(raw: RawError) -> TransportError {
    match raw {
        RawError::Busy => TransportError::Busy,
        RawError::DataSize | RawError::InvalidLength => TransportError::DataTooLarge,
        other => TransportError::Status(other as u32),
    }
}

impl Transport for SoftdeviceTransport {
    fn send_indication(&mut self, handle: u16, characteristic: Characteristic, data: &[u8]) -> Result<(), TransportError> {
        let conn = Self::connection(handle)?;
        gatt_server::indicate_value(&conn, self.handles.attribute(characteristic), data).map_err(|e| match e {
            gatt_server::IndicateValueError::Disconnected => TransportError::NotConnected,
            gatt_server::IndicateValueError::Raw(raw) => raw_error(raw),
        })
    }

    fn send_notification(
        &mut self,
        handle: u16,
        characteristic: Characteristic,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let conn = Self::connection(handle)?;
        gatt_server::notify_value(&conn, self.handles.attribute(characteristic), data).map_err(|e| match e {
            gatt_server::NotifyValueError::Disconnected => TransportError::NotConnected,
            gatt_server::NotifyValueError::Raw(raw) => raw_error(raw),
        })
    }

    /// Reads are served from the attribute table; keep it current.
    fn send_read_response(
        &mut self,
        _handle: u16,
        characteristic: Characteristic,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.set_value(self.handles.attribute(characteristic), data)
    }

    /// The SoftDevice answers non-authorized writes itself.
    fn send_write_response(&mut self, handle: u16, attribute: u16, status: u8) -> Result<(), TransportError> {
        trace!("GATT: Write response {} on {} for {}", status, attribute, handle);
        Ok(())
    }

    fn start_advertising(&mut self, mode: AdvertisingMode) -> Result<(), TransportError> {
        ADVERTISING.signal(AdvertisingCommand::Start(mode));
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), TransportError> {
        ADVERTISING.signal(AdvertisingCommand::Stop);
        Ok(())
    }

    fn write_system_id(&mut self, system_id: &[u8; 8]) -> Result<(), TransportError> {
        self.set_value(self.system_id_handle, system_id)
    }

    fn update_value(&mut self, characteristic: Characteristic, data: &[u8]) -> Result<(), TransportError> {
        self.set_value(self.handles.attribute(characteristic), data)
    }
}

/// Identity address of this device.
pub fn identity_address(sd: &Softdevice) -> Address {
    Address(nrf_softdevice::ble::get_address(sd).bytes())
}

/// Runs whatever advertisement the controller last asked for. A new
/// command drops the running advertisement, which stops it in the stack.
#[embassy_executor::task]
pub async fn advertising_task(sd: &'static Softdevice, server: &'static LightServer, spawner: Spawner) {
    info!("Starting advertising task...");

    static ADV_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
        .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
        .full_name(DEVICE_NAME)
        .build();

    static SCAN_DATA: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new().build();

    let config = peripheral::Config {
        interval: ADV_INTERVAL,
        ..Default::default()
    };

    let mut command = ADVERTISING.wait().await;
    loop {
        let mode = match command {
            AdvertisingCommand::Stop => {
                debug!("ADV: Idle");
                command = ADVERTISING.wait().await;
                continue;
            }
            AdvertisingCommand::Start(mode) => mode,
        };

        command = match mode {
            AdvertisingMode::Connectable => {
                let adv = ConnectableAdvertisement::ScannableUndirected {
                    adv_data: &ADV_DATA,
                    scan_data: &SCAN_DATA,
                };
                match select(peripheral::advertise_connectable(sd, adv, &config), ADVERTISING.wait()).await {
                    Either::First(Ok(conn)) => {
                        if let Err(e) = spawner.spawn(connection_task(conn, server)) {
                            error!("ADV: No connection task available: {:?}", defmt::Debug2Format(&e));
                        }
                        ADVERTISING.wait().await
                    }
                    Either::First(Err(e)) => {
                        error!("ADV: Connectable advertising failed: {:?}", defmt::Debug2Format(&e));
                        ADVERTISING.wait().await
                    }
                    Either::Second(next) => next,
                }
            }
            AdvertisingMode::NonConnectable => {
                let adv = NonconnectableAdvertisement::ScannableUndirected {
                    adv_data: &ADV_DATA,
                    scan_data: &SCAN_DATA,
                };
                match select(peripheral::advertise(sd, adv, &config), ADVERTISING.wait()).await {
                    Either::First(result) => {
                        if let Err(e) = result {
                            error!("ADV: Scannable advertising failed: {:?}", defmt::Debug2Format(&e));
                        }
                        ADVERTISING.wait().await
                    }
                    Either::Second(next) => next,
                }
            }
        };
    }
}

/// Serves GATT on one link and reports its lifetime to the controller.
#[embassy_executor::task(pool_size = MAX_CONNECTIONS)]
pub async fn connection_task(conn: Connection, server: &'static LightServer) {
    let Some(handle) = conn.handle() else {
        return;
    };

    let address = Address(conn.peer_address().bytes());
    events::event_sender()
        .send(ControllerEvent::ConnectionOpened { handle, address })
        .await;

    let reason = gatt_server::run(&conn, server, |event| {
        let _ = events::post_event(event);
    })
    .await;
    debug!("GATT: Connection {} ended: {:?}", handle, defmt::Debug2Format(&reason));

    events::event_sender()
        .send(ControllerEvent::ConnectionClosed {
            handle,
            reason: REMOTE_USER_TERMINATED,
        })
        .await;
}
