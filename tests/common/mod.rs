//! Common test utilities shared by the integration tests
//!
//! - a recording [`MockTransport`] with failure injection
//! - a [`Harness`] driving an `IndicationController` with explicit time
//! - logger setup
#![allow(dead_code)]

use embassy_time::{Duration, Instant};
use light_indicator::ble::advertising::AdvertisingMode;
use light_indicator::ble::connection::Address;
use light_indicator::ble::events::{create_characteristic_write_event, ControllerEvent};
use light_indicator::ble::services::{Characteristic, GattHandles, StatusFlags};
use light_indicator::ble::subscription::ClientConfig;
use light_indicator::config::IndicationConfig;
use light_indicator::core::timer::TimerEvent;
use light_indicator::core::transport::{Transport, TransportError};
use light_indicator::light::{Light, LightSource, LightState, TriggerSource};
use light_indicator::{Error, IndicationController};

pub const HANDLES: GattHandles = GattHandles {
    light_state: 0x000c,
    trigger_source: 0x000f,
    source_address: 0x0012,
};

pub const PEER_A: Address = Address([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
pub const PEER_B: Address = Address([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]);
pub const PEER_C: Address = Address([0x21, 0x22, 0x23, 0x24, 0x25, 0x26]);

/// Install the test logger once; later calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// One request issued to the stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Indication {
        handle: u16,
        characteristic: Characteristic,
        data: Vec<u8>,
    },
    Notification {
        handle: u16,
        characteristic: Characteristic,
        data: Vec<u8>,
    },
    ReadResponse {
        handle: u16,
        characteristic: Characteristic,
        data: Vec<u8>,
    },
    WriteResponse {
        handle: u16,
        attribute: u16,
        status: u8,
    },
    StartAdvertising(AdvertisingMode),
    StopAdvertising,
    SystemId([u8; 8]),
    UpdateValue {
        characteristic: Characteristic,
        data: Vec<u8>,
    },
}

/// Transport that records every call and can be told to fail
#[derive(Debug, Default)]
pub struct MockTransport {
    pub calls: Vec<Call>,
    pub fail_sends: Option<TransportError>,
    pub fail_advertising: Option<TransportError>,
}

impl MockTransport {
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Indications and notifications in send order, as
    /// `(characteristic, is_indication)`.
    pub fn sent(&self) -> Vec<(Characteristic, bool)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Indication { characteristic, .. } => Some((*characteristic, true)),
                Call::Notification { characteristic, .. } => Some((*characteristic, false)),
                _ => None,
            })
            .collect()
    }

    /// Payload of the last indication or notification of `characteristic`.
    pub fn last_payload(&self, characteristic: Characteristic) -> Option<Vec<u8>> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::Indication { characteristic: c, data, .. } | Call::Notification { characteristic: c, data, .. }
                if *c == characteristic =>
            {
                Some(data.clone())
            }
            _ => None,
        })
    }

    pub fn advertising_starts(&self) -> Vec<AdvertisingMode> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::StartAdvertising(mode) => Some(*mode),
                _ => None,
            })
            .collect()
    }

    fn send(&mut self, call: Call) -> Result<(), TransportError> {
        if let Some(e) = self.fail_sends {
            return Err(e);
        }
        self.calls.push(call);
        Ok(())
    }
}

impl Transport for MockTransport {
    fn send_indication(&mut self, handle: u16, characteristic: Characteristic, data: &[u8]) -> Result<(), TransportError> {
        self.send(Call::Indication {
            handle,
            characteristic,
            data: data.to_vec(),
        })
    }

    fn send_notification(
        &mut self,
        handle: u16,
        characteristic: Characteristic,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.send(Call::Notification {
            handle,
            characteristic,
            data: data.to_vec(),
        })
    }

    fn send_read_response(
        &mut self,
        handle: u16,
        characteristic: Characteristic,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.calls.push(Call::ReadResponse {
            handle,
            characteristic,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn send_write_response(&mut self, handle: u16, attribute: u16, status: u8) -> Result<(), TransportError> {
        self.calls.push(Call::WriteResponse {
            handle,
            attribute,
            status,
        });
        Ok(())
    }

    fn start_advertising(&mut self, mode: AdvertisingMode) -> Result<(), TransportError> {
        if let Some(e) = self.fail_advertising {
            return Err(e);
        }
        self.calls.push(Call::StartAdvertising(mode));
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::StopAdvertising);
        Ok(())
    }

    fn write_system_id(&mut self, system_id: &[u8; 8]) -> Result<(), TransportError> {
        self.calls.push(Call::SystemId(*system_id));
        Ok(())
    }

    fn update_value(&mut self, characteristic: Characteristic, data: &[u8]) -> Result<(), TransportError> {
        self.calls.push(Call::UpdateValue {
            characteristic,
            data: data.to_vec(),
        });
        Ok(())
    }
}

/// Controller plus its collaborators, driven with explicit time
pub struct Harness {
    pub controller: IndicationController,
    pub transport: MockTransport,
    pub light: Light,
    pub now: Instant,
}

impl Harness {
    pub fn new() -> Self {
        init_logger();
        Self {
            controller: IndicationController::new(HANDLES, IndicationConfig::default()),
            transport: MockTransport::default(),
            light: Light::new(),
            now: at(0),
        }
    }

    /// Booted controller with an empty call log.
    pub fn booted() -> Self {
        let mut harness = Self::new();
        harness
            .dispatch(ControllerEvent::Boot {
                identity_address: PEER_C,
            })
            .unwrap();
        harness.transport.clear();
        harness
    }

    /// Booted controller with `handle` connected and every characteristic
    /// set to `mode`.
    pub fn subscribed(handle: u16, mode: ClientConfig) -> Self {
        let mut harness = Self::booted();
        harness.connect(handle, PEER_A).unwrap();
        for characteristic in Characteristic::ALL {
            harness.subscribe(handle, characteristic, mode).unwrap();
        }
        harness.transport.clear();
        harness
    }

    pub fn dispatch(&mut self, event: ControllerEvent) -> Result<(), Error> {
        self.controller
            .handle_event(event, self.now, &mut self.transport, &mut self.light)
    }

    pub fn advance(&mut self, ms: u64) {
        self.now += Duration::from_millis(ms);
    }

    pub fn connect(&mut self, handle: u16, address: Address) -> Result<(), Error> {
        self.dispatch(ControllerEvent::ConnectionOpened { handle, address })
    }

    pub fn disconnect(&mut self, handle: u16) -> Result<(), Error> {
        self.dispatch(ControllerEvent::ConnectionClosed { handle, reason: 0x13 })
    }

    pub fn subscribe(&mut self, handle: u16, characteristic: Characteristic, mode: ClientConfig) -> Result<(), Error> {
        self.client_config(handle, characteristic, u16::from(mode))
    }

    /// Client configuration write with a raw wire value.
    pub fn client_config(&mut self, handle: u16, characteristic: Characteristic, value: u16) -> Result<(), Error> {
        self.dispatch(ControllerEvent::CharacteristicStatus {
            handle,
            attribute: HANDLES.attribute(characteristic),
            status_flags: StatusFlags::ClientConfig as u8,
            client_config: value,
        })
    }

    pub fn confirm(&mut self, handle: u16, characteristic: Characteristic) -> Result<(), Error> {
        self.dispatch(ControllerEvent::CharacteristicStatus {
            handle,
            attribute: HANDLES.attribute(characteristic),
            status_flags: StatusFlags::Confirmation as u8,
            client_config: 0,
        })
    }

    pub fn write(&mut self, handle: u16, characteristic: Characteristic, data: &[u8]) -> Result<(), Error> {
        let event = create_characteristic_write_event(handle, HANDLES.attribute(characteristic), data)?;
        self.dispatch(event)
    }

    /// Change the light from the button and report it.
    pub fn change_light(&mut self, state: LightState) -> Result<(), Error> {
        self.light.set_state(TriggerSource::Button, Address::UNKNOWN, state);
        self.dispatch(ControllerEvent::DataChanged)
    }

    /// Move time to the earliest armed deadline and deliver that timer event.
    pub fn fire_next_timer(&mut self) -> Option<(TimerEvent, Result<(), Error>)> {
        let (deadline, kind) = self.controller.next_deadline()?;
        if deadline > self.now {
            self.now = deadline;
        }
        Some((kind, self.dispatch(ControllerEvent::Timer(kind))))
    }
}
