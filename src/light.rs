//! Light Domain Object
//!
//! The on/off state of the light together with who changed it last. The
//! controller only reads it and is told when it changes; toggling it is a
//! plain setter.

use heapless::Vec;

use crate::ble::connection::Address;
use crate::ble::services::Characteristic;

/// Widest characteristic payload (the source address).
pub const MAX_PAYLOAD_LEN: usize = 6;

/// Encoded characteristic value
pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LightState {
    #[default]
    Off = 0,
    On = 1,
}

impl From<u8> for LightState {
    /// Any non-zero value turns the light on.
    fn from(value: u8) -> Self {
        if value != 0 {
            LightState::On
        } else {
            LightState::Off
        }
    }
}

/// Interface that last changed the light
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TriggerSource {
    #[default]
    Button = 0,
    Bluetooth = 1,
    Wifi = 2,
}

impl TryFrom<u8> for TriggerSource {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TriggerSource::Button),
            1 => Ok(TriggerSource::Bluetooth),
            2 => Ok(TriggerSource::Wifi),
            other => Err(other),
        }
    }
}

/// Consistent copy of the light taken at the start of an indication cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LightSnapshot {
    pub state: LightState,
    pub trigger_source: TriggerSource,
    pub trigger_address: Address,
}

impl LightSnapshot {
    /// Wire value of one characteristic: 1 byte state, 1 byte source,
    /// 6 byte address.
    pub fn payload(&self, characteristic: Characteristic) -> Payload {
        let mut payload = Payload::new();
        // capacity covers the widest characteristic, pushes cannot fail
        let _ = match characteristic {
            Characteristic::LightState => payload.push(self.state as u8).map_err(|_| ()),
            Characteristic::TriggerSource => payload.push(self.trigger_source as u8).map_err(|_| ()),
            Characteristic::SourceAddress => payload.extend_from_slice(&self.trigger_address.0).map_err(|_| ()),
        };
        payload
    }
}

/// Read side of the light, as seen by the controller.
pub trait LightSource {
    fn state(&self) -> LightState;

    fn trigger_source(&self) -> TriggerSource;

    fn trigger_address(&self) -> Address;

    /// Change the light on behalf of `trigger`.
    fn set_state(&mut self, trigger: TriggerSource, address: Address, state: LightState);

    fn snapshot(&self) -> LightSnapshot {
        LightSnapshot {
            state: self.state(),
            trigger_source: self.trigger_source(),
            trigger_address: self.trigger_address(),
        }
    }
}

/// The light itself
#[derive(Debug, Default)]
pub struct Light {
    state: LightState,
    trigger_source: TriggerSource,
    trigger_address: Address,
    on_change: Option<fn()>,
}

impl Light {
    pub const fn new() -> Self {
        Self {
            state: LightState::Off,
            trigger_source: TriggerSource::Button,
            trigger_address: Address::UNKNOWN,
            on_change: None,
        }
    }

    /// Register the data-changed callback. Called once at start-up; a second
    /// registration replaces the first.
    pub fn on_change(&mut self, callback: fn()) {
        self.on_change = Some(callback);
    }
}

impl LightSource for Light {
    fn state(&self) -> LightState {
        self.state
    }

    fn trigger_source(&self) -> TriggerSource {
        self.trigger_source
    }

    fn trigger_address(&self) -> Address {
        self.trigger_address
    }

    fn set_state(&mut self, trigger: TriggerSource, address: Address, state: LightState) {
        self.state = state;
        self.trigger_source = trigger;
        self.trigger_address = address;
        info!("LIGHT: {:?} by {:?} ({:?})", state, trigger, address);

        if let Some(callback) = self.on_change {
            callback();
        }
    }
}
