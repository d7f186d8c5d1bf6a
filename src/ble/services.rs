//! Light Service Schema
//!
//! Identity of the three light characteristics, the mapping from the stack's
//! attribute ids to them, and the status flag values the stack reports.

use crate::error::{Error, Violation};

/// Characteristic properties (matches BLE specification)
pub mod char_properties {
    pub const READ: u8 = 0x02;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const INDICATE: u8 = 0x20;
}

/// Light service UUID
pub const LIGHT_SERVICE_UUID: [u8; 16] = [
    0x6b, 0x4f, 0x12, 0x05, 0x2d, 0x0e, 0x5c, 0x9e, 0x4c, 0x47, 0x8b, 0x3a, 0x00, 0x00, 0x2f, 0xbc,
];

/// The characteristics that make up one light change, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Characteristic {
    LightState,
    TriggerSource,
    SourceAddress,
}

impl Characteristic {
    pub const COUNT: usize = 3;

    /// All characteristics in the order a cycle sends them.
    pub const ALL: [Characteristic; Self::COUNT] = [
        Characteristic::LightState,
        Characteristic::TriggerSource,
        Characteristic::SourceAddress,
    ];

    /// Next characteristic in the chain, `None` after the last one.
    pub fn next(self) -> Option<Characteristic> {
        match self {
            Characteristic::LightState => Some(Characteristic::TriggerSource),
            Characteristic::TriggerSource => Some(Characteristic::SourceAddress),
            Characteristic::SourceAddress => None,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Fixed payload width in the attribute database.
    pub fn payload_len(self) -> usize {
        match self {
            Characteristic::LightState => 1,
            Characteristic::TriggerSource => 1,
            Characteristic::SourceAddress => 6,
        }
    }

    /// 128-bit UUID (little endian, vendor base with the 16-bit part at 12..14).
    pub fn uuid(self) -> [u8; 16] {
        let mut uuid = LIGHT_SERVICE_UUID;
        uuid[12] = self.index() as u8 + 1;
        uuid
    }

    /// Characteristic properties as registered with the stack.
    pub fn properties(self) -> u8 {
        use char_properties::*;
        match self {
            Characteristic::LightState => READ | WRITE | NOTIFY | INDICATE,
            _ => READ | NOTIFY | INDICATE,
        }
    }
}

/// Attribute ids the stack assigned to each light characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GattHandles {
    pub light_state: u16,
    pub trigger_source: u16,
    pub source_address: u16,
}

impl GattHandles {
    /// Resolve an attribute id reported by the stack.
    pub fn characteristic(&self, attribute: u16) -> Result<Characteristic, Error> {
        match attribute {
            a if a == self.light_state => Ok(Characteristic::LightState),
            a if a == self.trigger_source => Ok(Characteristic::TriggerSource),
            a if a == self.source_address => Ok(Characteristic::SourceAddress),
            other => Err(Violation::UnknownCharacteristic(other).into()),
        }
    }

    /// Attribute id of a characteristic value.
    pub fn attribute(&self, characteristic: Characteristic) -> u16 {
        match characteristic {
            Characteristic::LightState => self.light_state,
            Characteristic::TriggerSource => self.trigger_source,
            Characteristic::SourceAddress => self.source_address,
        }
    }
}

/// Kind of characteristic status change the stack reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StatusFlags {
    /// The peer wrote the client characteristic configuration
    ClientConfig = 0x01,
    /// The peer confirmed an indication
    Confirmation = 0x02,
}

impl TryFrom<u8> for StatusFlags {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(StatusFlags::ClientConfig),
            0x02 => Ok(StatusFlags::Confirmation),
            other => Err(Violation::UnknownStatusFlags(other).into()),
        }
    }
}
