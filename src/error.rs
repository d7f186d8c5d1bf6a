//! Unified error type for the light indication controller.
//!
//! All variants carry only fixed-size data so the enum stays `Copy` and
//! cheap to log. None of them is fatal: the dispatcher logs the error and
//! waits for the next event.

use crate::ble::services::Characteristic;
use crate::core::transport::TransportError;

/// Top-level error type used across the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// An event referenced something the GATT schema doesn't define.
    ProtocolViolation(Violation),

    /// The connection table was full when a peer connected. The link stays
    /// up at the radio layer but is never indicated to.
    CapacityExceeded { handle: u16 },

    /// The subscriber did not confirm an indication in time. Only the
    /// in-flight cycle is lost.
    ConfirmationTimeout { characteristic: Characteristic },

    /// The BLE stack rejected a send or advertising request.
    TransportFailure(TransportError),

    /// Timer configuration would let the periodic trigger overlap a pending
    /// confirmation.
    InvalidConfig,
}

/// What exactly was wrong with a peer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Violation {
    /// Attribute id is not one of the light characteristics.
    UnknownCharacteristic(u16),
    /// Client characteristic configuration value outside disabled/notify/indicate.
    InvalidClientConfig(u16),
    /// Status flags were neither a configuration change nor a confirmation.
    UnknownStatusFlags(u8),
    /// Disconnect for a handle that was never tracked.
    UnknownConnection(u16),
    /// Connect for a handle that is already tracked.
    DuplicateConnection(u16),
    /// Write to a characteristic that isn't writable.
    WriteNotPermitted(u16),
    /// Write carried no payload.
    EmptyWrite,
    /// Write payload larger than the event buffer.
    WriteTooLong,
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::TransportFailure(e)
    }
}

impl From<Violation> for Error {
    fn from(v: Violation) -> Self {
        Error::ProtocolViolation(v)
    }
}
