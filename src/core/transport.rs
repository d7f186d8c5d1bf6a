//! BLE Stack Transport Boundary
//!
//! The controller never talks to the radio directly. Everything it wants the
//! stack to do goes through [`Transport`], and everything the stack reports
//! comes back later as a [`ControllerEvent`](crate::ble::events::ControllerEvent).
//! All calls are fire-and-forget: a returned `Ok` only means the stack
//! accepted the request.

use crate::ble::advertising::AdvertisingMode;
use crate::ble::services::Characteristic;

/// ATT status: success.
pub const ATT_SUCCESS: u8 = 0x00;
/// ATT status: write not permitted.
pub const ATT_WRITE_NOT_PERMITTED: u8 = 0x03;
/// ATT status: invalid attribute value length.
pub const ATT_INVALID_ATTRIBUTE_LENGTH: u8 = 0x0D;

/// Transport errors reported by the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Raw status code returned by the stack
    Status(u32),
    /// The connection handle no longer refers to a live link
    NotConnected,
    /// The stack has no buffer for another packet right now
    Busy,
    /// Payload exceeds what the attribute can hold
    DataTooLarge,
}

/// Requests the controller issues to the BLE stack.
pub trait Transport {
    /// Send a value that the peer must confirm.
    fn send_indication(&mut self, handle: u16, characteristic: Characteristic, data: &[u8])
        -> Result<(), TransportError>;

    /// Send an unconfirmed value.
    fn send_notification(&mut self, handle: u16, characteristic: Characteristic, data: &[u8])
        -> Result<(), TransportError>;

    /// Answer a user read request.
    fn send_read_response(&mut self, handle: u16, characteristic: Characteristic, data: &[u8])
        -> Result<(), TransportError>;

    /// Answer a user write request with an ATT status.
    fn send_write_response(&mut self, handle: u16, attribute: u16, status: u8) -> Result<(), TransportError>;

    fn start_advertising(&mut self, mode: AdvertisingMode) -> Result<(), TransportError>;

    fn stop_advertising(&mut self) -> Result<(), TransportError>;

    /// Store the device information System ID.
    fn write_system_id(&mut self, system_id: &[u8; 8]) -> Result<(), TransportError>;

    /// Refresh the locally stored attribute value.
    ///
    /// Stacks that answer reads from their own attribute table need this to
    /// stay current; stacks that forward every read can keep the default.
    fn update_value(&mut self, _characteristic: Characteristic, _data: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }
}
