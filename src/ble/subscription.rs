//! Client Characteristic Configuration
//!
//! What the subscriber asked for on each light characteristic. One global
//! set of flags: the controller indicates to a single subscriber.

use crate::ble::services::Characteristic;
use crate::error::{Error, Violation};

/// Client characteristic configuration of one characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClientConfig {
    #[default]
    Disabled,
    Notify,
    Indicate,
}

impl ClientConfig {
    /// Only indications hold the chain until the peer confirms.
    pub fn requires_confirmation(self) -> bool {
        self == ClientConfig::Indicate
    }
}

/// Decode the CCCD wire value. Anything other than exactly one of the
/// three defined values is rejected.
impl TryFrom<u16> for ClientConfig {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(ClientConfig::Disabled),
            0x0001 => Ok(ClientConfig::Notify),
            0x0002 => Ok(ClientConfig::Indicate),
            other => Err(Violation::InvalidClientConfig(other).into()),
        }
    }
}

impl From<ClientConfig> for u16 {
    fn from(config: ClientConfig) -> u16 {
        match config {
            ClientConfig::Disabled => 0x0000,
            ClientConfig::Notify => 0x0001,
            ClientConfig::Indicate => 0x0002,
        }
    }
}

/// Subscription flags for the three light characteristics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionState {
    modes: [ClientConfig; Characteristic::COUNT],
}

impl SubscriptionState {
    pub const fn new() -> Self {
        Self {
            modes: [ClientConfig::Disabled; Characteristic::COUNT],
        }
    }

    /// Record the mode the peer wrote for `characteristic`.
    pub fn on_client_config_write(&mut self, characteristic: Characteristic, mode: ClientConfig) {
        let previous = core::mem::replace(&mut self.modes[characteristic.index()], mode);
        if previous != mode {
            debug!("SUBSCRIPTION: {:?} {:?} -> {:?}", characteristic, previous, mode);
        }
    }

    pub fn mode_of(&self, characteristic: Characteristic) -> ClientConfig {
        self.modes[characteristic.index()]
    }

    /// True if at least one characteristic would be sent.
    pub fn any_enabled(&self) -> bool {
        self.modes.iter().any(|mode| *mode != ClientConfig::Disabled)
    }

    /// Forget every subscription (last link dropped).
    pub fn reset(&mut self) {
        self.modes = [ClientConfig::Disabled; Characteristic::COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_disabled() {
        let state = SubscriptionState::new();
        for characteristic in Characteristic::ALL {
            assert_eq!(state.mode_of(characteristic), ClientConfig::Disabled);
        }
        assert!(!state.any_enabled());
    }

    #[test]
    fn records_per_characteristic() {
        let mut state = SubscriptionState::new();
        state.on_client_config_write(Characteristic::TriggerSource, ClientConfig::Notify);

        assert_eq!(state.mode_of(Characteristic::LightState), ClientConfig::Disabled);
        assert_eq!(state.mode_of(Characteristic::TriggerSource), ClientConfig::Notify);
        assert!(state.any_enabled());

        state.reset();
        assert!(!state.any_enabled());
    }

    #[test]
    fn wire_values() {
        assert_eq!(ClientConfig::try_from(0), Ok(ClientConfig::Disabled));
        assert_eq!(ClientConfig::try_from(1), Ok(ClientConfig::Notify));
        assert_eq!(ClientConfig::try_from(2), Ok(ClientConfig::Indicate));
        assert_eq!(u16::from(ClientConfig::Indicate), 2);
    }

    #[test]
    fn notify_and_indicate_together_is_rejected() {
        assert_eq!(
            ClientConfig::try_from(3),
            Err(Error::ProtocolViolation(Violation::InvalidClientConfig(3)))
        );
    }
}
