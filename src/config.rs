//! Application-wide constants and timer configuration.
//!
//! Timing parameters and table sizes live here so they can be tuned in one
//! place.

use embassy_time::Duration;

use crate::ble::services::Characteristic;
use crate::error::Error;

// BLE

/// Maximum simultaneous peer connections tracked by the registry.
pub const MAX_CONNECTIONS: usize = 2;

/// Advertising interval (in 0.625 ms units). 160 = 100 ms.
pub const ADV_INTERVAL: u32 = 160;

/// Name carried in the advertising payload.
pub const DEVICE_NAME: &str = "MP Light";

/// Largest characteristic write accepted from a peer (default ATT MTU - 3).
pub const MAX_WRITE_LEN: usize = 20;

/// Depth of the controller event queue.
///
/// Stack callbacks post without waiting and a full queue drops the event.
/// A dropped client configuration write leaves the subscription table out
/// of step with the peer until it writes again, so the queue holds a full
/// burst of configuration writes from every link plus the same again for
/// confirmations and connection events.
pub const EVENT_QUEUE_DEPTH: usize = 2 * MAX_CONNECTIONS * Characteristic::COUNT + 4;

// Indication timing

/// Period of the re-check timer that flushes pending light changes (ms).
pub const INDICATION_PERIOD_MS: u64 = 1200;

/// How long to wait for a subscriber's confirmation before giving up on
/// the current cycle (ms). Must stay below `INDICATION_PERIOD_MS`.
pub const INDICATION_TIMEOUT_MS: u64 = 1000;

/// Timer settings for the indication scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndicationConfig {
    periodic_interval: Duration,
    confirmation_timeout: Duration,
}

impl IndicationConfig {
    /// Validate and build a timer configuration.
    ///
    /// The periodic interval has to be strictly longer than the confirmation
    /// timeout so a stalled cycle always times out before the next periodic
    /// trigger fires.
    pub fn new(periodic_interval: Duration, confirmation_timeout: Duration) -> Result<Self, Error> {
        if confirmation_timeout.as_ticks() == 0 || periodic_interval <= confirmation_timeout {
            return Err(Error::InvalidConfig);
        }

        Ok(Self {
            periodic_interval,
            confirmation_timeout,
        })
    }

    pub fn periodic_interval(&self) -> Duration {
        self.periodic_interval
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }
}

impl Default for IndicationConfig {
    fn default() -> Self {
        Self {
            periodic_interval: Duration::from_millis(INDICATION_PERIOD_MS),
            confirmation_timeout: Duration::from_millis(INDICATION_TIMEOUT_MS),
        }
    }
}
