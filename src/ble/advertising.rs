//! BLE Advertising Controller
//!
//! Keeps advertising in step with connection table occupancy: connectable
//! while a slot is free, scannable-only once the table is full so the device
//! stays discoverable without accepting links it cannot track.

use crate::config::ADV_INTERVAL;
use crate::core::transport::Transport;
use crate::error::Error;

/// Kind of advertising requested from the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvertisingMode {
    /// Connectable, scannable undirected
    Connectable,
    /// Scannable only; peers can read the advertising data but not connect
    NonConnectable,
}

/// Advertising state as last requested from the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AdvState {
    Stopped = 0,
    Active = 1,
}

/// Advertising controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingController {
    /// Maximum simultaneous connections
    capacity: usize,
    /// Advertising interval (0.625 ms units)
    interval: u32,
    state: AdvState,
    mode: AdvertisingMode,
}

impl AdvertisingController {
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            interval: ADV_INTERVAL,
            state: AdvState::Stopped,
            mode: AdvertisingMode::Connectable,
        }
    }

    /// Mode wanted for a given number of live links.
    pub fn desired_mode(&self, connection_count: usize) -> AdvertisingMode {
        if connection_count < self.capacity {
            AdvertisingMode::Connectable
        } else {
            AdvertisingMode::NonConnectable
        }
    }

    /// Bring advertising in line with `connection_count`.
    ///
    /// Restarts advertising if the mode has to change or the stack stopped
    /// it. A failed request leaves the controller `Stopped` and is not
    /// retried; the next connect or disconnect tries again.
    pub fn update<T: Transport>(&mut self, connection_count: usize, transport: &mut T) -> Result<(), Error> {
        let desired = self.desired_mode(connection_count);
        if self.state == AdvState::Active && self.mode == desired {
            return Ok(());
        }

        if self.state == AdvState::Active {
            if let Err(e) = transport.stop_advertising() {
                // stop failing usually means the stack already stopped it
                warn!("ADV: Stop failed: {:?}", e);
            }
            self.state = AdvState::Stopped;
        }

        match transport.start_advertising(desired) {
            Ok(()) => {
                self.state = AdvState::Active;
                self.mode = desired;
                info!("ADV: {:?} advertising started ({} links)", desired, connection_count);
                Ok(())
            }
            Err(e) => {
                error!("ADV: Failed to start {:?} advertising: {:?}", desired, e);
                self.state = AdvState::Stopped;
                Err(e.into())
            }
        }
    }

    /// Record that the stack ended advertising on its own. A connectable
    /// advertisement stops as soon as a peer connects.
    pub fn mark_stopped(&mut self) {
        if self.state != AdvState::Stopped {
            debug!("ADV: Stopped by stack");
        }
        self.state = AdvState::Stopped;
    }

    pub fn state(&self) -> AdvState {
        self.state
    }

    /// Mode of the running (or last requested) advertisement.
    pub fn mode(&self) -> AdvertisingMode {
        self.mode
    }

    /// Advertising interval (0.625 ms units)
    pub fn interval(&self) -> u32 {
        self.interval
    }
}
