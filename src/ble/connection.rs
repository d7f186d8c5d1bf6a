//! Connection Registry
//!
//! Bounded table of live peer links. Pure data: no I/O and no event
//! forwarding, the controller decides what a connect or disconnect means.

use core::fmt;

use crate::config::MAX_CONNECTIONS;

/// 6-byte Bluetooth device address, least significant byte first.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// All-zero address, used when the originator of a change is unknown.
    pub const UNKNOWN: Address = Address([0; 6]);

    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[5], a[4], a[3], a[2], a[1], a[0]
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Address {
    fn format(&self, f: defmt::Formatter) {
        let a = &self.0;
        defmt::write!(
            f,
            "{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}:{=u8:02X}",
            a[5],
            a[4],
            a[3],
            a[2],
            a[1],
            a[0]
        )
    }
}

/// One slot of the connection table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Connection {
    /// Connection handle assigned by the stack
    pub handle: u16,
    /// Peer device address
    pub peer_address: Address,
    /// Slot holds a live link
    pub in_use: bool,
}

impl Connection {
    const EMPTY: Connection = Connection {
        handle: 0,
        peer_address: Address::UNKNOWN,
        in_use: false,
    };
}

/// Fixed-capacity connection table
pub struct ConnectionRegistry<const N: usize = MAX_CONNECTIONS> {
    slots: [Connection; N],
}

impl<const N: usize> ConnectionRegistry<N> {
    pub const fn new() -> Self {
        Self {
            slots: [Connection::EMPTY; N],
        }
    }

    /// Table capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Track a new link in the first free slot.
    ///
    /// Returns `false` when the table is full or the handle is already
    /// tracked.
    pub fn add(&mut self, handle: u16, address: Address) -> bool {
        if self.lookup(handle).is_some() {
            warn!("CONNECTION: Handle {} already tracked", handle);
            return false;
        }

        match self.slots.iter_mut().find(|slot| !slot.in_use) {
            Some(slot) => {
                *slot = Connection {
                    handle,
                    peer_address: address,
                    in_use: true,
                };
                debug!("CONNECTION: Added connection {} from {:?}", handle, address);
                true
            }
            None => {
                warn!("CONNECTION: Failed to add connection {} - table full", handle);
                false
            }
        }
    }

    /// Clear the slot tracking `handle`, including the peer address.
    pub fn remove(&mut self, handle: u16) -> bool {
        match self.slots.iter_mut().find(|slot| slot.in_use && slot.handle == handle) {
            Some(slot) => {
                *slot = Connection::EMPTY;
                debug!("CONNECTION: Removed connection {}", handle);
                true
            }
            None => {
                warn!("CONNECTION: Attempted to remove unknown connection {}", handle);
                false
            }
        }
    }

    /// Get connection info by handle
    pub fn lookup(&self, handle: u16) -> Option<Connection> {
        self.slots
            .iter()
            .find(|slot| slot.in_use && slot.handle == handle)
            .copied()
    }

    /// Number of live links
    pub fn count_in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.in_use).count()
    }

    pub fn is_full(&self) -> bool {
        self.count_in_use() == N
    }

    /// The link indications go to: the lowest occupied slot.
    pub fn primary(&self) -> Option<Connection> {
        self.slots.iter().find(|slot| slot.in_use).copied()
    }

    /// Get all active connection handles
    pub fn active_handles(&self) -> impl Iterator<Item = u16> + '_ {
        self.slots.iter().filter(|slot| slot.in_use).map(|slot| slot.handle)
    }
}

impl<const N: usize> Default for ConnectionRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}
