//! Controller Event Queue
//!
//! Everything the controller reacts to arrives as a [`ControllerEvent`]
//! through one channel with a single consumer. Stack callbacks post into it
//! without blocking; the light's change callback raises a separate signal so
//! bursts of changes coalesce before they reach the queue.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use embassy_sync::signal::Signal;
use heapless::Vec;

use crate::ble::connection::Address;
use crate::config::{EVENT_QUEUE_DEPTH, MAX_WRITE_LEN};
use crate::core::timer::TimerEvent;
use crate::error::{Error, Violation};

/// Write payload as delivered by the stack
pub type WriteData = Vec<u8, MAX_WRITE_LEN>;

/// Events delivered to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerEvent {
    /// Stack is up
    Boot { identity_address: Address },
    ConnectionOpened {
        handle: u16,
        address: Address,
    },
    ConnectionClosed {
        handle: u16,
        reason: u8,
    },
    /// User write to a characteristic value
    CharacteristicWrite {
        handle: u16,
        attribute: u16,
        data: WriteData,
    },
    /// User read of a characteristic value
    CharacteristicRead { handle: u16, attribute: u16 },
    /// Client configuration write or indication confirmation
    CharacteristicStatus {
        handle: u16,
        attribute: u16,
        status_flags: u8,
        client_config: u16,
    },
    /// The light changed
    DataChanged,
    Timer(TimerEvent),
}

/// Event queue between the stack tasks and the controller task
pub type EventChannel = Channel<CriticalSectionRawMutex, ControllerEvent, EVENT_QUEUE_DEPTH>;
pub type EventSender = Sender<'static, CriticalSectionRawMutex, ControllerEvent, EVENT_QUEUE_DEPTH>;
pub type EventReceiver = Receiver<'static, CriticalSectionRawMutex, ControllerEvent, EVENT_QUEUE_DEPTH>;

static EVENT_CHANNEL: EventChannel = Channel::new();

/// Raised by the light's change callback
pub static DATA_CHANGED: Signal<CriticalSectionRawMutex, ()> = Signal::new();

pub fn event_sender() -> EventSender {
    EVENT_CHANNEL.sender()
}

pub fn event_receiver() -> EventReceiver {
    EVENT_CHANNEL.receiver()
}

/// Queue an event without waiting. A full queue drops the event.
pub fn post_event(event: ControllerEvent) -> Result<(), ControllerEvent> {
    EVENT_CHANNEL.try_send(event).map_err(|e| match e {
        TrySendError::Full(event) => {
            warn!("EVENTS: Queue full, dropping {:?}", event);
            event
        }
    })
}

/// Light change callback, registered with `Light::on_change`.
pub fn signal_data_changed() {
    DATA_CHANGED.signal(());
}

/// Create a characteristic write event, rejecting payloads that do not fit
/// the event buffer.
pub fn create_characteristic_write_event(handle: u16, attribute: u16, data: &[u8]) -> Result<ControllerEvent, Error> {
    let data = WriteData::from_slice(data).map_err(|_| Violation::WriteTooLong)?;
    Ok(ControllerEvent::CharacteristicWrite {
        handle,
        attribute,
        data,
    })
}
