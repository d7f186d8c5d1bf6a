//! Indication Controller
//!
//! Owns the connection table, subscriptions, scheduler and advertising state
//! and is the single dispatch point for stack events and timer expirations.
//! Indications go to one subscriber only: the link in the lowest occupied
//! connection slot.

use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Receiver;
use embassy_sync::signal::Signal;
use embassy_time::{Instant, Timer};

use crate::ble::advertising::AdvertisingController;
use crate::ble::connection::{Address, ConnectionRegistry};
use crate::ble::events::ControllerEvent;
use crate::ble::scheduler::{CycleContext, FlowState, IndicationScheduler};
use crate::ble::services::{Characteristic, GattHandles, StatusFlags};
use crate::ble::subscription::{ClientConfig, SubscriptionState};
use crate::config::{IndicationConfig, MAX_CONNECTIONS};
use crate::core::timer::{PeriodicTimer, TimerEvent};
use crate::core::transport::{
    Transport, ATT_INVALID_ATTRIBUTE_LENGTH, ATT_SUCCESS, ATT_WRITE_NOT_PERMITTED,
};
use crate::error::{Error, Violation};
use crate::light::{LightSource, LightState, TriggerSource};

/// Device information System ID derived from the identity address.
pub fn system_id(identity: &Address) -> [u8; 8] {
    let a = identity.bytes();
    [a[5], a[4], a[3], 0xFF, 0xFE, a[2], a[1], a[0]]
}

pub struct IndicationController<const N: usize = MAX_CONNECTIONS> {
    registry: ConnectionRegistry<N>,
    subscriptions: SubscriptionState,
    scheduler: IndicationScheduler,
    advertising: AdvertisingController,
    handles: GattHandles,
    periodic: PeriodicTimer,
}

impl<const N: usize> IndicationController<N> {
    pub fn new(handles: GattHandles, config: IndicationConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            subscriptions: SubscriptionState::new(),
            scheduler: IndicationScheduler::new(config.confirmation_timeout()),
            advertising: AdvertisingController::new(N),
            handles,
            periodic: PeriodicTimer::new(config.periodic_interval()),
        }
    }

    pub fn current_flow_state(&self) -> FlowState {
        self.scheduler.current_flow_state()
    }

    pub fn registry(&self) -> &ConnectionRegistry<N> {
        &self.registry
    }

    pub fn subscriptions(&self) -> &SubscriptionState {
        &self.subscriptions
    }

    pub fn scheduler(&self) -> &IndicationScheduler {
        &self.scheduler
    }

    pub fn advertising(&self) -> &AdvertisingController {
        &self.advertising
    }

    /// Earliest armed timer. The confirmation timeout wins a tie.
    pub fn next_deadline(&self) -> Option<(Instant, TimerEvent)> {
        let timeout = self.scheduler.deadline().map(|at| (at, TimerEvent::ConfirmationTimeout));
        let tick = self.periodic.deadline().map(|at| (at, TimerEvent::PeriodicTick));
        match (timeout, tick) {
            (Some(t), Some(p)) if p.0 < t.0 => Some(p),
            (Some(t), _) => Some(t),
            (None, p) => p,
        }
    }

    /// The light changed: refresh the attribute table and schedule a cycle.
    pub fn on_data_changed<T: Transport, L: LightSource>(
        &mut self,
        now: Instant,
        transport: &mut T,
        light: &L,
    ) -> Result<(), Error> {
        let snapshot = light.snapshot();
        for characteristic in Characteristic::ALL {
            if let Err(e) = transport.update_value(characteristic, &snapshot.payload(characteristic)) {
                warn!("CONTROLLER: Attribute refresh of {:?} failed: {:?}", characteristic, e);
            }
        }

        let mut ctx = Self::context(&self.registry, &self.subscriptions, now, transport, light);
        self.scheduler.on_data_changed(&mut ctx)
    }

    /// Handle one event. Errors are never fatal; the caller logs them and
    /// moves on to the next event.
    pub fn handle_event<T: Transport, L: LightSource>(
        &mut self,
        event: ControllerEvent,
        now: Instant,
        transport: &mut T,
        light: &mut L,
    ) -> Result<(), Error> {
        match event {
            ControllerEvent::Boot { identity_address } => self.on_boot(identity_address, now, transport),
            ControllerEvent::ConnectionOpened { handle, address } => self.on_connected(handle, address, transport),
            ControllerEvent::ConnectionClosed { handle, reason } => {
                self.on_disconnected(handle, reason, now, transport, &*light)
            }
            ControllerEvent::CharacteristicRead { handle, attribute } => {
                let characteristic = self.handles.characteristic(attribute)?;
                let payload = light.snapshot().payload(characteristic);
                transport.send_read_response(handle, characteristic, &payload)?;
                Ok(())
            }
            ControllerEvent::CharacteristicWrite { handle, attribute, data } => {
                self.on_write(handle, attribute, &data, transport, light)
            }
            ControllerEvent::CharacteristicStatus {
                handle,
                attribute,
                status_flags,
                client_config,
            } => self.on_status(handle, attribute, status_flags, client_config, now, transport, light),
            ControllerEvent::DataChanged => self.on_data_changed(now, transport, light),
            ControllerEvent::Timer(TimerEvent::PeriodicTick) => {
                if !self.periodic.tick(now) {
                    return Ok(());
                }
                let mut ctx = Self::context(&self.registry, &self.subscriptions, now, transport, &*light);
                self.scheduler.on_periodic_tick(&mut ctx)
            }
            ControllerEvent::Timer(TimerEvent::ConfirmationTimeout) => {
                let timed_out = self.scheduler.on_timeout(now);
                if timed_out.is_ok() {
                    return Ok(());
                }
                let mut ctx = Self::context(&self.registry, &self.subscriptions, now, transport, &*light);
                self.scheduler.resume_pending(&mut ctx).and(timed_out)
            }
        }
    }

    /// Dispatch loop: one event at a time from the queue, the data-changed
    /// signal and the earliest timer deadline.
    pub async fn run<T, L, M, const Q: usize>(
        &mut self,
        events: Receiver<'_, M, ControllerEvent, Q>,
        data_changed: &Signal<M, ()>,
        transport: &mut T,
        light: &mut L,
    ) where
        T: Transport,
        L: LightSource,
        M: RawMutex,
    {
        info!("CONTROLLER: Dispatch loop started");

        loop {
            let deadline = self.next_deadline();
            let sleep = async {
                match deadline {
                    Some((at, _)) => Timer::at(at).await,
                    None => core::future::pending::<()>().await,
                }
            };

            let event = match select3(events.receive(), data_changed.wait(), sleep).await {
                Either3::First(event) => event,
                Either3::Second(()) => ControllerEvent::DataChanged,
                Either3::Third(()) => match deadline {
                    Some((_, kind)) => ControllerEvent::Timer(kind),
                    None => continue,
                },
            };

            if let Err(e) = self.handle_event(event, Instant::now(), transport, light) {
                log_error(&e);
            }
        }
    }

    fn context<'a, T: Transport, L: LightSource>(
        registry: &ConnectionRegistry<N>,
        subscriptions: &'a SubscriptionState,
        now: Instant,
        transport: &'a mut T,
        light: &'a L,
    ) -> CycleContext<'a, T, L> {
        CycleContext {
            now,
            target: registry.primary().map(|connection| connection.handle),
            subscriptions,
            light,
            transport,
        }
    }

    fn on_boot<T: Transport>(&mut self, identity: Address, now: Instant, transport: &mut T) -> Result<(), Error> {
        info!("CONTROLLER: Boot, identity {:?}", identity);

        let stored = transport.write_system_id(&system_id(&identity));
        if let Err(e) = stored {
            warn!("CONTROLLER: Failed to store System ID: {:?}", e);
        }

        self.periodic.start(now);
        self.advertising.update(self.registry.count_in_use(), transport)?;
        stored.map_err(Error::from)
    }

    fn on_connected<T: Transport>(&mut self, handle: u16, address: Address, transport: &mut T) -> Result<(), Error> {
        if self.registry.lookup(handle).is_some() {
            return Err(Violation::DuplicateConnection(handle).into());
        }

        // connectable advertising ends when a peer connects
        self.advertising.mark_stopped();

        let added = self.registry.add(handle, address);
        if added {
            info!("CONTROLLER: Connected {} ({:?}), {} in use", handle, address, self.registry.count_in_use());
        }

        let advertising = self.advertising.update(self.registry.count_in_use(), transport);
        if !added {
            return Err(Error::CapacityExceeded { handle });
        }
        advertising
    }

    fn on_disconnected<T: Transport, L: LightSource>(
        &mut self,
        handle: u16,
        reason: u8,
        now: Instant,
        transport: &mut T,
        light: &L,
    ) -> Result<(), Error> {
        if !self.registry.remove(handle) {
            return Err(Violation::UnknownConnection(handle).into());
        }
        info!("CONTROLLER: Disconnected {} (reason {})", handle, reason);

        let aborted = self.scheduler.on_disconnect(handle);
        if self.registry.count_in_use() == 0 {
            debug!("CONTROLLER: Last link gone, subscriptions cleared");
            self.subscriptions.reset();
        }

        // a change queued behind the cut cycle goes to the remaining link
        let resumed = if aborted {
            let mut ctx = Self::context(&self.registry, &self.subscriptions, now, transport, light);
            self.scheduler.resume_pending(&mut ctx)
        } else {
            Ok(())
        };

        let advertising = self.advertising.update(self.registry.count_in_use(), transport);
        resumed.and(advertising)
    }

    fn on_write<T: Transport, L: LightSource>(
        &mut self,
        handle: u16,
        attribute: u16,
        data: &[u8],
        transport: &mut T,
        light: &mut L,
    ) -> Result<(), Error> {
        match self.handles.characteristic(attribute) {
            Ok(Characteristic::LightState) => {
                let Some(&value) = data.first() else {
                    transport.send_write_response(handle, attribute, ATT_INVALID_ATTRIBUTE_LENGTH)?;
                    return Err(Violation::EmptyWrite.into());
                };

                let address = self
                    .registry
                    .lookup(handle)
                    .map(|connection| connection.peer_address)
                    .unwrap_or(Address::UNKNOWN);
                light.set_state(TriggerSource::Bluetooth, address, LightState::from(value));
                transport.send_write_response(handle, attribute, ATT_SUCCESS)?;
                Ok(())
            }
            Ok(_) => {
                transport.send_write_response(handle, attribute, ATT_WRITE_NOT_PERMITTED)?;
                Err(Violation::WriteNotPermitted(attribute).into())
            }
            Err(e) => {
                transport.send_write_response(handle, attribute, ATT_WRITE_NOT_PERMITTED)?;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn on_status<T: Transport, L: LightSource>(
        &mut self,
        handle: u16,
        attribute: u16,
        status_flags: u8,
        client_config: u16,
        now: Instant,
        transport: &mut T,
        light: &L,
    ) -> Result<(), Error> {
        let flags = StatusFlags::try_from(status_flags)?;
        let characteristic = self.handles.characteristic(attribute)?;

        match flags {
            StatusFlags::ClientConfig => {
                let mode = ClientConfig::try_from(client_config)?;
                self.subscriptions.on_client_config_write(characteristic, mode);
                let mut ctx = Self::context(&self.registry, &self.subscriptions, now, transport, light);
                self.scheduler.on_client_config_changed(characteristic, mode, &mut ctx)
            }
            StatusFlags::Confirmation => {
                let mut ctx = Self::context(&self.registry, &self.subscriptions, now, transport, light);
                self.scheduler.on_confirmation(handle, characteristic, &mut ctx)
            }
        }
    }
}

fn log_error(e: &Error) {
    match e {
        Error::TransportFailure(_) | Error::InvalidConfig => error!("CONTROLLER: {:?}", e),
        _ => warn!("CONTROLLER: {:?}", e),
    }
}
