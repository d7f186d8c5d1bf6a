//! Indication Scheduler
//!
//! Serializes the three light characteristics to the subscriber. Only one
//! cycle is ever in flight: an `Indicate` stage holds the chain until the
//! peer confirms or the confirmation timer runs out, `Notify` stages go out
//! back to back, `Disabled` stages are skipped. Light changes that arrive
//! while a cycle is running collapse into a single `pending` flag and the
//! follow-up cycle reads the freshest value.

use embassy_time::{Duration, Instant};

use crate::ble::connection::Address;
use crate::ble::services::Characteristic;
use crate::ble::subscription::{ClientConfig, SubscriptionState};
use crate::core::timer::OneShotTimer;
use crate::core::transport::{Transport, TransportError};
use crate::error::Error;
use crate::light::{LightSnapshot, LightSource, LightState, TriggerSource};

/// Stage of the indication cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlowState {
    #[default]
    Idle,
    SendingLightState,
    SendingTriggerSource,
    SendingSourceAddress,
}

impl FlowState {
    fn sending(characteristic: Characteristic) -> Self {
        match characteristic {
            Characteristic::LightState => FlowState::SendingLightState,
            Characteristic::TriggerSource => FlowState::SendingTriggerSource,
            Characteristic::SourceAddress => FlowState::SendingSourceAddress,
        }
    }

    /// Characteristic whose confirmation this stage waits for.
    pub fn awaiting(self) -> Option<Characteristic> {
        match self {
            FlowState::Idle => None,
            FlowState::SendingLightState => Some(Characteristic::LightState),
            FlowState::SendingTriggerSource => Some(Characteristic::TriggerSource),
            FlowState::SendingSourceAddress => Some(Characteristic::SourceAddress),
        }
    }
}

/// Everything a scheduler step may look at or call, borrowed from the
/// controller for the duration of one event.
pub struct CycleContext<'a, T: Transport, L: LightSource> {
    pub now: Instant,
    /// Connection indications go to, if any
    pub target: Option<u16>,
    pub subscriptions: &'a SubscriptionState,
    pub light: &'a L,
    pub transport: &'a mut T,
}

impl<T: Transport, L: LightSource> CycleContext<'_, T, L> {
    /// A connected peer has enabled at least one characteristic.
    pub fn has_subscriber(&self) -> bool {
        self.target.is_some() && self.subscriptions.any_enabled()
    }
}

pub struct IndicationScheduler {
    state: FlowState,
    pending: bool,
    /// Connection the running cycle sends to
    target: Option<u16>,
    snapshot: LightSnapshot,
    timer: OneShotTimer,
    confirmation_timeout: Duration,
}

impl IndicationScheduler {
    pub const fn new(confirmation_timeout: Duration) -> Self {
        Self {
            state: FlowState::Idle,
            pending: false,
            target: None,
            snapshot: LightSnapshot {
                state: LightState::Off,
                trigger_source: TriggerSource::Button,
                trigger_address: Address::UNKNOWN,
            },
            timer: OneShotTimer::new(),
            confirmation_timeout,
        }
    }

    pub fn current_flow_state(&self) -> FlowState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Connection handle of the running cycle.
    pub fn target(&self) -> Option<u16> {
        self.target
    }

    /// Values the running cycle is sending.
    pub fn snapshot(&self) -> &LightSnapshot {
        &self.snapshot
    }

    /// Confirmation deadline, only set while waiting on an indication.
    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// The light changed.
    pub fn on_data_changed<T: Transport, L: LightSource>(&mut self, ctx: &mut CycleContext<'_, T, L>) -> Result<(), Error> {
        if self.state != FlowState::Idle {
            debug!("SCHED: Change during {:?}, marked pending", self.state);
            self.pending = true;
            return Ok(());
        }

        if !ctx.has_subscriber() {
            debug!("SCHED: No subscriber, marked pending");
            self.pending = true;
            return Ok(());
        }

        self.begin(ctx);
        self.run_chain(Some(Characteristic::LightState), ctx)
    }

    /// The peer on `handle` confirmed an indication of `characteristic`.
    pub fn on_confirmation<T: Transport, L: LightSource>(
        &mut self,
        handle: u16,
        characteristic: Characteristic,
        ctx: &mut CycleContext<'_, T, L>,
    ) -> Result<(), Error> {
        if self.state.awaiting() != Some(characteristic) {
            debug!("SCHED: Ignoring confirmation for {:?} in {:?}", characteristic, self.state);
            return Ok(());
        }
        if self.target != Some(handle) {
            debug!("SCHED: Ignoring confirmation from connection {}", handle);
            return Ok(());
        }

        self.timer.stop();
        self.run_chain(characteristic.next(), ctx)
    }

    /// Confirmation timer event. Stale deliveries (timer stopped or
    /// restarted since) are ignored.
    pub fn on_timeout(&mut self, now: Instant) -> Result<(), Error> {
        let Some(characteristic) = self.state.awaiting() else {
            return Ok(());
        };
        if !self.timer.expire(now) {
            trace!("SCHED: Stale confirmation timeout ignored");
            return Ok(());
        }

        warn!("SCHED: No confirmation for {:?}, cycle abandoned", characteristic);
        self.abort();
        Err(Error::ConfirmationTimeout { characteristic })
    }

    /// A connection dropped. Returns true if it was carrying the cycle.
    pub fn on_disconnect(&mut self, handle: u16) -> bool {
        if self.target != Some(handle) {
            return false;
        }

        let aborted = self.state != FlowState::Idle;
        if aborted {
            info!("SCHED: Target {} disconnected during {:?}", handle, self.state);
        }
        self.abort();
        aborted
    }

    /// Periodic re-check: flush a change that arrived with nobody listening.
    pub fn on_periodic_tick<T: Transport, L: LightSource>(&mut self, ctx: &mut CycleContext<'_, T, L>) -> Result<(), Error> {
        self.resume_pending(ctx)
    }

    /// Start the follow-up cycle for a pending change if the scheduler is
    /// idle and someone is listening. Called after a cycle was cut short so
    /// the change doesn't wait for the next periodic tick.
    pub fn resume_pending<T: Transport, L: LightSource>(&mut self, ctx: &mut CycleContext<'_, T, L>) -> Result<(), Error> {
        if self.state != FlowState::Idle || !self.pending || !ctx.has_subscriber() {
            return Ok(());
        }

        debug!("SCHED: Starting cycle for pending change");
        self.begin(ctx);
        self.run_chain(Some(Characteristic::LightState), ctx)
    }

    /// The peer rewrote the client configuration of `characteristic`.
    ///
    /// The subscription table is already updated. If the stage waiting on
    /// this characteristic is no longer indicated, its confirmation will
    /// never come: release it and carry on with the chain.
    pub fn on_client_config_changed<T: Transport, L: LightSource>(
        &mut self,
        characteristic: Characteristic,
        mode: ClientConfig,
        ctx: &mut CycleContext<'_, T, L>,
    ) -> Result<(), Error> {
        if self.state.awaiting() != Some(characteristic) || mode.requires_confirmation() {
            return Ok(());
        }

        debug!("SCHED: {:?} now {:?}, releasing stage", characteristic, mode);
        self.timer.stop();
        self.run_chain(characteristic.next(), ctx)
    }

    fn begin<T: Transport, L: LightSource>(&mut self, ctx: &CycleContext<'_, T, L>) {
        self.pending = false;
        self.target = ctx.target;
        self.snapshot = ctx.light.snapshot();
        debug!("SCHED: Cycle start to {:?} with {:?}", self.target, self.snapshot);
    }

    /// Walk the chain from `next` until an indication has to wait or the
    /// chain ends. A finished cycle restarts here if a change is pending.
    fn run_chain<T: Transport, L: LightSource>(
        &mut self,
        mut next: Option<Characteristic>,
        ctx: &mut CycleContext<'_, T, L>,
    ) -> Result<(), Error> {
        loop {
            match next {
                Some(characteristic) => match ctx.subscriptions.mode_of(characteristic) {
                    ClientConfig::Disabled => {
                        trace!("SCHED: {:?} disabled, skipped", characteristic);
                        next = characteristic.next();
                    }
                    ClientConfig::Notify => {
                        self.send(characteristic, false, ctx)?;
                        next = characteristic.next();
                    }
                    ClientConfig::Indicate => {
                        self.send(characteristic, true, ctx)?;
                        self.state = FlowState::sending(characteristic);
                        self.timer.start(ctx.now, self.confirmation_timeout);
                        debug!("SCHED: -> {:?}", self.state);
                        return Ok(());
                    }
                },
                None => {
                    self.timer.stop();
                    self.state = FlowState::Idle;

                    if self.pending && ctx.has_subscriber() {
                        debug!("SCHED: Restarting for pending change");
                        self.begin(ctx);
                        next = Some(Characteristic::LightState);
                    } else {
                        debug!("SCHED: -> Idle");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn send<T: Transport, L: LightSource>(
        &mut self,
        characteristic: Characteristic,
        indicate: bool,
        ctx: &mut CycleContext<'_, T, L>,
    ) -> Result<(), Error> {
        let payload = self.snapshot.payload(characteristic);
        let result = match self.target {
            Some(handle) if indicate => ctx.transport.send_indication(handle, characteristic, &payload),
            Some(handle) => ctx.transport.send_notification(handle, characteristic, &payload),
            None => Err(TransportError::NotConnected),
        };

        if let Err(e) = result {
            error!("SCHED: Sending {:?} failed: {:?}", characteristic, e);
            self.abort();
            return Err(e.into());
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.timer.stop();
        self.state = FlowState::Idle;
        self.target = None;
    }
}
