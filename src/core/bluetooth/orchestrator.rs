//! Scan/connect state machine
//! Drives a single heart rate peripheral from discovery to a live notification
//! stream. Every handler is synchronous and non-blocking: adapter requests are
//! fire-and-forget and their results come back as later events.

use log::{debug, info, warn};

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::constants::{UUID_HEART_RATE_MEASUREMENT, UUID_HEART_RATE_SERVICE};
use crate::core::bluetooth::events::{AdapterEvent, EventSender, MonitorCommand, MonitorEvent, TimerKind};
use crate::core::bluetooth::session::PeripheralSession;
use crate::core::bluetooth::sink::EventSink;
use crate::core::bluetooth::timer::{ScopedTimer, Timeouts};
use crate::core::bluetooth::types::{
    CharacteristicInfo, ConnectionState, PeripheralHandle, ScanFilter, ServiceInfo,
};
use crate::core::heart_rate;
use crate::error::ErrorKind;

pub struct Orchestrator<A: BleAdapter, S: EventSink> {
    adapter: A,
    sink: S,
    filter: ScanFilter,
    timeouts: Timeouts,
    /// Queue timers post their expiry to
    events: EventSender,
    state: ConnectionState,
    /// Peripheral the adapter may hold a link to
    peripheral: Option<PeripheralHandle>,
    /// Id of the last link given up, whose late reports are stale during a scan
    released: Option<String>,
    session: Option<PeripheralSession>,
    timer: Option<ScopedTimer>,
    next_timer_id: u64,
}

impl<A: BleAdapter, S: EventSink> Orchestrator<A, S> {
    pub fn new(adapter: A, sink: S, timeouts: Timeouts, events: EventSender) -> Self {
        Self {
            adapter,
            sink,
            filter: ScanFilter::new(UUID_HEART_RATE_SERVICE),
            timeouts,
            events,
            state: ConnectionState::Idle,
            peripheral: None,
            released: None,
            session: None,
            timer: None,
            next_timer_id: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        self.peripheral.as_ref()
    }

    pub fn session(&self) -> Option<&PeripheralSession> {
        self.session.as_ref()
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// A sender for the queue this orchestrator's timers post to
    pub fn event_sender(&self) -> EventSender {
        self.events.clone()
    }

    /// Routes a queued event to its handler
    pub fn handle(&mut self, event: MonitorEvent) {
        match event {
            MonitorEvent::Adapter(event) => self.handle_adapter_event(event),
            MonitorEvent::TimerExpired { kind, id } => self.on_timer_expired(kind, id),
            MonitorEvent::Command(MonitorCommand::StartScan) => self.start_scan(),
            MonitorEvent::Command(MonitorCommand::StopScan) => self.stop_scan(),
            MonitorEvent::Command(MonitorCommand::Shutdown) => self.shutdown(),
        }
    }

    fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::PeripheralDiscovered(peripheral) => self.on_peripheral_discovered(peripheral),
            AdapterEvent::Connected(peripheral) => self.on_connected(peripheral),
            AdapterEvent::ServicesDiscovered(services) => self.on_services_discovered(services),
            AdapterEvent::CharacteristicsDiscovered(characteristics) => {
                self.on_characteristics_discovered(characteristics)
            }
            AdapterEvent::NotificationEnabled => self.on_notification_enabled(),
            AdapterEvent::ValueUpdated(value) => self.on_characteristic_value_updated(&value),
            AdapterEvent::Disconnected(peripheral_id) => self.on_disconnected(&peripheral_id),
        }
    }

    pub fn start_scan(&mut self) {
        if !self.state.can_start_scan() {
            warn!("Ignoring scan request while {}", self.state);
            return;
        }
        info!("Scanning for heart rate peripherals");
        if let Some(previous) = self.peripheral.take() {
            self.released = Some(previous.id);
        }
        self.session = None;
        self.adapter.start_discovery(&self.filter);
        self.transition(ConnectionState::Scanning);
        self.start_timer(TimerKind::Scan);
    }

    pub fn stop_scan(&mut self) {
        if self.state != ConnectionState::Scanning {
            debug!("Ignoring stop scan while {}", self.state);
            return;
        }
        self.cancel_timer();
        self.adapter.stop_discovery();
        self.transition(ConnectionState::Idle);
    }

    pub fn on_peripheral_discovered(&mut self, peripheral: PeripheralHandle) {
        if self.state != ConnectionState::Scanning {
            debug!("Ignoring discovery of {} while {}", peripheral, self.state);
            return;
        }
        info!("Found heart rate peripheral {}", peripheral);
        self.cancel_timer();
        self.adapter.stop_discovery();
        self.adapter.connect(&peripheral);
        self.peripheral = Some(peripheral.clone());
        self.transition(ConnectionState::Connecting(peripheral));
        self.start_timer(TimerKind::Connect);
    }

    pub fn on_scan_timeout(&mut self) {
        if self.state != ConnectionState::Scanning {
            return;
        }
        warn!("Scan timed out");
        self.cancel_timer();
        self.adapter.stop_discovery();
        self.transition(ConnectionState::Disconnected);
        self.sink.on_scan_timeout();
    }

    pub fn on_connected(&mut self, peripheral: PeripheralHandle) {
        match &self.state {
            ConnectionState::Connecting(pending) if pending.same_device(&peripheral) => {}
            _ => {
                debug!("Ignoring connection of {} while {}", peripheral, self.state);
                return;
            }
        }
        info!("Connected to {}, discovering services...", peripheral);
        self.cancel_timer();
        self.transition(ConnectionState::DiscoveringServices);
        self.adapter
            .discover_services(&peripheral, &[self.filter.service]);
    }

    pub fn on_connect_timeout(&mut self) {
        let ConnectionState::Connecting(peripheral) = &self.state else {
            return;
        };
        let peripheral = peripheral.clone();
        warn!("Connection to {} timed out", peripheral);
        self.cancel_timer();
        self.adapter.disconnect(&peripheral);
        self.peripheral = None;
        self.released = Some(peripheral.id);
        self.transition(ConnectionState::Disconnected);
        self.sink.on_connect_timeout();
    }

    pub fn on_services_discovered(&mut self, services: Vec<ServiceInfo>) {
        if self.state != ConnectionState::DiscoveringServices {
            debug!("Ignoring service discovery while {}", self.state);
            return;
        }
        let Some(service) = services.iter().find(|s| s.uuid == self.filter.service) else {
            for service in &services {
                info!("Available service: {}", service.uuid);
            }
            self.fail(ErrorKind::ServiceNotFound);
            return;
        };
        info!("Found heart rate service: {}", service.uuid);
        self.transition(ConnectionState::DiscoveringCharacteristics);
        self.adapter
            .discover_characteristics(service, &[UUID_HEART_RATE_MEASUREMENT]);
    }

    pub fn on_characteristics_discovered(&mut self, characteristics: Vec<CharacteristicInfo>) {
        if self.state != ConnectionState::DiscoveringCharacteristics {
            debug!("Ignoring characteristic discovery while {}", self.state);
            return;
        }
        let measurement = characteristics
            .into_iter()
            .find(|c| c.uuid == UUID_HEART_RATE_MEASUREMENT && c.can_notify);
        let (Some(characteristic), Some(peripheral)) = (measurement, self.peripheral.clone()) else {
            self.fail(ErrorKind::CharacteristicNotFound);
            return;
        };
        info!("Found heart rate measurement characteristic: {}", characteristic.uuid);
        let mut session = PeripheralSession::new(peripheral, characteristic);
        session.subscribe(&mut self.adapter);
        self.session = Some(session);
        self.transition(ConnectionState::Subscribing);
    }

    pub fn on_notification_enabled(&mut self) {
        if self.state != ConnectionState::Subscribing {
            debug!("Ignoring notification confirmation while {}", self.state);
            return;
        }
        if let Some(session) = &mut self.session {
            session.on_notification_enabled();
        }
        self.transition(ConnectionState::Streaming);
    }

    pub fn on_characteristic_value_updated(&mut self, value: &[u8]) {
        if self.state != ConnectionState::Streaming {
            debug!("Ignoring value update while {}", self.state);
            return;
        }
        let value = match &self.session {
            Some(session) => session.forward(value),
            None => value,
        };
        match heart_rate::decode(value) {
            Ok(reading) => {
                debug!("Heart rate reading: {}", reading);
                self.sink.on_reading(reading);
            }
            Err(e) => {
                warn!("Dropping heart rate frame {:02X?}: {}", value, e);
                self.sink.on_malformed_frame();
            }
        }
    }

    pub fn on_disconnected(&mut self, peripheral_id: &str) {
        if self.state == ConnectionState::Disconnected {
            debug!("Ignoring disconnection of {} while {}", peripheral_id, self.state);
            return;
        }
        if self.is_stale_link(peripheral_id) {
            debug!("Ignoring disconnection of earlier link {}", peripheral_id);
            return;
        }
        info!("Peripheral {} disconnected while {}", peripheral_id, self.state);
        self.cancel_timer();
        if self.state == ConnectionState::Scanning {
            self.adapter.stop_discovery();
        }
        self.session = None;
        if let Some(peripheral) = self.peripheral.take() {
            // a failed request reports the link lost while the platform may still hold it
            if !matches!(self.state, ConnectionState::Failed(_)) {
                self.adapter.disconnect(&peripheral);
            }
        }
        self.released = Some(peripheral_id.to_string());
        self.transition(ConnectionState::Disconnected);
        self.sink.on_disconnected();
    }

    /// Dispatches a timer expiry if it belongs to the live timer
    pub fn on_timer_expired(&mut self, kind: TimerKind, id: u64) {
        match &self.timer {
            Some(timer) if timer.id() == id && timer.kind() == kind => {}
            _ => {
                debug!("Ignoring stale {:?} timer {}", kind, id);
                return;
            }
        }
        match kind {
            TimerKind::Scan => self.on_scan_timeout(),
            TimerKind::Connect => self.on_connect_timeout(),
        }
    }

    /// Releases every adapter resource and returns to `Idle`
    pub fn shutdown(&mut self) {
        info!("Shutting down while {}", self.state);
        self.cancel_timer();
        if self.state == ConnectionState::Scanning {
            self.adapter.stop_discovery();
        }
        if let Some(mut session) = self.session.take() {
            session.unsubscribe(&mut self.adapter);
        }
        if let Some(peripheral) = self.peripheral.take() {
            self.adapter.disconnect(&peripheral);
            self.released = Some(peripheral.id);
        }
        self.transition(ConnectionState::Idle);
    }

    fn fail(&mut self, kind: ErrorKind) {
        warn!("Heart rate session failed: {}", kind);
        self.session = None;
        self.transition(ConnectionState::Failed(kind));
        self.sink.on_service_unsupported(kind);
        // the link is useless without the service, release it. The handle stays
        // until the adapter confirms so the confirmation can be matched.
        if let Some(peripheral) = &self.peripheral {
            self.adapter.disconnect(peripheral);
        }
    }

    /// True for a disconnect report that does not concern the current link
    fn is_stale_link(&self, peripheral_id: &str) -> bool {
        match &self.peripheral {
            Some(peripheral) => peripheral.id != peripheral_id,
            None => {
                self.state == ConnectionState::Scanning
                    && self.released.as_deref() == Some(peripheral_id)
            }
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!("State {} -> {}", self.state, next);
        self.state = next;
    }

    fn start_timer(&mut self, kind: TimerKind) {
        self.next_timer_id += 1;
        let duration = self.timeouts.duration(kind);
        self.timer = Some(ScopedTimer::start(kind, self.next_timer_id, duration, self.events.clone()));
    }

    fn cancel_timer(&mut self) {
        self.timer = None;
    }
}
