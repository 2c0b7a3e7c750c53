//! Push interface towards the presentation layer

use log::error;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::heart_rate::HeartRateReading;
use crate::error::ErrorKind;

/// Receives readings and lifecycle notifications from the orchestrator.
/// Implementations must not block.
pub trait EventSink {
    fn on_reading(&mut self, reading: HeartRateReading);
    fn on_scan_timeout(&mut self);
    fn on_connect_timeout(&mut self);
    fn on_disconnected(&mut self);
    fn on_malformed_frame(&mut self);
    fn on_service_unsupported(&mut self, kind: ErrorKind);
}

/// Notification delivered by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum MonitorNotification {
    Reading(HeartRateReading),
    ScanTimeout,
    ConnectTimeout,
    Disconnected,
    MalformedFrame,
    ServiceUnsupported(ErrorKind),
}

/// Forwards every notification over an unbounded channel
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<MonitorNotification>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<MonitorNotification>) -> Self {
        Self { sender }
    }

    /// Creates a sink together with the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MonitorNotification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    fn emit(&self, notification: MonitorNotification) {
        if let Err(e) = self.sender.send(notification) {
            error!("Failed to emit {:?}: receiver dropped", e.0);
        }
    }
}

impl EventSink for ChannelSink {
    fn on_reading(&mut self, reading: HeartRateReading) {
        self.emit(MonitorNotification::Reading(reading));
    }

    fn on_scan_timeout(&mut self) {
        self.emit(MonitorNotification::ScanTimeout);
    }

    fn on_connect_timeout(&mut self) {
        self.emit(MonitorNotification::ConnectTimeout);
    }

    fn on_disconnected(&mut self) {
        self.emit(MonitorNotification::Disconnected);
    }

    fn on_malformed_frame(&mut self) {
        self.emit(MonitorNotification::MalformedFrame);
    }

    fn on_service_unsupported(&mut self, kind: ErrorKind) {
        self.emit(MonitorNotification::ServiceUnsupported(kind));
    }
}
