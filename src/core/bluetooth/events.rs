//! Events consumed by the monitor's serialized event loop

use tokio::sync::mpsc;

use crate::core::bluetooth::types::{CharacteristicInfo, PeripheralHandle, ServiceInfo};

/// Completions and notifications reported by a Bluetooth adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    PeripheralDiscovered(PeripheralHandle),
    Connected(PeripheralHandle),
    ServicesDiscovered(Vec<ServiceInfo>),
    CharacteristicsDiscovered(Vec<CharacteristicInfo>),
    NotificationEnabled,
    ValueUpdated(Vec<u8>),
    /// The link to the peripheral with this id is gone or was never established
    Disconnected(String),
}

/// The state a timer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Scan,
    Connect,
}

/// Requests issued by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    StartScan,
    StopScan,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    Adapter(AdapterEvent),
    TimerExpired { kind: TimerKind, id: u64 },
    Command(MonitorCommand),
}

impl From<AdapterEvent> for MonitorEvent {
    fn from(event: AdapterEvent) -> Self {
        MonitorEvent::Adapter(event)
    }
}

impl From<MonitorCommand> for MonitorEvent {
    fn from(command: MonitorCommand) -> Self {
        MonitorEvent::Command(command)
    }
}

pub type EventSender = mpsc::UnboundedSender<MonitorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<MonitorEvent>;

/// Creates the queue shared by the adapter, the timers and the monitor
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
