//! Bluetooth functionality for the heart rate monitor
//! This module handles scanning for, connecting to, and streaming measurements
//! from a heart rate sensor.

mod adapter;
mod bluest_adapter;
mod constants;
mod events;
mod fake;
mod monitor;
mod orchestrator;
mod session;
mod sink;
mod timer;
mod types;

// Re-export types that should be publicly accessible
pub use adapter::BleAdapter;
pub use bluest_adapter::BluestAdapter;
pub use constants::*; // Re-export all constants
pub use events::{event_channel, AdapterEvent, EventReceiver, EventSender, MonitorCommand, MonitorEvent, TimerKind};
pub use fake::{AdapterRequest, FakeAdapter, FakePeripheral};
pub use monitor::{HeartRateMonitor, MonitorHandle};
pub use orchestrator::Orchestrator;
pub use session::{PeripheralSession, Subscription};
pub use sink::{ChannelSink, EventSink, MonitorNotification};
pub use timer::{ScopedTimer, Timeouts};
pub use types::{CharacteristicInfo, ConnectionState, PeripheralHandle, ScanFilter, ServiceInfo};
