//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorKind;

/// Service a scan is restricted to. Fixed for the lifetime of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanFilter {
    pub service: Uuid,
}

impl ScanFilter {
    pub fn new(service: Uuid) -> Self {
        Self { service }
    }
}

/// A discovered peripheral, as reported by the adapter.
/// The adapter may report the same device many times; handles with equal ids
/// refer to the same device.
#[derive(Debug, Clone, Serialize)]
pub struct PeripheralHandle {
    /// Platform-specific unique identifier for the device
    pub id: String,
    /// The advertised name of the device
    pub name: String,
}

impl PeripheralHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Returns true if both handles refer to the same device
    pub fn same_device(&self, other: &PeripheralHandle) -> bool {
        self.id == other.id
    }
}

impl PartialEq for PeripheralHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_device(other)
    }
}

impl Eq for PeripheralHandle {}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// A GATT service discovered on a peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub peripheral_id: String,
    pub uuid: Uuid,
}

/// A GATT characteristic discovered on a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub peripheral_id: String,
    pub service_uuid: Uuid,
    pub uuid: Uuid,
    /// Whether the characteristic supports notifications or indications
    pub can_notify: bool,
}

/// Connection lifecycle of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting(PeripheralHandle),
    DiscoveringServices,
    DiscoveringCharacteristics,
    Subscribing,
    Streaming,
    Disconnected,
    Failed(ErrorKind),
}

impl ConnectionState {
    /// States from which a fresh scan may be started
    pub fn can_start_scan(&self) -> bool {
        matches!(
            self,
            ConnectionState::Idle | ConnectionState::Disconnected | ConnectionState::Failed(_)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Scanning => write!(f, "scanning"),
            ConnectionState::Connecting(peripheral) => write!(f, "connecting to {}", peripheral),
            ConnectionState::DiscoveringServices => write!(f, "discovering services"),
            ConnectionState::DiscoveringCharacteristics => write!(f, "discovering characteristics"),
            ConnectionState::Subscribing => write!(f, "subscribing"),
            ConnectionState::Streaming => write!(f, "streaming"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed(kind) => write!(f, "failed: {}", kind),
        }
    }
}
