//! The Bluetooth central capabilities the monitor depends on

use uuid::Uuid;

use crate::core::bluetooth::types::{CharacteristicInfo, PeripheralHandle, ScanFilter, ServiceInfo};

/// Capability surface of a BLE central stack.
///
/// Every method is a fire-and-forget request: it must return without blocking,
/// and its outcome is reported later as an
/// [`AdapterEvent`](crate::core::bluetooth::AdapterEvent) on the monitor queue.
/// Failures are never returned from these calls.
pub trait BleAdapter {
    /// Begin reporting peripherals that advertise the filtered service
    fn start_discovery(&mut self, filter: &ScanFilter);

    fn stop_discovery(&mut self);

    fn connect(&mut self, peripheral: &PeripheralHandle);

    /// Drop the link, or cancel a pending connection attempt
    fn disconnect(&mut self, peripheral: &PeripheralHandle);

    /// Discover the given services; an empty list means all services
    fn discover_services(&mut self, peripheral: &PeripheralHandle, services: &[Uuid]);

    /// Discover the given characteristics; an empty list means all characteristics
    fn discover_characteristics(&mut self, service: &ServiceInfo, characteristics: &[Uuid]);

    fn set_notify_enabled(&mut self, characteristic: &CharacteristicInfo, enabled: bool);
}
