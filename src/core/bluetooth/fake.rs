//! Scripted in-memory adapter
//! Records every request it receives and, when given a [`FakePeripheral`],
//! answers them the way a well-behaved heart rate sensor would.

use log::debug;
use uuid::Uuid;

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::constants::{UUID_HEART_RATE_MEASUREMENT, UUID_HEART_RATE_SERVICE};
use crate::core::bluetooth::events::{AdapterEvent, EventSender};
use crate::core::bluetooth::types::{CharacteristicInfo, PeripheralHandle, ScanFilter, ServiceInfo};

/// A request received by [`FakeAdapter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterRequest {
    StartDiscovery(Uuid),
    StopDiscovery,
    Connect(String),
    Disconnect(String),
    DiscoverServices { peripheral: String, services: Vec<Uuid> },
    DiscoverCharacteristics { service: Uuid, characteristics: Vec<Uuid> },
    SetNotifyEnabled { characteristic: Uuid, enabled: bool },
}

/// Behaviour of the simulated sensor
#[derive(Debug, Clone)]
pub struct FakePeripheral {
    pub handle: PeripheralHandle,
    pub advertises: bool,
    pub answers_connect: bool,
    pub services: Vec<Uuid>,
    /// (service, characteristic, notify-capable)
    pub characteristics: Vec<(Uuid, Uuid, bool)>,
    /// Values delivered once notifications are enabled
    pub frames: Vec<Vec<u8>>,
    /// Drop the link after the last frame
    pub disconnect_after_frames: bool,
}

impl FakePeripheral {
    /// A sensor exposing the Heart Rate service and a notifying measurement characteristic
    pub fn heart_rate_sensor(id: &str, name: &str) -> Self {
        Self {
            handle: PeripheralHandle::new(id, name),
            advertises: true,
            answers_connect: true,
            services: vec![UUID_HEART_RATE_SERVICE],
            characteristics: vec![(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT, true)],
            frames: Vec::new(),
            disconnect_after_frames: false,
        }
    }

    pub fn with_frames(mut self, frames: Vec<Vec<u8>>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_services(mut self, services: Vec<Uuid>) -> Self {
        self.services = services;
        self
    }

    pub fn with_characteristics(mut self, characteristics: Vec<(Uuid, Uuid, bool)>) -> Self {
        self.characteristics = characteristics;
        self
    }

    pub fn silent(mut self) -> Self {
        self.advertises = false;
        self
    }

    pub fn unresponsive(mut self) -> Self {
        self.answers_connect = false;
        self
    }

    pub fn disconnecting_after_frames(mut self) -> Self {
        self.disconnect_after_frames = true;
        self
    }
}

struct Script {
    peripheral: FakePeripheral,
    events: EventSender,
    connected: bool,
}

impl Script {
    fn post(&self, event: AdapterEvent) {
        debug!("Fake adapter posting {:?}", event);
        let _ = self.events.send(event.into());
    }
}

/// Adapter double for tests and offline runs
#[derive(Default)]
pub struct FakeAdapter {
    requests: Vec<AdapterRequest>,
    script: Option<Script>,
}

impl FakeAdapter {
    /// An adapter that only records requests
    pub fn new() -> Self {
        Self::default()
    }

    /// An adapter that answers requests on behalf of `peripheral`
    pub fn scripted(peripheral: FakePeripheral, events: EventSender) -> Self {
        Self {
            requests: Vec::new(),
            script: Some(Script {
                peripheral,
                events,
                connected: false,
            }),
        }
    }

    pub fn requests(&self) -> &[AdapterRequest] {
        &self.requests
    }

    pub fn clear_requests(&mut self) {
        self.requests.clear();
    }
}

impl BleAdapter for FakeAdapter {
    fn start_discovery(&mut self, filter: &ScanFilter) {
        self.requests.push(AdapterRequest::StartDiscovery(filter.service));
        if let Some(script) = &self.script {
            let peripheral = &script.peripheral;
            // the advertisement is assumed to match the filter
            if peripheral.advertises {
                // real stacks report the same advertiser repeatedly
                script.post(AdapterEvent::PeripheralDiscovered(peripheral.handle.clone()));
                script.post(AdapterEvent::PeripheralDiscovered(peripheral.handle.clone()));
            }
        }
    }

    fn stop_discovery(&mut self) {
        self.requests.push(AdapterRequest::StopDiscovery);
    }

    fn connect(&mut self, peripheral: &PeripheralHandle) {
        self.requests.push(AdapterRequest::Connect(peripheral.id.clone()));
        if let Some(script) = &mut self.script {
            if script.peripheral.answers_connect && script.peripheral.handle.same_device(peripheral) {
                script.connected = true;
                script.post(AdapterEvent::Connected(peripheral.clone()));
            }
        }
    }

    fn disconnect(&mut self, peripheral: &PeripheralHandle) {
        self.requests.push(AdapterRequest::Disconnect(peripheral.id.clone()));
        if let Some(script) = &mut self.script {
            if script.connected {
                script.connected = false;
                script.post(AdapterEvent::Disconnected(peripheral.id.clone()));
            }
        }
    }

    fn discover_services(&mut self, peripheral: &PeripheralHandle, services: &[Uuid]) {
        self.requests.push(AdapterRequest::DiscoverServices {
            peripheral: peripheral.id.clone(),
            services: services.to_vec(),
        });
        if let Some(script) = &self.script {
            let found = script
                .peripheral
                .services
                .iter()
                .filter(|uuid| services.is_empty() || services.contains(uuid))
                .map(|uuid| ServiceInfo {
                    peripheral_id: peripheral.id.clone(),
                    uuid: *uuid,
                })
                .collect();
            script.post(AdapterEvent::ServicesDiscovered(found));
        }
    }

    fn discover_characteristics(&mut self, service: &ServiceInfo, characteristics: &[Uuid]) {
        self.requests.push(AdapterRequest::DiscoverCharacteristics {
            service: service.uuid,
            characteristics: characteristics.to_vec(),
        });
        if let Some(script) = &self.script {
            let found = script
                .peripheral
                .characteristics
                .iter()
                .filter(|(service_uuid, uuid, _)| {
                    *service_uuid == service.uuid
                        && (characteristics.is_empty() || characteristics.contains(uuid))
                })
                .map(|(service_uuid, uuid, can_notify)| CharacteristicInfo {
                    peripheral_id: service.peripheral_id.clone(),
                    service_uuid: *service_uuid,
                    uuid: *uuid,
                    can_notify: *can_notify,
                })
                .collect();
            script.post(AdapterEvent::CharacteristicsDiscovered(found));
        }
    }

    fn set_notify_enabled(&mut self, characteristic: &CharacteristicInfo, enabled: bool) {
        self.requests.push(AdapterRequest::SetNotifyEnabled {
            characteristic: characteristic.uuid,
            enabled,
        });
        if !enabled {
            return;
        }
        if let Some(script) = &mut self.script {
            script.post(AdapterEvent::NotificationEnabled);
            for frame in &script.peripheral.frames {
                script.post(AdapterEvent::ValueUpdated(frame.clone()));
            }
            if script.peripheral.disconnect_after_frames {
                script.connected = false;
                script.post(AdapterEvent::Disconnected(characteristic.peripheral_id.clone()));
            }
        }
    }
}
