//! Platform Bluetooth adapter backed by bluest
//! Each request spawns a task on the tokio runtime that performs the async
//! platform call and posts the outcome to the monitor queue. Platform errors are
//! logged here and turned into `Disconnected` events; they never reach the caller.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use bluest::{Adapter, Characteristic, Device, Service, Uuid};
use futures_util::{pin_mut, StreamExt};
use log::{debug, error, info, warn};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::constants::UNKNOWN_DEVICE_NAME;
use crate::core::bluetooth::events::{AdapterEvent, EventSender};
use crate::core::bluetooth::types::{CharacteristicInfo, PeripheralHandle, ScanFilter, ServiceInfo};

/// Platform objects shared with the request tasks, looked up by id
struct Registry<K, V> {
    entries: Arc<Mutex<HashMap<K, V>>>,
}

impl<K: Eq + Hash, V: Clone> Registry<K, V> {
    fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn insert(&self, key: K, value: V) {
        lock(&self.entries).insert(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        lock(&self.entries).get(key).cloned()
    }

    fn retain(&self, keep: impl FnMut(&K, &mut V) -> bool) {
        lock(&self.entries).retain(keep);
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }

    fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}

impl<K, V> Clone for Registry<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

type DeviceMap = Registry<String, Device>;
type ServiceMap = Registry<(String, Uuid), Service>;
type CharacteristicMap = Registry<(String, Uuid), Characteristic>;

pub struct BluestAdapter {
    adapter: Adapter,
    events: EventSender,
    /// Devices reported by the scanner, keyed by platform id
    devices: DeviceMap,
    services: ServiceMap,
    characteristics: CharacteristicMap,
    scan_cancel_token: CancellationToken,
    link_cancel_token: CancellationToken,
    notify_cancel_token: CancellationToken,
}

impl BluestAdapter {
    /// Acquires the default adapter and waits until it is powered on
    pub async fn new(events: EventSender) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            adapter,
            events,
            devices: Registry::new(),
            services: Registry::new(),
            characteristics: Registry::new(),
            scan_cancel_token: CancellationToken::new(),
            link_cancel_token: CancellationToken::new(),
            notify_cancel_token: CancellationToken::new(),
        })
    }

    fn post(events: &EventSender, event: AdapterEvent) {
        if events.send(event.into()).is_err() {
            debug!("Monitor queue closed, dropping adapter event");
        }
    }

    fn device(&self, id: &str) -> Option<Device> {
        self.devices.get(&id.to_string())
    }

    /// Stores a device so later requests can find it by id
    fn remember_device(devices: &DeviceMap, device: Device) -> PeripheralHandle {
        let id = device.id().to_string();
        let name = device.name().unwrap_or_else(|_| UNKNOWN_DEVICE_NAME.to_string());
        devices.insert(id.clone(), device);
        PeripheralHandle::new(id, name)
    }

    async fn scan_task(
        adapter: Adapter,
        devices: DeviceMap,
        events: EventSender,
        service: Uuid,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        // a sensor still connected from an earlier session never advertises
        info!("Checking for connected heart rate devices");
        for device in adapter.connected_devices_with_services(&[service]).await? {
            let handle = Self::remember_device(&devices, device);
            info!("Already connected: {}", handle);
            Self::post(&events, AdapterEvent::PeripheralDiscovered(handle));
        }

        info!("Starting bluetooth scan");
        let services = [service];
        let mut scan_stream = adapter.scan(&services).await?;

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered_device) => {
                            let rssi = discovered_device.rssi;
                            let handle = Self::remember_device(&devices, discovered_device.device);
                            debug!(
                                "Found device - {}, Address: {}, RSSI: {:?}",
                                handle,
                                extract_mac_address(&handle.id).unwrap_or_else(|| "N/A".to_string()),
                                rssi
                            );
                            Self::post(&events, AdapterEvent::PeripheralDiscovered(handle));
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    info!("Bluetooth scan stopped.");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn find_services(device: &Device, uuids: &[Uuid]) -> Result<Vec<Service>> {
        if uuids.is_empty() {
            return Ok(device.discover_services().await?);
        }
        let mut services = Vec::new();
        for uuid in uuids {
            services.extend(device.discover_services_with_uuid(*uuid).await?);
        }
        Ok(services)
    }

    async fn find_characteristics(service: &Service, uuids: &[Uuid]) -> Result<Vec<Characteristic>> {
        if uuids.is_empty() {
            return Ok(service.discover_characteristics().await?);
        }
        let mut characteristics = Vec::new();
        for uuid in uuids {
            characteristics.extend(service.discover_characteristics_with_uuid(*uuid).await?);
        }
        Ok(characteristics)
    }

    async fn notification_task(
        peripheral_id: String,
        characteristic: Characteristic,
        events: EventSender,
        cancel_token: CancellationToken,
    ) {
        info!("Subscribing to notifications...");
        let notification_stream = match characteristic.notify().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                Self::post(&events, AdapterEvent::Disconnected(peripheral_id));
                return;
            }
        };
        pin_mut!(notification_stream);
        Self::post(&events, AdapterEvent::NotificationEnabled);

        loop {
            tokio::select! {
                result = notification_stream.next() => {
                    match result {
                        Some(Ok(value)) => {
                            debug!("Received heart rate data: {:02X?}", value);
                            Self::post(&events, AdapterEvent::ValueUpdated(value));
                        }
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
                _ = cancel_token.cancelled() => {
                    info!("Notifications disabled");
                    return;
                }
            }
        }

        // the stream only ends when the link is gone
        info!("Notification stream ended");
        Self::post(&events, AdapterEvent::Disconnected(peripheral_id));
    }
}

impl BleAdapter for BluestAdapter {
    fn start_discovery(&mut self, filter: &ScanFilter) {
        self.scan_cancel_token.cancel();
        self.scan_cancel_token = CancellationToken::new();
        // advertisers from earlier scans are not connected to again
        debug!("Forgetting {} previously seen devices", self.devices.len());
        self.devices.clear();

        let adapter = self.adapter.clone();
        let devices = self.devices.clone();
        let events = self.events.clone();
        let service = filter.service;
        let cancel_token = self.scan_cancel_token.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::scan_task(adapter, devices, events, service, cancel_token).await {
                // the scan timer reports the failure to the monitor
                error!("Scan task finished with an error: {:?}", e);
            }
        });
        info!("Device scan task started.");
    }

    fn stop_discovery(&mut self) {
        info!("Stopping Bluetooth scan.");
        self.scan_cancel_token.cancel();
    }

    fn connect(&mut self, peripheral: &PeripheralHandle) {
        let Some(device) = self.device(&peripheral.id) else {
            warn!("Cannot connect to unknown device {}", peripheral);
            Self::post(&self.events, AdapterEvent::Disconnected(peripheral.id.clone()));
            return;
        };
        self.link_cancel_token = CancellationToken::new();

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let cancel_token = self.link_cancel_token.clone();
        let peripheral = peripheral.clone();

        tokio::spawn(async move {
            info!("Initiating connection to {}...", peripheral);
            tokio::select! {
                result = adapter.connect_device(&device) => {
                    match result {
                        Ok(()) => Self::post(&events, AdapterEvent::Connected(peripheral)),
                        Err(e) => {
                            error!("Error connecting to {}: {}", peripheral, e);
                            Self::post(&events, AdapterEvent::Disconnected(peripheral.id));
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    info!("Connection attempt to {} cancelled", peripheral);
                }
            }
        });
    }

    fn disconnect(&mut self, peripheral: &PeripheralHandle) {
        self.link_cancel_token.cancel();
        self.notify_cancel_token.cancel();
        let Some(device) = self.device(&peripheral.id) else {
            return;
        };
        self.services.retain(|(id, _), _| id != &peripheral.id);
        self.characteristics.retain(|(id, _), _| id != &peripheral.id);

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let peripheral = peripheral.clone();

        tokio::spawn(async move {
            if !device.is_connected().await {
                info!("Device {} not connected", peripheral);
                return;
            }
            info!("Disconnecting from device {}", peripheral);
            match adapter.disconnect_device(&device).await {
                Ok(()) => {
                    info!("Successfully disconnected");
                    Self::post(&events, AdapterEvent::Disconnected(peripheral.id));
                }
                Err(e) => error!("Failed to disconnect from {}: {}", peripheral, e),
            }
        });
    }

    fn discover_services(&mut self, peripheral: &PeripheralHandle, services: &[Uuid]) {
        let Some(device) = self.device(&peripheral.id) else {
            warn!("Cannot discover services of unknown device {}", peripheral);
            Self::post(&self.events, AdapterEvent::Disconnected(peripheral.id.clone()));
            return;
        };

        let service_map = self.services.clone();
        let events = self.events.clone();
        let uuids = services.to_vec();
        let peripheral_id = peripheral.id.clone();

        tokio::spawn(async move {
            match Self::find_services(&device, &uuids).await {
                Ok(found) => {
                    let mut infos = Vec::with_capacity(found.len());
                    for service in found {
                        let uuid = service.uuid();
                        infos.push(ServiceInfo {
                            peripheral_id: peripheral_id.clone(),
                            uuid,
                        });
                        service_map.insert((peripheral_id.clone(), uuid), service);
                    }
                    Self::post(&events, AdapterEvent::ServicesDiscovered(infos));
                }
                Err(e) => {
                    error!("Service discovery failed: {}", e);
                    Self::post(&events, AdapterEvent::Disconnected(peripheral_id));
                }
            }
        });
    }

    fn discover_characteristics(&mut self, service: &ServiceInfo, characteristics: &[Uuid]) {
        let key = (service.peripheral_id.clone(), service.uuid);
        let Some(platform_service) = self.services.get(&key) else {
            warn!("Cannot discover characteristics of unknown service {}", service.uuid);
            Self::post(&self.events, AdapterEvent::CharacteristicsDiscovered(Vec::new()));
            return;
        };

        let characteristic_map = self.characteristics.clone();
        let events = self.events.clone();
        let uuids = characteristics.to_vec();
        let service = service.clone();

        tokio::spawn(async move {
            match Self::find_characteristics(&platform_service, &uuids).await {
                Ok(found) => {
                    let mut infos = Vec::with_capacity(found.len());
                    for characteristic in found {
                        let can_notify = characteristic
                            .properties()
                            .await
                            .map(|p| p.notify || p.indicate)
                            .unwrap_or(false);
                        let uuid = characteristic.uuid();
                        infos.push(CharacteristicInfo {
                            peripheral_id: service.peripheral_id.clone(),
                            service_uuid: service.uuid,
                            uuid,
                            can_notify,
                        });
                        characteristic_map.insert((service.peripheral_id.clone(), uuid), characteristic);
                    }
                    Self::post(&events, AdapterEvent::CharacteristicsDiscovered(infos));
                }
                Err(e) => {
                    error!("Characteristic discovery failed: {}", e);
                    Self::post(&events, AdapterEvent::Disconnected(service.peripheral_id));
                }
            }
        });
    }

    fn set_notify_enabled(&mut self, characteristic: &CharacteristicInfo, enabled: bool) {
        self.notify_cancel_token.cancel();
        if !enabled {
            return;
        }
        let key = (characteristic.peripheral_id.clone(), characteristic.uuid);
        let Some(platform_characteristic) = self.characteristics.get(&key) else {
            warn!("Cannot subscribe to unknown characteristic {}", characteristic.uuid);
            Self::post(&self.events, AdapterEvent::Disconnected(key.0));
            return;
        };
        self.notify_cancel_token = CancellationToken::new();

        let events = self.events.clone();
        let cancel_token = self.notify_cancel_token.clone();
        tokio::spawn(Self::notification_task(
            characteristic.peripheral_id.clone(),
            platform_characteristic,
            events,
            cancel_token,
        ));
    }
}

impl Drop for BluestAdapter {
    fn drop(&mut self) {
        self.scan_cancel_token.cancel();
        self.link_cancel_token.cancel();
        self.notify_cancel_token.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pulls a MAC address out of a platform device id, where the platform embeds one
fn extract_mac_address(device_id_str: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id_str).last().map(|m| m.as_str().to_uppercase())
}
