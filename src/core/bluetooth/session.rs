//! Notification subscription for a connected heart rate sensor

use log::{debug, info};

use crate::core::bluetooth::adapter::BleAdapter;
use crate::core::bluetooth::types::{CharacteristicInfo, PeripheralHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    Unsubscribed,
    /// Enable request sent, confirmation not yet received
    Pending,
    Active,
}

/// One connected peripheral and its Heart Rate Measurement characteristic
#[derive(Debug, Clone)]
pub struct PeripheralSession {
    peripheral: PeripheralHandle,
    characteristic: CharacteristicInfo,
    subscription: Subscription,
}

impl PeripheralSession {
    pub fn new(peripheral: PeripheralHandle, characteristic: CharacteristicInfo) -> Self {
        Self {
            peripheral,
            characteristic,
            subscription: Subscription::Unsubscribed,
        }
    }

    pub fn peripheral(&self) -> &PeripheralHandle {
        &self.peripheral
    }

    pub fn characteristic(&self) -> &CharacteristicInfo {
        &self.characteristic
    }

    pub fn subscription(&self) -> Subscription {
        self.subscription
    }

    /// Requests notifications. Returns false if a request is already outstanding
    /// or the subscription is active.
    pub fn subscribe<A: BleAdapter>(&mut self, adapter: &mut A) -> bool {
        if self.subscription != Subscription::Unsubscribed {
            debug!("Subscription for {} already {:?}", self.peripheral, self.subscription);
            return false;
        }
        info!("Subscribing to characteristic {}", self.characteristic.uuid);
        adapter.set_notify_enabled(&self.characteristic, true);
        self.subscription = Subscription::Pending;
        true
    }

    pub fn on_notification_enabled(&mut self) {
        self.subscription = Subscription::Active;
    }

    /// Disables notifications if they were requested
    pub fn unsubscribe<A: BleAdapter>(&mut self, adapter: &mut A) {
        if self.subscription == Subscription::Unsubscribed {
            return;
        }
        info!("Unsubscribing from characteristic {}", self.characteristic.uuid);
        adapter.set_notify_enabled(&self.characteristic, false);
        self.subscription = Subscription::Unsubscribed;
    }

    /// Hands a value update through untouched
    pub fn forward<'a>(&self, value: &'a [u8]) -> &'a [u8] {
        value
    }
}
