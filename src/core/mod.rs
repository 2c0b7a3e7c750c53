//! Core functionality for the heart rate monitor
//! This module contains the BLE client and the measurement decoder

pub mod bluetooth;
pub mod heart_rate;

// Re-export commonly used types
pub use bluetooth::{HeartRateMonitor, MonitorHandle};
pub use heart_rate::HeartRateReading;
