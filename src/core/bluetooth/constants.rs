//! Constants used throughout the application
//! This module contains the GATT identifiers of the Heart Rate profile and the
//! default timeout values.

use uuid::Uuid;

/// Heart Rate Service (0x180D)
pub const UUID_HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);

/// Heart Rate Measurement characteristic (0x2A37)
pub const UUID_HEART_RATE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

/// Name reported for peripherals that do not advertise one
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown";

/// Default time allowed for a scan to find a peripheral, in seconds
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 10;

/// Default time allowed for a connection attempt, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default config file name used by the binary
pub const DEFAULT_CONFIG_FILE_NAME: &str = "heart_rate_monitor.json";
