pub mod monitor_config;

pub use monitor_config::{ConfigSource, MonitorConfig};
