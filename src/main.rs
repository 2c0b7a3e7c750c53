use std::path::PathBuf;

use anyhow::Result;
use heart_rate_monitor_lib::config::{ConfigSource, MonitorConfig};
use heart_rate_monitor_lib::core::bluetooth::{
    event_channel, BluestAdapter, ChannelSink, HeartRateMonitor, MonitorHandle, MonitorNotification,
    DEFAULT_CONFIG_FILE_NAME,
};
use heart_rate_monitor_lib::logging;
use log::{error, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE_NAME));
    // the log level comes from the config, so report its source once logging is up
    let (config, source) = MonitorConfig::load_with_source(&config_path).await?;

    if let Err(e) = logging::init(logging::parse_level(&config.log_level)) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    match source {
        ConfigSource::File => info!("Config loaded from {:?}", config_path),
        ConfigSource::Default => warn!("Config file not found at {:?}, using default.", config_path),
    }

    let (events_tx, events_rx) = event_channel();
    let adapter = BluestAdapter::new(events_tx.clone()).await?;
    let (sink, notifications) = ChannelSink::channel();
    let monitor = HeartRateMonitor::new(adapter, sink, config.timeouts(), (events_tx, events_rx));
    let handle = monitor.handle();

    let monitor_task = tokio::spawn(monitor.run());
    handle.start_scan()?;

    tokio::select! {
        _ = report_notifications(notifications, handle.clone(), &config) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Ctrl-C received, shutting down");
        }
    }

    handle.shutdown()?;
    let orchestrator = monitor_task.await?;
    info!("Monitor finished in state: {}", orchestrator.state());
    Ok(())
}

/// Logs everything the monitor reports and rescans after a lost session when configured
async fn report_notifications(
    mut notifications: UnboundedReceiver<MonitorNotification>,
    handle: MonitorHandle,
    config: &MonitorConfig,
) {
    while let Some(notification) = notifications.recv().await {
        match &notification {
            MonitorNotification::Reading(reading) => match serde_json::to_string(reading) {
                Ok(json) => info!("{}", json),
                Err(e) => error!("Failed to serialize reading {}: {}", reading, e),
            },
            MonitorNotification::MalformedFrame => warn!("Received a malformed heart rate frame"),
            MonitorNotification::ServiceUnsupported(kind) => warn!("Peripheral unsupported: {}", kind),
            MonitorNotification::ScanTimeout => warn!("No heart rate sensor found"),
            MonitorNotification::ConnectTimeout => warn!("Sensor did not accept the connection"),
            MonitorNotification::Disconnected => warn!("Sensor disconnected"),
        }

        let session_lost = matches!(
            notification,
            MonitorNotification::ScanTimeout
                | MonitorNotification::ConnectTimeout
                | MonitorNotification::Disconnected
        );
        if !session_lost {
            continue;
        }
        let Some(delay) = config.rescan_delay() else {
            info!("Rescan disabled, waiting for Ctrl-C");
            continue;
        };
        tokio::time::sleep(delay).await;
        if let Err(e) = handle.start_scan() {
            error!("Failed to restart scan: {}", e);
            return;
        }
    }
}
