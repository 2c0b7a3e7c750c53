//! End-to-end runs of the monitor event loop against the scripted adapter

use std::time::Duration;

use heart_rate_monitor_lib::core::bluetooth::{
    AdapterRequest, ChannelSink, ConnectionState, FakeAdapter, FakePeripheral, HeartRateMonitor,
    MonitorNotification, Timeouts, UUID_HEART_RATE_MEASUREMENT, UUID_HEART_RATE_SERVICE,
};
use heart_rate_monitor_lib::core::heart_rate::{encode, HeartRateReading};
use heart_rate_monitor_lib::ErrorKind;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

const TIMEOUTS: Timeouts = Timeouts {
    scan: Duration::from_secs(10),
    connect: Duration::from_secs(5),
};

const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

fn spawn_monitor(
    peripheral: FakePeripheral,
) -> (
    heart_rate_monitor_lib::core::MonitorHandle,
    tokio::task::JoinHandle<heart_rate_monitor_lib::core::bluetooth::Orchestrator<FakeAdapter, ChannelSink>>,
    UnboundedReceiver<MonitorNotification>,
) {
    let (sink, notifications) = ChannelSink::channel();
    let monitor = HeartRateMonitor::with_adapter(
        |events| FakeAdapter::scripted(peripheral, events),
        sink,
        TIMEOUTS,
    );
    assert_eq!(monitor.state(), &ConnectionState::Idle);
    let handle = monitor.handle();
    (handle, tokio::spawn(monitor.run()), notifications)
}

async fn next(notifications: &mut UnboundedReceiver<MonitorNotification>) -> MonitorNotification {
    tokio::time::timeout(Duration::from_secs(120), notifications.recv())
        .await
        .expect("monitor went quiet")
        .expect("sink dropped")
}

#[tokio::test(start_paused = true)]
async fn streams_readings_until_sensor_disconnects() {
    let second = HeartRateReading {
        beats_per_minute: 72,
        energy_expended_kj: Some(15),
        rr_intervals_ms: vec![1000, 500],
        sensor_contact: Some(true),
    };
    let sensor = FakePeripheral::heart_rate_sensor("dev-1", "Polar H10")
        .with_frames(vec![vec![0x00, 0x3C], encode(&second), vec![0x01]])
        .disconnecting_after_frames();
    let (handle, task, mut notifications) = spawn_monitor(sensor);

    handle.start_scan().unwrap();

    match next(&mut notifications).await {
        MonitorNotification::Reading(reading) => {
            assert_eq!(reading.beats_per_minute, 60);
            assert_eq!(reading.energy_expended_kj, None);
            assert!(reading.rr_intervals_ms.is_empty());
        }
        other => panic!("expected a reading, got {:?}", other),
    }
    assert_eq!(next(&mut notifications).await, MonitorNotification::Reading(second));
    assert_eq!(next(&mut notifications).await, MonitorNotification::MalformedFrame);
    assert_eq!(next(&mut notifications).await, MonitorNotification::Disconnected);

    handle.shutdown().unwrap();
    let orchestrator = task.await.unwrap();
    assert_eq!(orchestrator.state(), &ConnectionState::Idle);

    let requests = orchestrator.adapter().requests();
    let connects = requests
        .iter()
        .filter(|r| matches!(r, AdapterRequest::Connect(_)))
        .count();
    assert_eq!(connects, 1, "duplicate advertisements must not trigger a second connect");
    assert!(requests.contains(&AdapterRequest::SetNotifyEnabled {
        characteristic: UUID_HEART_RATE_MEASUREMENT,
        enabled: true,
    }));
    // the reported loss is followed by an explicit release of the link
    assert_eq!(requests.last(), Some(&AdapterRequest::Disconnect("dev-1".to_string())));

    drop(orchestrator);
    assert_eq!(notifications.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn reports_scan_timeout_once() {
    let (handle, task, mut notifications) =
        spawn_monitor(FakePeripheral::heart_rate_sensor("dev-1", "Strap").silent());

    handle.start_scan().unwrap();
    assert_eq!(next(&mut notifications).await, MonitorNotification::ScanTimeout);

    // nothing else is pending once the scan has timed out
    let quiet = tokio::time::timeout(Duration::from_secs(60), notifications.recv()).await;
    assert!(quiet.is_err());

    handle.shutdown().unwrap();
    let orchestrator = task.await.unwrap();
    assert!(orchestrator
        .adapter()
        .requests()
        .contains(&AdapterRequest::StopDiscovery));
}

#[tokio::test(start_paused = true)]
async fn reports_connect_timeout_and_cancels_link() {
    let (handle, task, mut notifications) =
        spawn_monitor(FakePeripheral::heart_rate_sensor("dev-1", "Strap").unresponsive());

    handle.start_scan().unwrap();
    assert_eq!(next(&mut notifications).await, MonitorNotification::ConnectTimeout);

    handle.shutdown().unwrap();
    let orchestrator = task.await.unwrap();
    assert_eq!(
        orchestrator.adapter().requests().last(),
        Some(&AdapterRequest::Disconnect("dev-1".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn sensor_without_heart_rate_service_is_rejected() {
    // advertises heart rate but only exposes a battery service once connected
    let sensor = FakePeripheral::heart_rate_sensor("dev-1", "Odd Strap")
        .with_services(vec![BATTERY_SERVICE]);
    let (handle, task, mut notifications) = spawn_monitor(sensor);

    handle.start_scan().unwrap();
    assert_eq!(
        next(&mut notifications).await,
        MonitorNotification::ServiceUnsupported(ErrorKind::ServiceNotFound)
    );
    // the link released on failure is still reported
    assert_eq!(next(&mut notifications).await, MonitorNotification::Disconnected);

    handle.shutdown().unwrap();
    let orchestrator = task.await.unwrap();
    assert!(orchestrator
        .adapter()
        .requests()
        .iter()
        .all(|r| !matches!(r, AdapterRequest::DiscoverCharacteristics { .. })));
}

#[tokio::test(start_paused = true)]
async fn sensor_without_measurement_characteristic_is_rejected() {
    let sensor = FakePeripheral::heart_rate_sensor("dev-1", "Odd Strap")
        .with_characteristics(vec![(BATTERY_SERVICE, UUID_HEART_RATE_MEASUREMENT, true)]);
    let (handle, task, mut notifications) = spawn_monitor(sensor);

    handle.start_scan().unwrap();
    assert_eq!(
        next(&mut notifications).await,
        MonitorNotification::ServiceUnsupported(ErrorKind::CharacteristicNotFound)
    );
    assert_eq!(next(&mut notifications).await, MonitorNotification::Disconnected);

    handle.shutdown().unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn rescan_after_disconnect_reconnects() {
    let sensor = FakePeripheral::heart_rate_sensor("dev-1", "Polar H10")
        .with_frames(vec![vec![0x00, 0x50]])
        .disconnecting_after_frames();
    let (handle, task, mut notifications) = spawn_monitor(sensor);

    for _ in 0..2 {
        handle.start_scan().unwrap();
        match next(&mut notifications).await {
            MonitorNotification::Reading(reading) => assert_eq!(reading.beats_per_minute, 80),
            other => panic!("expected a reading, got {:?}", other),
        }
        assert_eq!(next(&mut notifications).await, MonitorNotification::Disconnected);
    }

    handle.shutdown().unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_scan_from_handle_returns_to_idle() {
    let (handle, task, mut notifications) =
        spawn_monitor(FakePeripheral::heart_rate_sensor("dev-1", "Strap").silent());

    handle.start_scan().unwrap();
    handle.stop_scan().unwrap();
    let quiet = tokio::time::timeout(Duration::from_secs(60), notifications.recv()).await;
    assert!(quiet.is_err(), "stopped scan must not time out");

    handle.shutdown().unwrap();
    let orchestrator = task.await.unwrap();
    assert_eq!(
        orchestrator.adapter().requests(),
        &[
            AdapterRequest::StartDiscovery(UUID_HEART_RATE_SERVICE),
            AdapterRequest::StopDiscovery,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn handle_fails_after_monitor_stops() {
    let (handle, task, _notifications) =
        spawn_monitor(FakePeripheral::heart_rate_sensor("dev-1", "Strap"));

    handle.shutdown().unwrap();
    let orchestrator = task.await.unwrap();
    drop(orchestrator);
    assert!(handle.start_scan().is_err());
}
