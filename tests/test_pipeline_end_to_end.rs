// End-to-end tests for the producer -> store -> dashboard pipeline
//
// These tests run both halves against the in-memory store:
// - One batch with known values classifies as normal/alert/danger
// - A sector with no devices stops the dashboard before anything is drawn
// - Devices without readings render as awaiting data

use std::time::Duration;

use fleet_telemetry::{
    Dashboard, Device, DeviceStatus, ErrorKind, FixedClock, MemoryStore, Producer, RowState,
    SequentialIdGenerator, Settings,
};
use tokio_util::sync::CancellationToken;

fn sector_device(id: &str, name: &str, sector: &str) -> Device {
    Device {
        device_id: id.to_string(),
        name: name.to_string(),
        sector: sector.to_string(),
        sensor_type: "Temperature".to_string(),
        status: "active".to_string(),
    }
}

fn sector_x_settings() -> Settings {
    Settings {
        target_sector: "X".to_string(),
        dashboard_color: false,
        ..Settings::default()
    }
}

#[tokio::test]
async fn test_one_batch_classifies_each_device() {
    let store = MemoryStore::with_devices(vec![
        sector_device("d1", "Sensor-01", "X"),
        sector_device("d2", "Sensor-02", "X"),
        sector_device("d3", "Sensor-03", "X"),
        sector_device("d4", "Sensor-04", "Y"),
    ]);
    let clock = FixedClock::from_rfc3339("2024-01-15T10:30:00Z").unwrap();
    let ids = SequentialIdGenerator::new("reading");
    let settings = sector_x_settings();

    let producer = Producer::new(&store, &store, &clock, &ids, &settings);
    let universe = producer.load_universe().await.unwrap();
    let by_id = |id: &str| universe.iter().find(|d| d.device_id == id).unwrap();

    let batch = vec![
        producer.synthesize(by_id("d1"), 30.0),
        producer.synthesize(by_id("d2"), 70.0),
        producer.synthesize(by_id("d3"), 90.0),
    ];
    assert_eq!(producer.publish(&batch).await.unwrap(), 3);

    let dashboard = Dashboard::new(&store, &store, &settings);
    let view = dashboard.refresh().await.unwrap();

    assert_eq!(view.rows.len(), 3);
    assert_eq!(view.total_readings, 3);

    let expected = [
        ("d1", DeviceStatus::Normal, 30.0),
        ("d2", DeviceStatus::Alert, 70.0),
        ("d3", DeviceStatus::Danger, 90.0),
    ];
    for (device_id, expected_status, value) in expected {
        match &view.row(device_id).unwrap().state {
            RowState::Reported { status, snapshot } => {
                assert_eq!(*status, expected_status, "status for {}", device_id);
                assert_eq!(snapshot.count, 1);
                assert_eq!(snapshot.average, snapshot.last);
                assert_eq!(snapshot.last, value);
            }
            RowState::AwaitingData => panic!("{} should have data", device_id),
        }
    }

    let screen = fleet_telemetry::render(&view, false);
    assert!(screen.contains("LIVE DASHBOARD - X"));
    assert!(screen.contains("Sensor-03       | DANGER     | 90.0       | 90.0 (n=1)"));
}

#[tokio::test]
async fn test_empty_sector_terminates_before_refresh_loop() {
    let store = MemoryStore::with_devices(vec![sector_device("d1", "Sensor-01", "Y")]);
    let settings = sector_x_settings();
    let dashboard = Dashboard::new(&store, &store, &settings);
    let mut out: Vec<u8> = Vec::new();

    let result = dashboard.run(&mut out, &CancellationToken::new()).await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.is_fatal());
    assert!(out.is_empty(), "nothing should be drawn for an empty sector");
}

#[tokio::test]
async fn test_devices_without_readings_await_data() {
    let store = MemoryStore::with_devices(vec![
        sector_device("d1", "Sensor-01", "X"),
        sector_device("d2", "Sensor-02", "X"),
    ]);
    let settings = sector_x_settings();
    let dashboard = Dashboard::new(&store, &store, &settings);

    let view = dashboard.refresh().await.unwrap();

    assert_eq!(view.total_readings, 0);
    assert!(view
        .rows
        .iter()
        .all(|row| row.state == RowState::AwaitingData));
    assert!(fleet_telemetry::render(&view, false).contains("Sensor-02       | AWAITING DATA..."));
}

#[tokio::test(start_paused = true)]
async fn test_producer_and_dashboard_run_side_by_side() {
    let store = MemoryStore::with_devices(vec![
        sector_device("d1", "Sensor-01", "X"),
        sector_device("d2", "Sensor-02", "X"),
        sector_device("d3", "Sensor-03", "Y"),
    ]);
    let clock = FixedClock::from_millis(1_705_314_600_000);
    let ids = SequentialIdGenerator::new("reading");
    let settings = sector_x_settings();

    let mut producer = Producer::new(&store, &store, &clock, &ids, &settings);
    let dashboard = Dashboard::new(&store, &store, &settings);
    let cancel = CancellationToken::new();
    let mut out: Vec<u8> = Vec::new();

    let (produced, drawn, _) = tokio::join!(
        producer.run(&cancel),
        dashboard.run(&mut out, &cancel),
        async {
            tokio::time::sleep(Duration::from_millis(4100)).await;
            cancel.cancel();
        },
    );

    // Producer: t=0,500,...,4000 -> 9 batches of all 3 devices
    let stats = produced.unwrap();
    assert_eq!(stats.batches, 9);
    assert_eq!(stats.total_inserted, 27);
    assert_eq!(store.reading_count(), 27);

    // Dashboard: t=0,2000,4000 -> 3 frames
    assert_eq!(drawn.unwrap(), 3);
    let screen = String::from_utf8(out).unwrap();
    assert!(screen.contains("Sensor-01"));
    assert!(!screen.contains("Sensor-03"));
}
