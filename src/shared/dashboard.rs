//! Live sector dashboard.
//!
//! Every cycle re-resolves the sector's devices, aggregates their readings
//! and redraws the whole table. Rows keep registry order.

use std::collections::HashMap;
use std::io::Write;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::domain::{AggregateSnapshot, Device, DeviceFilter};
use crate::error::{ErrorKind, TelemetryError};
use crate::retry::{sleep_or_cancel, Backoff};
use crate::status::{DeviceStatus, Thresholds};
use crate::store::{with_timeout, DeviceRegistry, ReadingStore};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const RESET: &str = "\x1b[0m";
const CYAN: &str = "\x1b[36m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const WHITE: &str = "\x1b[37m";

const BANNER_RULE: &str = "=====================================================";
const TABLE_RULE: &str = "-------------------------------------------------------";

#[derive(Debug, Clone, PartialEq)]
pub enum RowState {
    /// No readings stored for the device yet
    AwaitingData,
    Reported {
        status: DeviceStatus,
        snapshot: AggregateSnapshot,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardRow {
    pub device_id: String,
    pub name: String,
    pub state: RowState,
}

/// One refresh worth of dashboard data
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub sector: String,
    pub rows: Vec<DashboardRow>,
    /// Sum of counts over the sector's devices
    pub total_readings: u64,
}

impl DashboardView {
    pub fn row(&self, device_id: &str) -> Option<&DashboardRow> {
        self.rows.iter().find(|row| row.device_id == device_id)
    }
}

/// Join registry rows with their aggregates and classify them
pub fn build_view(
    sector: &str,
    devices: &[Device],
    snapshots: &HashMap<String, AggregateSnapshot>,
    thresholds: &Thresholds,
) -> DashboardView {
    let rows: Vec<DashboardRow> = devices
        .iter()
        .map(|device| {
            let state = match snapshots.get(&device.device_id) {
                Some(snapshot) => RowState::Reported {
                    status: thresholds.classify(snapshot.last),
                    snapshot: *snapshot,
                },
                None => RowState::AwaitingData,
            };

            DashboardRow {
                device_id: device.device_id.clone(),
                name: device.name.clone(),
                state,
            }
        })
        .collect();

    let total_readings = rows
        .iter()
        .map(|row| match &row.state {
            RowState::Reported { snapshot, .. } => snapshot.count,
            RowState::AwaitingData => 0,
        })
        .sum();

    DashboardView {
        sector: sector.to_string(),
        rows,
        total_readings,
    }
}

/// Render a view as terminal text, with ANSI colours when `color` is set
pub fn render(view: &DashboardView, color: bool) -> String {
    let paint = |code: &'static str| if color { code } else { "" };
    let mut screen = String::new();

    screen.push_str(&format!("{}{}\n", paint(CYAN), BANNER_RULE));
    screen.push_str(&format!(
        "   LIVE DASHBOARD - {}\n",
        view.sector.to_uppercase()
    ));
    screen.push_str(&format!("{}{}\n", BANNER_RULE, paint(RESET)));
    screen.push_str(&format!(
        "{}Readings analysed: {}{}\n",
        paint(YELLOW),
        view.total_readings,
        paint(RESET)
    ));
    screen.push_str(TABLE_RULE);
    screen.push('\n');
    screen.push_str(&format!(
        "{:<15} | {:<10} | {:<10} | {}\n",
        "SENSOR", "STATUS", "AVERAGE", "LAST READING"
    ));
    screen.push_str(TABLE_RULE);
    screen.push('\n');

    for row in &view.rows {
        let (code, line) = match &row.state {
            RowState::Reported { status, snapshot } => (
                status_color(*status),
                format!(
                    "{:<15} | {:<10} | {:<10} | {:.1} (n={})",
                    row.name,
                    status.label(),
                    format!("{:.1}", snapshot.average),
                    snapshot.last,
                    snapshot.count
                ),
            ),
            RowState::AwaitingData => (WHITE, format!("{:<15} | AWAITING DATA...", row.name)),
        };
        screen.push_str(&format!("{}{}{}\n", paint(code), line, paint(RESET)));
    }

    screen.push('\n');
    screen.push_str(TABLE_RULE);
    screen.push('\n');
    screen.push_str("Press Ctrl+C to stop the dashboard.\n");
    screen
}

fn status_color(status: DeviceStatus) -> &'static str {
    match status {
        DeviceStatus::Normal => GREEN,
        DeviceStatus::Alert => YELLOW,
        DeviceStatus::Danger => RED,
    }
}

pub struct Dashboard<'a> {
    registry: &'a dyn DeviceRegistry,
    store: &'a dyn ReadingStore,
    settings: &'a Settings,
}

impl<'a> Dashboard<'a> {
    pub fn new(
        registry: &'a dyn DeviceRegistry,
        store: &'a dyn ReadingStore,
        settings: &'a Settings,
    ) -> Self {
        Self {
            registry,
            store,
            settings,
        }
    }

    /// Resolve the sector and aggregate its devices
    ///
    /// A sector without devices is a configuration error.
    pub async fn refresh(&self) -> Result<DashboardView, TelemetryError> {
        let sector = &self.settings.target_sector;
        let devices = with_timeout(
            self.settings.store_timeout,
            self.registry.list_devices(&DeviceFilter::sector(sector.clone())),
        )
        .await?;

        if devices.is_empty() {
            return Err(TelemetryError::Configuration(format!(
                "No devices in {}; run the seeder first",
                sector
            )));
        }

        let device_ids: Vec<String> = devices.iter().map(|d| d.device_id.clone()).collect();
        // Bounded per round trip by the store; the whole fold outgrows one timeout
        let snapshots = self.store.aggregate(&device_ids).await?;

        Ok(build_view(
            sector,
            &devices,
            &snapshots,
            &self.settings.thresholds,
        ))
    }

    /// Redraw into `out` every interval until `cancel` fires
    ///
    /// Returns the number of frames drawn. Store failures keep the last
    /// frame on screen and retry after a backoff; configuration and output
    /// errors end the loop.
    pub async fn run<W: Write>(
        &self,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<u64, TelemetryError> {
        let mut backoff = Backoff::new(self.settings.retry);
        let mut frames = 0u64;

        loop {
            let refreshed = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.refresh() => result,
            };

            let delay = match refreshed {
                Ok(view) => {
                    backoff.reset();
                    write!(
                        out,
                        "{}{}",
                        CLEAR_SCREEN,
                        render(&view, self.settings.dashboard_color)
                    )?;
                    out.flush()?;
                    frames += 1;
                    debug!(
                        frame = frames,
                        devices = view.rows.len(),
                        total = view.total_readings,
                        "Dashboard refreshed"
                    );
                    self.settings.dashboard_interval
                }
                Err(e) if matches!(e.kind(), ErrorKind::StoreIo | ErrorKind::DataIntegrity) => {
                    let delay = backoff.next_delay();
                    warn!(
                        error = %e,
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Dashboard refresh failed, retrying"
                    );
                    delay
                }
                Err(e) => return Err(e),
            };

            if !sleep_or_cancel(cancel, delay).await {
                break;
            }
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Reading;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Reading store whose aggregation pages through its history one
    /// short round trip at a time
    struct PagedStore {
        inner: MemoryStore,
        pages: u32,
        page_delay: Duration,
    }

    #[async_trait]
    impl ReadingStore for PagedStore {
        async fn insert_many(&self, readings: &[Reading]) -> Result<usize, StoreError> {
            self.inner.insert_many(readings).await
        }

        async fn aggregate(
            &self,
            device_ids: &[String],
        ) -> Result<HashMap<String, AggregateSnapshot>, StoreError> {
            for _ in 0..self.pages {
                tokio::time::sleep(self.page_delay).await;
            }
            self.inner.aggregate(device_ids).await
        }
    }

    fn device(id: &str, name: &str, sector: &str) -> Device {
        Device {
            device_id: id.to_string(),
            name: name.to_string(),
            sector: sector.to_string(),
            sensor_type: "Temperature".to_string(),
            status: "active".to_string(),
        }
    }

    fn snapshot(average: f64, last: f64, count: u64) -> AggregateSnapshot {
        AggregateSnapshot {
            average,
            last,
            count,
        }
    }

    #[test]
    fn test_build_view_classifies_and_totals() {
        let devices = vec![
            device("a", "Sensor-01", "Sector A"),
            device("b", "Sensor-02", "Sector A"),
            device("c", "Sensor-03", "Sector A"),
        ];
        let mut snapshots = HashMap::new();
        snapshots.insert("a".to_string(), snapshot(55.0, 85.5, 4));
        snapshots.insert("c".to_string(), snapshot(40.0, 60.0, 2));

        let view = build_view("Sector A", &devices, &snapshots, &Thresholds::default());

        assert_eq!(view.total_readings, 6);
        assert_eq!(view.rows.len(), 3);
        assert_eq!(
            view.row("a").unwrap().state,
            RowState::Reported {
                status: DeviceStatus::Danger,
                snapshot: snapshot(55.0, 85.5, 4),
            }
        );
        assert_eq!(view.row("b").unwrap().state, RowState::AwaitingData);
        assert!(matches!(
            view.row("c").unwrap().state,
            RowState::Reported {
                status: DeviceStatus::Normal,
                ..
            }
        ));

        let names: Vec<&str> = view.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Sensor-01", "Sensor-02", "Sensor-03"]);
    }

    #[test]
    fn test_render_plain() {
        let devices = vec![
            device("a", "Sensor-01", "Sector A"),
            device("b", "Sensor-02", "Sector A"),
        ];
        let mut snapshots = HashMap::new();
        snapshots.insert("a".to_string(), snapshot(61.24, 70.04, 3));
        let view = build_view("Sector A", &devices, &snapshots, &Thresholds::default());

        let screen = render(&view, false);

        assert!(!screen.contains('\x1b'));
        assert!(screen.contains("LIVE DASHBOARD - SECTOR A"));
        assert!(screen.contains("Readings analysed: 3"));
        assert!(screen.contains("SENSOR          | STATUS     | AVERAGE    | LAST READING"));
        assert!(screen.contains("Sensor-01       | ALERT      | 61.2       | 70.0 (n=3)"));
        assert!(screen.contains("Sensor-02       | AWAITING DATA..."));
        assert!(screen.contains("Ctrl+C"));
    }

    #[test]
    fn test_render_colors_rows_by_status() {
        let devices = vec![
            device("a", "Sensor-01", "Sector A"),
            device("b", "Sensor-02", "Sector A"),
        ];
        let mut snapshots = HashMap::new();
        snapshots.insert("a".to_string(), snapshot(90.0, 90.0, 1));
        let view = build_view("Sector A", &devices, &snapshots, &Thresholds::default());

        let screen = render(&view, true);

        assert!(screen.contains(&format!("{}Sensor-01", RED)));
        assert!(screen.contains(&format!("{}Sensor-02", WHITE)));
    }

    #[tokio::test]
    async fn test_refresh_empty_sector_is_configuration_error() {
        let store = MemoryStore::with_devices(vec![device("a", "Sensor-01", "Sector B")]);
        let settings = Settings::default();
        let dashboard = Dashboard::new(&store, &store, &settings);

        let err = dashboard.refresh().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_run_empty_sector_draws_nothing() {
        let store = MemoryStore::new();
        let settings = Settings::default();
        let dashboard = Dashboard::new(&store, &store, &settings);
        let mut out: Vec<u8> = Vec::new();

        let result = dashboard.run(&mut out, &CancellationToken::new()).await;

        assert!(matches!(result, Err(TelemetryError::Configuration(_))));
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_after_store_failure() {
        let store = MemoryStore::with_devices(vec![device("a", "Sensor-01", "Sector A")]);
        store
            .insert_many(&[Reading {
                device_id: "a".to_string(),
                reading_id: "r1".to_string(),
                timestamp_ms: 1,
                value: 42.0,
                kind: "real-time-read".to_string(),
            }])
            .await
            .unwrap();
        store.inject_failure(StoreError::Timeout(Duration::from_secs(5)));

        let settings = Settings {
            dashboard_color: false,
            ..Settings::default()
        };
        let dashboard = Dashboard::new(&store, &store, &settings);
        let cancel = CancellationToken::new();
        let mut out: Vec<u8> = Vec::new();

        // Failure at t=0, retry after 1s succeeds, next frame would be at 3s
        let (frames, _) = tokio::join!(dashboard.run(&mut out, &cancel), async {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            cancel.cancel();
        });

        assert_eq!(frames.unwrap(), 1);
        let screen = String::from_utf8(out).unwrap();
        assert!(screen.starts_with(CLEAR_SCREEN));
        assert!(screen.contains("Sensor-01       | NORMAL     | 42.0       | 42.0 (n=1)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_survives_aggregation_longer_than_store_timeout() {
        let registry = MemoryStore::with_devices(vec![device("a", "Sensor-01", "Sector A")]);
        let inner = MemoryStore::new();
        inner
            .insert_many(&[Reading {
                device_id: "a".to_string(),
                reading_id: "r1".to_string(),
                timestamp_ms: 1,
                value: 65.0,
                kind: "real-time-read".to_string(),
            }])
            .await
            .unwrap();

        let settings = Settings {
            store_timeout: Duration::from_millis(500),
            ..Settings::default()
        };
        // Each page fits the timeout, all ten together take 2s
        let store = PagedStore {
            inner,
            pages: 10,
            page_delay: Duration::from_millis(200),
        };
        let dashboard = Dashboard::new(&registry, &store, &settings);

        let view = dashboard.refresh().await.unwrap();

        assert_eq!(view.total_readings, 1);
        assert!(matches!(
            view.row("a").unwrap().state,
            RowState::Reported {
                status: DeviceStatus::Alert,
                ..
            }
        ));
    }
}
