//! Synthetic telemetry producer.
//!
//! Loads the device universe once, then repeatedly samples a batch of
//! devices, stamps one reading per device and appends the batch to the
//! reading store in a single atomic call.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::domain::{Device, DeviceFilter, Reading};
use crate::error::{ErrorKind, StoreError, TelemetryError};
use crate::id_generator::IdGenerator;
use crate::retry::{sleep_or_cancel, Backoff};
use crate::store::{with_timeout, DeviceRegistry, ReadingStore};
use crate::time::Clock;

/// Running totals reported by [`Producer::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub batches: u64,
    pub total_inserted: u64,
    /// Batches the store rejected; their readings are not re-sent
    pub dropped_batches: u64,
}

pub struct Producer<'a> {
    registry: &'a dyn DeviceRegistry,
    store: &'a dyn ReadingStore,
    clock: &'a dyn Clock,
    ids: &'a dyn IdGenerator,
    settings: &'a Settings,
    rng: StdRng,
}

impl<'a> Producer<'a> {
    pub fn new(
        registry: &'a dyn DeviceRegistry,
        store: &'a dyn ReadingStore,
        clock: &'a dyn Clock,
        ids: &'a dyn IdGenerator,
        settings: &'a Settings,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            ids,
            settings,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the sampling RNG, e.g. with a seeded one in tests
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Fetch every registered device
    ///
    /// An empty registry means seeding has not happened; that is a
    /// configuration error, not something to wait out.
    pub async fn load_universe(&self) -> Result<Vec<Device>, TelemetryError> {
        let devices = with_timeout(
            self.settings.store_timeout,
            self.registry.list_devices(&DeviceFilter::all()),
        )
        .await?;

        if devices.is_empty() {
            return Err(TelemetryError::Configuration(
                "No devices registered; run the seeder first".to_string(),
            ));
        }

        Ok(devices)
    }

    /// Stamp one reading for `device`
    pub fn synthesize(&self, device: &Device, value: f64) -> Reading {
        Reading {
            device_id: device.device_id.clone(),
            reading_id: self.ids.uuid_v4(),
            timestamp_ms: self.clock.now_millis(),
            value,
            kind: self.settings.reading_kind.clone(),
        }
    }

    /// Sample up to `batch_size` distinct devices and synthesize their readings
    pub fn build_batch(&mut self, universe: &[Device]) -> Vec<Reading> {
        let selected: Vec<&Device> = universe
            .choose_multiple(&mut self.rng, self.settings.batch_size)
            .collect();

        let range = self.settings.value_range;
        let mut batch = Vec::with_capacity(selected.len());
        for device in selected {
            let raw = self.rng.gen_range(range.min..=range.max);
            batch.push(self.synthesize(device, round_to_hundredths(raw)));
        }
        batch
    }

    /// Append a batch; the store must account for every reading
    pub async fn publish(&self, batch: &[Reading]) -> Result<usize, TelemetryError> {
        let inserted =
            with_timeout(self.settings.store_timeout, self.store.insert_many(batch)).await?;

        if inserted != batch.len() {
            return Err(StoreError::Rejected(format!(
                "Store accepted {} of {} readings",
                inserted,
                batch.len()
            ))
            .into());
        }

        Ok(inserted)
    }

    /// Build and publish one batch from the given universe
    pub async fn run_cycle(&mut self, universe: &[Device]) -> Result<usize, TelemetryError> {
        let batch = self.build_batch(universe);
        self.publish(&batch).await
    }

    /// Produce batches until `cancel` fires
    ///
    /// Transient store failures are retried with the same batch after a
    /// backoff. A rejected batch is dropped and the loop moves on. Only
    /// configuration errors end the loop early.
    pub async fn run(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<ProducerStats, TelemetryError> {
        let mut stats = ProducerStats::default();
        let mut backoff = Backoff::new(self.settings.retry);

        let universe = loop {
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(stats),
                result = self.load_universe() => result,
            };

            match attempt {
                Ok(devices) => break devices,
                Err(e) if e.kind() == ErrorKind::StoreIo => {
                    let delay = backoff.next_delay();
                    warn!(
                        error = %e,
                        attempt = backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Device registry unavailable, retrying"
                    );
                    if !sleep_or_cancel(cancel, delay).await {
                        return Ok(stats);
                    }
                }
                Err(e) => return Err(e),
            }
        };

        backoff.reset();
        info!(
            devices = universe.len(),
            batch_size = self.settings.batch_size,
            "Starting telemetry ingestion"
        );

        // Batch awaiting a retry after a transient failure
        let mut pending: Option<Vec<Reading>> = None;

        loop {
            let batch = match pending.take() {
                Some(batch) => batch,
                None => self.build_batch(&universe),
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.publish(&batch) => result,
            };

            let delay = match outcome {
                Ok(inserted) => {
                    backoff.reset();
                    stats.batches += 1;
                    stats.total_inserted += inserted as u64;
                    info!(
                        batch = stats.batches,
                        inserted,
                        total = stats.total_inserted,
                        "Inserted readings"
                    );
                    self.settings.producer_interval
                }
                Err(e) => match e.kind() {
                    ErrorKind::StoreIo => {
                        let delay = backoff.next_delay();
                        warn!(
                            error = %e,
                            attempt = backoff.attempts(),
                            delay_ms = delay.as_millis() as u64,
                            "Store unavailable, retrying batch"
                        );
                        pending = Some(batch);
                        delay
                    }
                    ErrorKind::DataIntegrity => {
                        stats.dropped_batches += 1;
                        error!(error = %e, dropped = batch.len(), "Batch rejected, readings dropped");
                        self.settings.producer_interval
                    }
                    ErrorKind::Configuration | ErrorKind::Output => return Err(e),
                },
            };

            if !sleep_or_cancel(cancel, delay).await {
                break;
            }
        }

        info!(
            batches = stats.batches,
            total = stats.total_inserted,
            dropped = stats.dropped_batches,
            "Producer stopped"
        );
        Ok(stats)
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
