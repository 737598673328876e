//! Store contracts consumed by the producer and dashboard.
//!
//! The registry is read-only from the pipeline's point of view; only the
//! seeding collaborator uses [`FleetAdmin`]. Handles are constructed
//! explicitly and passed in; there is no process-wide connection.

pub mod dynamo;
pub mod memory;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AggregateSnapshot, Device, DeviceFilter, Reading};
use crate::error::StoreError;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

/// Read path of the device registry
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// List devices matching `filter` in a stable order
    async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError>;
}

/// Append-only reading store with the per-device aggregation query
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Append the whole batch atomically; returns the number written
    async fn insert_many(&self, readings: &[Reading]) -> Result<usize, StoreError>;

    /// Aggregate readings for the given devices; devices without data are absent
    ///
    /// Implementations bound each underlying round trip themselves. The
    /// total duration grows with the stored history.
    async fn aggregate(
        &self,
        device_ids: &[String],
    ) -> Result<HashMap<String, AggregateSnapshot>, StoreError>;
}

/// Write path used only by the seeding collaborator
#[async_trait]
pub trait FleetAdmin: Send + Sync {
    /// Delete every device and reading
    async fn reset(&self) -> Result<(), StoreError>;

    async fn insert_devices(&self, devices: &[Device]) -> Result<usize, StoreError>;
}

/// Run a store call with an upper bound on its duration
///
/// Expiry is reported as [`StoreError::Timeout`], which callers retry.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Reject batches the store must not accept in part
pub(crate) fn validate_batch(readings: &[Reading]) -> Result<(), StoreError> {
    if readings.is_empty() {
        return Err(StoreError::InvalidBatch("batch is empty".to_string()));
    }

    for reading in readings {
        if reading.device_id.is_empty() {
            return Err(StoreError::InvalidBatch(format!(
                "reading {} has no device_id",
                reading.reading_id
            )));
        }
        if !reading.value.is_finite() {
            return Err(StoreError::InvalidBatch(format!(
                "reading {} has non-finite value",
                reading.reading_id
            )));
        }
    }

    Ok(())
}
