use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::aggregation::aggregate_readings;
use crate::domain::{AggregateSnapshot, Device, DeviceFilter, Reading};
use crate::error::StoreError;
use crate::store::{validate_batch, DeviceRegistry, FleetAdmin, ReadingStore};

/// In-process store implementing the full store contract
///
/// Devices are listed in insertion order. Failures can be queued with
/// [`MemoryStore::inject_failure`]; each store call consumes one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: RwLock<Vec<Device>>,
    readings: RwLock<Vec<Reading>>,
    faults: Mutex<VecDeque<StoreError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with devices
    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: RwLock::new(devices),
            ..Self::default()
        }
    }

    /// Make the next store call fail with `error`
    pub fn inject_failure(&self, error: StoreError) {
        lock(&self.faults).push_back(error);
    }

    pub fn reading_count(&self) -> usize {
        read(&self.readings).len()
    }

    /// Copy of every stored reading in insertion order
    pub fn readings(&self) -> Vec<Reading> {
        read(&self.readings).clone()
    }

    fn take_fault(&self) -> Result<(), StoreError> {
        match lock(&self.faults).pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// A poisoned lock only means another caller panicked mid-call; the data is
// still structurally valid for this store.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl DeviceRegistry for MemoryStore {
    async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError> {
        self.take_fault()?;

        Ok(read(&self.devices)
            .iter()
            .filter(|device| filter.matches(device))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert_many(&self, readings: &[Reading]) -> Result<usize, StoreError> {
        self.take_fault()?;
        validate_batch(readings)?;

        write(&self.readings).extend_from_slice(readings);
        Ok(readings.len())
    }

    async fn aggregate(
        &self,
        device_ids: &[String],
    ) -> Result<HashMap<String, AggregateSnapshot>, StoreError> {
        self.take_fault()?;

        Ok(aggregate_readings(read(&self.readings).iter(), device_ids))
    }
}

#[async_trait]
impl FleetAdmin for MemoryStore {
    async fn reset(&self) -> Result<(), StoreError> {
        self.take_fault()?;

        write(&self.devices).clear();
        write(&self.readings).clear();
        Ok(())
    }

    async fn insert_devices(&self, devices: &[Device]) -> Result<usize, StoreError> {
        self.take_fault()?;

        write(&self.devices).extend_from_slice(devices);
        Ok(devices.len())
    }
}
