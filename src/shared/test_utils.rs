//! Test utilities for property-based testing
//!
//! Generators for fleet domain types: device ids, reading values,
//! timestamps, whole devices and reading histories.

pub mod generators {
    use proptest::prelude::*;

    use crate::domain::{Device, Reading};
    use crate::seeding::{ACTIVE_STATUS, SECTORS, SENSOR_TYPES};

    /// Generate a short device id ("dev-0" .. "dev-7")
    ///
    /// Kept to a small pool so generated readings collide on devices.
    pub fn device_id() -> impl Strategy<Value = String> {
        (0u8..8).prop_map(|n| format!("dev-{}", n))
    }

    /// Generate a reading value in the producer's default range, two decimals
    pub fn reading_value() -> impl Strategy<Value = f64> {
        (2000u32..=10000).prop_map(|hundredths| hundredths as f64 / 100.0)
    }

    /// Generate a timestamp in epoch milliseconds
    /// Range: 2020-01-01 to 2030-12-31
    pub fn timestamp_ms() -> impl Strategy<Value = i64> {
        1577836800000i64..1924991999000i64
    }

    /// Generate a threshold-relevant value, biased toward the boundaries
    pub fn classified_value() -> impl Strategy<Value = f64> {
        prop_oneof![
            Just(60.0),
            Just(80.0),
            Just(60.01),
            Just(80.01),
            reading_value(),
        ]
    }

    /// Generate a registered device
    pub fn device() -> impl Strategy<Value = Device> {
        (
            device_id(),
            1u32..=99,
            prop::sample::select(SECTORS.to_vec()),
            prop::sample::select(SENSOR_TYPES.to_vec()),
        )
            .prop_map(|(device_id, n, sector, sensor_type)| Device {
                device_id,
                name: format!("Sensor-{:02}", n),
                sector: sector.to_string(),
                sensor_type: sensor_type.to_string(),
                status: ACTIVE_STATUS.to_string(),
            })
    }

    /// Generate a reading for one of the pooled device ids
    ///
    /// Timestamps are drawn from a narrow window so ties occur.
    pub fn reading() -> impl Strategy<Value = Reading> {
        (device_id(), 0i64..50, reading_value(), any::<u32>()).prop_map(
            |(device_id, offset, value, salt)| Reading {
                reading_id: format!("{}-{}-{}", device_id, offset, salt),
                device_id,
                timestamp_ms: 1_705_314_600_000 + offset,
                value,
                kind: "real-time-read".to_string(),
            },
        )
    }

    /// Generate a reading history of up to `max_len` readings
    pub fn readings(max_len: usize) -> impl Strategy<Value = Vec<Reading>> {
        prop::collection::vec(reading(), 0..=max_len)
    }
}
