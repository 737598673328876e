use serde::{Deserialize, Serialize};

/// Device domain type representing a simulated sensor in the fleet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub device_id: String,
    pub name: String,
    pub sector: String,
    pub sensor_type: String,
    pub status: String,
}

/// Single telemetry sample attributed to a device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub device_id: String,
    /// Unique per reading; disambiguates samples sharing a millisecond
    pub reading_id: String,
    pub timestamp_ms: i64,
    pub value: f64,
    pub kind: String,
}

impl Reading {
    /// Sort key used by the readings table: "{timestamp_ms:013}#{reading_id}"
    ///
    /// Zero-padded to 13 digits so lexicographic order matches time order.
    pub fn sort_key(&self) -> String {
        format!("{:013}#{}", self.timestamp_ms, self.reading_id)
    }
}

/// Per-device aggregate computed on demand from the reading store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AggregateSnapshot {
    /// Mean over every matching reading (all-time, not windowed)
    pub average: f64,
    /// Value of the reading with the greatest timestamp
    pub last: f64,
    pub count: u64,
}

/// Filter for registry listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub sector: Option<String>,
}

impl DeviceFilter {
    /// Match every device in the registry
    pub fn all() -> Self {
        Self::default()
    }

    /// Match devices located in the given sector
    pub fn sector(sector: impl Into<String>) -> Self {
        Self {
            sector: Some(sector.into()),
        }
    }

    pub fn matches(&self, device: &Device) -> bool {
        match &self.sector {
            Some(sector) => device.sector == *sector,
            None => true,
        }
    }
}
