use chrono::{DateTime, Utc};

/// Clock trait for abstracting time operations
/// Readings are stamped by the producer using this clock
pub trait Clock: Send + Sync {
    /// Get current time as epoch milliseconds (reading timestamps)
    fn now_millis(&self) -> i64;
}

/// Production implementation of Clock using system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Test implementation of Clock pinned to one instant
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedClock {
    millis: i64,
}

impl FixedClock {
    /// Create a new FixedClock with the given timestamp
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self::from_millis(timestamp.timestamp_millis())
    }

    /// Create a FixedClock from epoch milliseconds
    pub fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    /// Create a FixedClock from RFC3339 string
    pub fn from_rfc3339(timestamp_str: &str) -> Result<Self, chrono::ParseError> {
        let timestamp = DateTime::parse_from_rfc3339(timestamp_str)?.with_timezone(&Utc);
        Ok(Self::new(timestamp))
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.millis
    }
}
