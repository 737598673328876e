pub const DEFAULT_ALERT_THRESHOLD: f64 = 60.0;
pub const DEFAULT_DANGER_THRESHOLD: f64 = 80.0;

/// Dashboard status of a device, derived from its most recent value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Normal,
    Alert,
    Danger,
}

impl DeviceStatus {
    /// Upper-case label shown in the dashboard table
    pub fn label(&self) -> &'static str {
        match self {
            DeviceStatus::Normal => "NORMAL",
            DeviceStatus::Alert => "ALERT",
            DeviceStatus::Danger => "DANGER",
        }
    }
}

/// Fixed classification thresholds
///
/// `last > danger` is danger, `alert < last <= danger` is alert, anything
/// else is normal. Both bounds are exclusive on the low side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub alert: f64,
    pub danger: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            alert: DEFAULT_ALERT_THRESHOLD,
            danger: DEFAULT_DANGER_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn classify(&self, last: f64) -> DeviceStatus {
        match last {
            v if v > self.danger => DeviceStatus::Danger,
            v if v > self.alert => DeviceStatus::Alert,
            _ => DeviceStatus::Normal,
        }
    }
}
