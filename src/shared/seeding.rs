//! Fleet seeding: wipe the store and register a fresh set of devices.

use rand::Rng;
use tracing::info;

use crate::domain::Device;
use crate::error::StoreError;
use crate::id_generator::IdGenerator;
use crate::store::FleetAdmin;

pub const SECTORS: [&str; 3] = ["Sector A", "Sector B", "Sector C"];
pub const SENSOR_TYPES: [&str; 3] = ["Temperature", "Pressure", "Vibration"];
pub const ACTIVE_STATUS: &str = "active";

/// Generate `count` devices named Sensor-01, Sensor-02, ...
///
/// Sector and sensor type are drawn uniformly at random per device.
pub fn generate_fleet<R>(count: usize, rng: &mut R, ids: &dyn IdGenerator) -> Vec<Device>
where
    R: Rng + ?Sized,
{
    (1..=count)
        .map(|n| Device {
            device_id: ids.uuid_v4(),
            name: format!("Sensor-{:02}", n),
            sector: SECTORS[rng.gen_range(0..SECTORS.len())].to_string(),
            sensor_type: SENSOR_TYPES[rng.gen_range(0..SENSOR_TYPES.len())].to_string(),
            status: ACTIVE_STATUS.to_string(),
        })
        .collect()
}

/// Replace the whole fleet with `devices`; existing readings are deleted too
pub async fn seed_fleet(admin: &dyn FleetAdmin, devices: &[Device]) -> Result<usize, StoreError> {
    info!("Resetting fleet");
    admin.reset().await?;

    let inserted = admin.insert_devices(devices).await?;
    info!(devices = inserted, "Fleet seeded");

    Ok(inserted)
}
