// Fleet seeding binary entry point

use anyhow::Context;
use tracing::info;

use fleet_telemetry::{
    generate_fleet, init_tracing, seed_fleet, DynamoStore, RandomIdGenerator, Settings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::from_env().context("Invalid configuration")?;
    let store = DynamoStore::connect(&settings).await;

    // Only a local endpoint gets its tables created; AWS tables are provisioned separately
    if settings.store_endpoint.is_some() {
        store
            .ensure_tables()
            .await
            .context("Failed to create tables")?;
    }

    let ids = RandomIdGenerator::new();
    let devices = generate_fleet(settings.seed_device_count, &mut rand::thread_rng(), &ids);

    let inserted = seed_fleet(&store, &devices)
        .await
        .context("Failed to seed fleet")?;

    info!(devices = inserted, "Sensors registered and ready for data");
    Ok(())
}
