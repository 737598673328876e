// Telemetry producer binary entry point

use anyhow::Context;
use tracing::info;

use fleet_telemetry::{
    cancel_on_shutdown, init_tracing, DynamoStore, Producer, RandomIdGenerator, Settings,
    SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::from_env().context("Invalid configuration")?;
    let store = DynamoStore::connect(&settings).await;

    info!(
        endpoint = settings.store_endpoint.as_deref().unwrap_or("aws-default"),
        devices_table = %settings.devices_table,
        readings_table = %settings.readings_table,
        "Producer starting"
    );

    let clock = SystemClock::new();
    let ids = RandomIdGenerator::new();
    let cancel = cancel_on_shutdown();

    let stats = Producer::new(&store, &store, &clock, &ids, &settings)
        .run(&cancel)
        .await
        .context("Producer stopped with an error")?;

    info!(
        batches = stats.batches,
        total = stats.total_inserted,
        "Producer exited"
    );
    Ok(())
}
