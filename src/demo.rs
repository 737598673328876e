// Single-process demo: in-memory store, producer and dashboard side by side

use anyhow::Context;
use tracing::info;

use fleet_telemetry::{
    cancel_on_shutdown, generate_fleet, init_tracing_with_default, seed_fleet, Dashboard,
    MemoryStore, Producer, RandomIdGenerator, Settings, SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Producer progress lines would tear through the redraws at info
    init_tracing_with_default("warn");

    let settings = Settings::from_env().context("Invalid configuration")?;

    let store = MemoryStore::new();
    let clock = SystemClock::new();
    let ids = RandomIdGenerator::new();

    let devices = generate_fleet(settings.seed_device_count, &mut rand::thread_rng(), &ids);
    seed_fleet(&store, &devices)
        .await
        .context("Failed to seed in-memory fleet")?;

    let cancel = cancel_on_shutdown();
    let mut producer = Producer::new(&store, &store, &clock, &ids, &settings);
    let dashboard = Dashboard::new(&store, &store, &settings);
    let mut stdout = std::io::stdout();

    // Whichever loop ends first stops the other
    let (produced, drawn) = tokio::join!(
        async {
            let result = producer.run(&cancel).await;
            cancel.cancel();
            result
        },
        async {
            let result = dashboard.run(&mut stdout, &cancel).await;
            cancel.cancel();
            result
        },
    );

    let stats = produced.context("Producer stopped with an error")?;
    let frames = drawn.context("Dashboard stopped with an error")?;

    info!(
        batches = stats.batches,
        total = stats.total_inserted,
        frames,
        "Demo exited"
    );
    Ok(())
}
