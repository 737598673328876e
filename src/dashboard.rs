// Sector dashboard binary entry point

use anyhow::Context;
use tracing::info;

use fleet_telemetry::{cancel_on_shutdown, init_tracing, Dashboard, DynamoStore, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Settings::from_env().context("Invalid configuration")?;
    let store = DynamoStore::connect(&settings).await;

    info!(
        sector = %settings.target_sector,
        interval_ms = settings.dashboard_interval.as_millis() as u64,
        "Dashboard starting"
    );

    let cancel = cancel_on_shutdown();
    let mut stdout = std::io::stdout();

    let frames = Dashboard::new(&store, &store, &settings)
        .run(&mut stdout, &cancel)
        .await
        .context("Dashboard stopped with an error")?;

    info!(frames, "Dashboard exited");
    Ok(())
}
