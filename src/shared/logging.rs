use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber at `info`
///
/// Output goes to stderr so the dashboard's stdout redraws stay clean.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Install the global tracing subscriber; `RUST_LOG` overrides `default_directive`
pub fn init_tracing_with_default(default_directive: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
