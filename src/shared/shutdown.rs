use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wait for SIGINT (Ctrl-C) or SIGTERM
///
/// A handler that cannot be installed is logged and that signal is ignored.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

/// Token cancelled once a shutdown signal arrives
///
/// Must be called from within a tokio runtime.
pub fn cancel_on_shutdown() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    cancel
}
