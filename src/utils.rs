//! Small helpers shared across the crate.

use tracing::info;

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Shorten a long hex or numeric id for log lines: `0x1234…abcd`.
pub fn short_id(id: &str) -> String {
    const HEAD: usize = 6;
    const TAIL: usize = 4;
    if id.len() <= HEAD + TAIL + 1 || !id.is_ascii() {
        return id.to_string();
    }
    format!("{}…{}", &id[..HEAD], &id[id.len() - TAIL..])
}
