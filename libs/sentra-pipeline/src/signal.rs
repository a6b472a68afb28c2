use tokio_util::sync::CancellationToken;

/// Resolve on SIGINT or SIGTERM (Ctrl+C only on non-unix targets).
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Cancel `token` on the first shutdown signal. A signal handler that cannot
/// be installed also cancels, after logging.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "cannot listen for shutdown signals, stopping"),
        }
        token.cancel();
    });
}
