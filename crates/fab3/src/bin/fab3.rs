use anyhow::Result;
use clap::Parser;
use fab3::Config;
use tokio::signal::unix::{
    SignalKind,
    signal,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{
    EnvFilter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(config.log_level.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server = config.validate()?.build().await?;
    let cancellation_token = CancellationToken::new();
    let mut server_future = Box::pin(server.run(cancellation_token.clone()));
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = &mut server_future => handle_server_result(result),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C signal, initiating graceful shutdown");
            cancellation_token.cancel();
            handle_server_result(server_future.await)
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
            cancellation_token.cancel();
            handle_server_result(server_future.await)
        }
    }
}

/// Logs the outcome and hands any error back so the process exits non-zero.
fn handle_server_result(result: fab3::Result<()>) -> Result<()> {
    match result {
        Ok(()) => {
            tracing::info!("Server shutdown gracefully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Server encountered an error: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fab3::Fab3Error;

    #[test]
    fn server_error_fails_the_process() {
        let err = handle_server_result(Err(Fab3Error::Io(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "address in use",
        ))))
        .unwrap_err();
        assert!(err.to_string().contains("address in use"));
    }

    #[test]
    fn clean_shutdown_succeeds() {
        assert!(handle_server_result(Ok(())).is_ok());
    }
}
