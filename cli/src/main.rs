use transfer_jobs::{config, run::run_transfer};
use transfer_mover::ShutdownHandle;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::get_config()?;

    let subscriber = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to debug for our crates if RUST_LOG environment variable is not set
            "transfer_jobs=debug,transfer_mover=debug,transfer_adapters=debug".into()
        }),
    );

    match config.logging.format {
        config::LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        config::LogFormat::Pretty => subscriber.with(tracing_subscriber::fmt::layer()).init(),
    }

    let shutdown = ShutdownHandle::new();
    let signal_handle = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received, stopping after the current batch");
        signal_handle.shutdown();
    });

    let report = run_transfer(&config, shutdown).await?;

    tracing::info!(
        num_moved = report.moved,
        num_dropped = report.dropped,
        num_reenqueued = report.reenqueued,
        aborted = report.aborted,
        report = %serde_json::to_string(&report)?,
        "Transfer report"
    );

    if report.aborted {
        tracing::warn!("Transfer was interrupted, run again to move the remaining jobs");
    }

    Ok(())
}
