use transfer_adapters::{Flavor, ResqueCodec, SidekiqCodec};
use transfer_mover::{
    Codec, RecoverReport, ShutdownHandle, TransferJob, TransferJobs, redis,
};

use crate::config::TransferConfig;

/// Connects both deployments and runs one `recover` pass for the configured flavor.
/// `shutdown` is observed between batches.
pub async fn run_transfer(
    config: &TransferConfig,
    shutdown: ShutdownHandle,
) -> anyhow::Result<RecoverReport> {
    match config.transfer.flavor {
        Flavor::Sidekiq => recover_with(config, SidekiqCodec, shutdown).await,
        Flavor::Resque => recover_with(config, ResqueCodec, shutdown).await,
    }
}

async fn recover_with<C>(
    config: &TransferConfig,
    codec: C,
    shutdown: ShutdownHandle,
) -> anyhow::Result<RecoverReport>
where
    C: Codec,
    C::Item: TransferJob,
{
    let source = redis::Client::open(config.source.url.as_str())?;
    let destination = redis::Client::open(config.destination.url.as_str())?;

    let settings = &config.transfer;
    let transfer = TransferJobs::builder()
        .source_client(source)
        .destination_client(destination)
        .codec(codec)
        .plan(settings.plan())
        .options(settings.options())
        .filter(settings.filter())
        .shutdown_handle(shutdown)
        .build()
        .await?;

    tracing::info!(
        flavor = %settings.flavor,
        affinity = %transfer.filter().affinity,
        registries = transfer.plan().registries.len(),
        scheduled_queues = transfer.plan().scheduled_queues.len(),
        "Transfer initialized"
    );

    Ok(transfer.recover().await?)
}
