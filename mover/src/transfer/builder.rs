use std::{marker::PhantomData, sync::Arc};

use redis::{Client, aio::ConnectionManager};

use super::{TransferJobs, TransferPlan};
use crate::codec::Codec;
use crate::error::MoverError;
use crate::filter::JobFilter;
use crate::options::TransferOptions;
use crate::progress::ProgressSink;
use crate::shutdown::ShutdownHandle;

// Typestate markers for tracking builder state
pub struct NoSource;
pub struct HasSource;
pub struct NoDestination;
pub struct HasDestination;
pub struct NoCodec;
pub struct HasCodec;

enum RedisSource {
    Url(String),
    Client(Client),
    ConnectionManager(ConnectionManager),
}

impl RedisSource {
    async fn connect(self) -> Result<ConnectionManager, MoverError> {
        Ok(match self {
            RedisSource::Url(url) => Client::open(url)?.get_connection_manager().await?,
            RedisSource::Client(client) => client.get_connection_manager().await?,
            RedisSource::ConnectionManager(manager) => manager,
        })
    }
}

pub struct TransferJobsBuilder<C, Src, Dst, Cd> {
    source: Option<RedisSource>,
    destination: Option<RedisSource>,
    codec: Option<C>,
    plan: TransferPlan,
    options: TransferOptions,
    filter: JobFilter,
    shutdown: ShutdownHandle,
    progress: Option<Arc<dyn ProgressSink>>,
    _phantom: PhantomData<(Src, Dst, Cd)>,
}

impl<C: Codec> Default for TransferJobsBuilder<C, NoSource, NoDestination, NoCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> TransferJobsBuilder<C, NoSource, NoDestination, NoCodec> {
    pub fn new() -> Self {
        Self {
            source: None,
            destination: None,
            codec: None,
            plan: TransferPlan::default(),
            options: TransferOptions::default(),
            filter: JobFilter::default(),
            shutdown: ShutdownHandle::default(),
            progress: None,
            _phantom: PhantomData,
        }
    }
}

impl<C, Src, Dst, Cd> TransferJobsBuilder<C, Src, Dst, Cd> {
    fn transition<Src2, Dst2, Cd2>(self) -> TransferJobsBuilder<C, Src2, Dst2, Cd2> {
        TransferJobsBuilder {
            source: self.source,
            destination: self.destination,
            codec: self.codec,
            plan: self.plan,
            options: self.options,
            filter: self.filter,
            shutdown: self.shutdown,
            progress: self.progress,
            _phantom: PhantomData,
        }
    }
}

// Source deployment
impl<C, Dst, Cd> TransferJobsBuilder<C, NoSource, Dst, Cd> {
    pub fn source_url<S: Into<String>>(mut self, url: S) -> TransferJobsBuilder<C, HasSource, Dst, Cd> {
        self.source = Some(RedisSource::Url(url.into()));
        self.transition()
    }

    pub fn source_client(mut self, client: Client) -> TransferJobsBuilder<C, HasSource, Dst, Cd> {
        self.source = Some(RedisSource::Client(client));
        self.transition()
    }

    pub fn source_connection_manager(
        mut self,
        manager: ConnectionManager,
    ) -> TransferJobsBuilder<C, HasSource, Dst, Cd> {
        self.source = Some(RedisSource::ConnectionManager(manager));
        self.transition()
    }
}

// Destination deployment
impl<C, Src, Cd> TransferJobsBuilder<C, Src, NoDestination, Cd> {
    pub fn destination_url<S: Into<String>>(
        mut self,
        url: S,
    ) -> TransferJobsBuilder<C, Src, HasDestination, Cd> {
        self.destination = Some(RedisSource::Url(url.into()));
        self.transition()
    }

    pub fn destination_client(
        mut self,
        client: Client,
    ) -> TransferJobsBuilder<C, Src, HasDestination, Cd> {
        self.destination = Some(RedisSource::Client(client));
        self.transition()
    }

    pub fn destination_connection_manager(
        mut self,
        manager: ConnectionManager,
    ) -> TransferJobsBuilder<C, Src, HasDestination, Cd> {
        self.destination = Some(RedisSource::ConnectionManager(manager));
        self.transition()
    }
}

impl<C, Src, Dst> TransferJobsBuilder<C, Src, Dst, NoCodec> {
    /// Payload codec of the job library being migrated.
    pub fn codec(mut self, codec: C) -> TransferJobsBuilder<C, Src, Dst, HasCodec> {
        self.codec = Some(codec);
        self.transition()
    }
}

// Optional settings can be set at any time
impl<C, Src, Dst, Cd> TransferJobsBuilder<C, Src, Dst, Cd> {
    pub fn plan(mut self, plan: TransferPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn filter(mut self, filter: JobFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Share a shutdown handle with signal handlers created before the transfer.
    pub fn shutdown_handle(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Defaults to `LogProgress`.
    pub fn progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl<C: Codec> TransferJobsBuilder<C, HasSource, HasDestination, HasCodec> {
    /// Only available once source, destination and codec are set.
    pub async fn build(self) -> Result<TransferJobs<C>, MoverError> {
        let missing = |what: &str| MoverError::Runtime {
            message: format!("Transfer builder is missing its {what}"),
        };

        let source = self.source.ok_or_else(|| missing("source"))?.connect().await?;
        let dest = self
            .destination
            .ok_or_else(|| missing("destination"))?
            .connect()
            .await?;
        let codec = self.codec.ok_or_else(|| missing("codec"))?;

        Ok(TransferJobs {
            source,
            dest,
            codec,
            plan: self.plan,
            options: self.options,
            filter: self.filter,
            shutdown: self.shutdown,
            progress: self.progress,
        })
    }
}

impl<C: Codec> TransferJobs<C> {
    pub fn builder() -> TransferJobsBuilder<C, NoSource, NoDestination, NoCodec> {
        TransferJobsBuilder::new()
    }
}
