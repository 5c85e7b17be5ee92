pub mod codec;
pub mod error;
pub mod filter;
pub mod job;
pub mod lock;
pub mod mover;
pub mod multi;
pub mod options;
pub mod progress;
pub mod queue;
pub mod reconcile;
pub mod registry;
pub mod shutdown;
pub mod status;
pub mod transfer;

pub use codec::{Codec, RawCodec};
pub use error::MoverError;
pub use filter::{AffinityFilter, JobFilter};
pub use job::{JobLock, TransferJob};
pub use mover::{MoverContext, QueueMover, TransferStats};
pub use multi::MultiQueueMover;
pub use options::TransferOptions;
pub use queue::{ClaimOutcome, Entry, ListQueue, RedisQueue, SetQueue, SortedSetQueue};
pub use registry::QueueRegistry;
pub use shutdown::ShutdownHandle;
pub use transfer::{RecoverReport, RegistryKind, RegistryPlan, TransferJobs, TransferPlan};

pub use redis;
pub use tokio_util::sync::CancellationToken;
