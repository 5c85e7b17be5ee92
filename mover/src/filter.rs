use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt::Display;
use std::str::FromStr;

use crate::job::TransferJob;

/// Which jobs a transfer is responsible for, by shard/pod tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AffinityFilter {
    #[default]
    All,
    /// Only jobs owned by no shard, enqueued from the global context.
    Global,
    Shard(String),
}

impl FromStr for AffinityFilter {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim() {
            "" | "all" => AffinityFilter::All,
            "global" | "master" => AffinityFilter::Global,
            shard => AffinityFilter::Shard(shard.to_string()),
        })
    }
}

impl Display for AffinityFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AffinityFilter::All => write!(f, "all"),
            AffinityFilter::Global => write!(f, "global"),
            AffinityFilter::Shard(shard) => write!(f, "{shard}"),
        }
    }
}

/// Keep predicate applied to every job before lock reconciliation. Jobs it rejects go
/// back to the live source queue.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub affinity: AffinityFilter,
    /// Job classes that are never migrated.
    pub blacklist: HashSet<String>,
}

impl JobFilter {
    pub fn new(affinity: AffinityFilter) -> Self {
        Self {
            affinity,
            blacklist: HashSet::new(),
        }
    }

    pub fn with_blacklist<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist.extend(classes.into_iter().map(Into::into));
        self
    }

    pub fn keep<J: TransferJob>(&self, job: &J) -> bool {
        if self.blacklist.contains(job.class_name()) {
            return false;
        }

        match &self.affinity {
            AffinityFilter::All => true,
            AffinityFilter::Global => !job.selects_affinity() && job.affinity().is_none(),
            AffinityFilter::Shard(shard) => job.affinity() == Some(shard.as_str()),
        }
    }
}
