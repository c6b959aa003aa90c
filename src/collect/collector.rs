use crate::collect::{BatchCollector, OrderedCollector};
use crate::common::constants::SNAPSHOT_RELEASED_MSG;
use crate::common::{Error, Result};
use crate::concurrent::KillSignal;
use crate::storage::{Row, Searcher};

/// Rows produced by one collector call. `last` is set on the final batch;
/// asking for more afterwards yields empty terminal batches.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub rows: Vec<Row>,
    pub last: bool,
}

impl Batch {
    pub fn terminal() -> Self {
        Self {
            rows: Vec::new(),
            last: true,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A shard collector, chosen when it is built.
pub enum ShardCollector {
    Batch(BatchCollector),
    Ordered(OrderedCollector),
}

impl ShardCollector {
    pub fn produce_batch(&mut self) -> Result<Batch> {
        match self {
            ShardCollector::Batch(collector) => collector.produce_batch(),
            ShardCollector::Ordered(collector) => collector.produce_batch(),
        }
    }

    /// Stops the collector. The snapshot stays with the job.
    pub fn close(&mut self) {
        match self {
            ShardCollector::Batch(collector) => collector.close(),
            ShardCollector::Ordered(collector) => collector.close(),
        }
    }
}

/// Checked per document: fails once the phase was killed or the snapshot
/// released.
pub(super) fn ensure_live(kill_signal: &KillSignal, searcher: &Searcher) -> Result<()> {
    kill_signal.check()?;
    if searcher.is_closed() {
        return Err(Error::Closed(SNAPSHOT_RELEASED_MSG.to_string()));
    }
    Ok(())
}
