use crate::common::constants::SEARCHER_SOURCE;
use crate::common::{Error, Result};
use crate::jobs::JobId;
use crate::storage::{IndexShard, Searcher, ShardId};
use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The shared shard contexts of one job, one per shard it reads.
///
/// Reader ids are handed out in creation order and stay stable for the life
/// of a context. Closing releases every snapshot; it happens when the job
/// completes.
pub struct SharedShardContexts {
    job_id: JobId,
    contexts: Mutex<HashMap<ShardId, Arc<SharedShardContext>>>,
    next_reader_id: AtomicI32,
    closed: AtomicBool,
}

impl SharedShardContexts {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            contexts: Mutex::new(HashMap::new()),
            next_reader_id: AtomicI32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// The shared context for the shard, created on first use.
    pub fn get_or_create(&self, shard: Arc<dyn IndexShard>) -> Result<Arc<SharedShardContext>> {
        let mut contexts = self.contexts.lock()?;
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed(format!(
                "shard contexts of job {} are closed",
                self.job_id
            )));
        }
        let context = contexts
            .entry(shard.shard_id().clone())
            .or_insert_with(|| {
                let reader_id = self.next_reader_id.fetch_add(1, Ordering::SeqCst);
                Arc::new(SharedShardContext::new(self.job_id, shard, reader_id))
            });
        Ok(context.clone())
    }

    pub fn get(&self, shard_id: &ShardId) -> Option<Arc<SharedShardContext>> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(shard_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes every shared context, returning how many snapshots were released.
    /// Later calls release nothing.
    pub fn close(&self) -> usize {
        let contexts = {
            let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::SeqCst);
            std::mem::take(&mut *contexts)
        };
        contexts
            .into_values()
            .filter(|context| context.close())
            .count()
    }
}

impl fmt::Debug for SharedShardContexts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedShardContexts")
            .field("job_id", &self.job_id)
            .field("contexts", &self.len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[derive(Default)]
struct SnapshotState {
    searcher: Option<Arc<Searcher>>,
    /// Collector constructions holding the snapshot, not yet committed.
    leases: usize,
    /// Whether a committed collector uses the snapshot. Owned snapshots are
    /// only released by closing the context.
    owned: bool,
    closed: bool,
}

/// Per job and shard holder of one shard snapshot, shared by every collector
/// of the job reading that shard.
pub struct SharedShardContext {
    job_id: JobId,
    shard: Arc<dyn IndexShard>,
    reader_id: i32,
    state: Mutex<SnapshotState>,
}

impl SharedShardContext {
    fn new(job_id: JobId, shard: Arc<dyn IndexShard>, reader_id: i32) -> Self {
        Self {
            job_id,
            shard,
            reader_id,
            state: Mutex::new(SnapshotState::default()),
        }
    }

    pub fn shard(&self) -> &Arc<dyn IndexShard> {
        &self.shard
    }

    pub fn shard_id(&self) -> &ShardId {
        self.shard.shard_id()
    }

    pub fn reader_id(&self) -> i32 {
        self.reader_id
    }

    pub fn has_searcher(&self) -> bool {
        self.lock().searcher.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Leases the snapshot for a collector construction, acquiring it from
    /// the shard on first use.
    ///
    /// The lease has to be committed once the collector exists. A lease that
    /// is dropped instead releases the snapshot again, unless other leases or
    /// committed collectors still use it.
    pub fn acquire_searcher(self: &Arc<Self>) -> Result<SearcherLease> {
        let mut state = self.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        let searcher = match &state.searcher {
            Some(searcher) => searcher.clone(),
            None => {
                let searcher = Arc::new(self.shard.acquire_searcher(SEARCHER_SOURCE)?);
                trace!(
                    "acquired snapshot of shard {} for job {}, reader {}",
                    self.shard_id(),
                    self.job_id,
                    self.reader_id
                );
                state.searcher = Some(searcher.clone());
                searcher
            }
        };
        state.leases += 1;
        Ok(SearcherLease {
            context: self.clone(),
            searcher,
            settled: false,
        })
    }

    /// Releases the snapshot. Returns whether one was released.
    pub fn close(&self) -> bool {
        let searcher = {
            let mut state = self.lock();
            state.closed = true;
            state.searcher.take()
        };
        match searcher {
            Some(searcher) => searcher.close(),
            None => false,
        }
    }

    fn commit_lease(&self) -> Result<()> {
        let mut state = self.lock();
        state.leases -= 1;
        if state.closed {
            return Err(self.closed_error());
        }
        state.owned = true;
        Ok(())
    }

    fn abandon_lease(&self) {
        let searcher = {
            let mut state = self.lock();
            state.leases -= 1;
            match state.leases == 0 && !state.owned {
                true => state.searcher.take(),
                false => None,
            }
        };
        if let Some(searcher) = searcher {
            trace!(
                "releasing unused snapshot of shard {} for job {}",
                self.shard_id(),
                self.job_id
            );
            searcher.close();
        }
    }

    fn lock(&self) -> MutexGuard<'_, SnapshotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed_error(&self) -> Error {
        Error::Closed(format!(
            "shared context of job {} for shard {} is closed",
            self.job_id,
            self.shard_id()
        ))
    }
}

impl fmt::Debug for SharedShardContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedShardContext")
            .field("job_id", &self.job_id)
            .field("shard_id", self.shard_id())
            .field("reader_id", &self.reader_id)
            .finish()
    }
}

/// A snapshot held by a collector under construction. See
/// [`SharedShardContext::acquire_searcher`].
pub struct SearcherLease {
    context: Arc<SharedShardContext>,
    searcher: Arc<Searcher>,
    settled: bool,
}

impl SearcherLease {
    pub fn searcher(&self) -> &Arc<Searcher> {
        &self.searcher
    }

    pub fn reader_id(&self) -> i32 {
        self.context.reader_id
    }

    /// Hands the snapshot over to the job: from now on only closing the shared
    /// context releases it. Fails if the context was closed meanwhile.
    pub fn commit(mut self) -> Result<Arc<Searcher>> {
        self.settled = true;
        self.context.commit_lease()?;
        Ok(self.searcher.clone())
    }
}

impl Drop for SearcherLease {
    fn drop(&mut self) {
        if !self.settled {
            self.context.abandon_lease();
        }
    }
}
