use crate::collect::{RoutedCollectPhase, SharedShardContexts};
use crate::common::{ContextType, Error, Result};
use crate::concurrent::{Completion, KillSignal};
use crate::jobs::{JobId, SubExecutionContext};
use crate::storage::Searcher;
use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// The sub-execution of a collect phase on this node. Collectors built for
/// the phase register their searchers here and observe its kill signal.
pub struct JobCollectContext {
    job_id: JobId,
    phase_id: i32,
    name: String,
    shared_shard_contexts: Arc<SharedShardContexts>,
    searchers: Mutex<HashMap<i32, Arc<Searcher>>>,
    kill_signal: KillSignal,
    completion: Completion<()>,
}

impl JobCollectContext {
    pub fn new(phase: &RoutedCollectPhase, shared_shard_contexts: Arc<SharedShardContexts>) -> Self {
        Self {
            job_id: phase.job_id(),
            phase_id: phase.phase_id(),
            name: phase.name().to_string(),
            shared_shard_contexts,
            searchers: Mutex::new(HashMap::new()),
            kill_signal: KillSignal::new(),
            completion: Completion::new(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn shared_shard_contexts(&self) -> &Arc<SharedShardContexts> {
        &self.shared_shard_contexts
    }

    pub fn kill_signal(&self) -> KillSignal {
        self.kill_signal.clone()
    }

    /// Registers the searcher a collector reads from. Fails once killed.
    pub fn add_searcher(&self, reader_id: i32, searcher: Arc<Searcher>) -> Result<()> {
        self.kill_signal.check()?;
        self.searchers.lock()?.insert(reader_id, searcher);
        Ok(())
    }

    pub fn searcher(&self, reader_id: i32) -> Result<Arc<Searcher>> {
        self.searchers
            .lock()?
            .get(&reader_id)
            .cloned()
            .ok_or(Error::ContextMissing {
                context_type: ContextType::Searcher,
                job_id: self.job_id,
            })
    }

    /// Completes the phase once its consumer is done with the collectors.
    pub fn finish(&self, outcome: Result<()>) -> bool {
        trace!("collect phase {} of job {} finished", self.phase_id, self.job_id);
        self.completion.set(outcome)
    }
}

impl SubExecutionContext for JobCollectContext {
    fn id(&self) -> i32 {
        self.phase_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<()> {
        self.kill_signal.check()
    }

    fn kill(&self, reason: &Error) {
        if self.kill_signal.kill() {
            trace!("collect phase {} of job {} killed: {reason}", self.phase_id, self.job_id);
        }
        self.searchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.completion.set(Err(reason.clone()));
    }

    fn completion(&self) -> Completion<()> {
        self.completion.clone()
    }
}

impl fmt::Debug for JobCollectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCollectContext")
            .field("job_id", &self.job_id)
            .field("phase_id", &self.phase_id)
            .field("name", &self.name)
            .field("killed", &self.kill_signal.is_killed())
            .finish()
    }
}
