use crate::common::clock::monotonic_nanos;
use crate::common::constants::SERVICE_CLOSED_MSG;
use crate::common::{ContextType, Error, Result};
use crate::concurrent::{Completion, CountdownCompletion};
use crate::config::Settings;
use crate::jobs::{
    JobExecutionContext, JobExecutionContextBuilder, JobId, JobStats, KillAllListener,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, error, trace};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

type ActiveContexts = DashMap<JobId, Arc<JobExecutionContext>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Initialized,
    Started,
    Stopped,
    Closed,
}

/// Registry of the jobs active on this node.
///
/// A context is removed by its own completion, never by a caller. Kill sweeps
/// work on a snapshot of the registry and resolve once every context they
/// picked has completed.
pub struct JobContextService {
    local_node_id: String,
    active_contexts: Arc<ActiveContexts>,
    kill_listeners: RwLock<Vec<Arc<dyn KillAllListener>>>,
    lifecycle: Mutex<Lifecycle>,
    stats: Arc<JobStats>,
}

impl JobContextService {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            local_node_id: settings.node_id.clone(),
            active_contexts: Arc::new(DashMap::new()),
            kill_listeners: RwLock::new(Vec::new()),
            lifecycle: Mutex::new(Lifecycle::Initialized),
            stats: Arc::new(JobStats::new()?),
        })
    }

    pub fn local_node_id(&self) -> &str {
        &self.local_node_id
    }

    pub fn new_builder(
        &self,
        job_id: JobId,
        coordinator_node_id: &str,
        participating_nodes: Vec<String>,
    ) -> JobExecutionContextBuilder {
        JobExecutionContextBuilder::new(job_id, coordinator_node_id, participating_nodes)
    }

    /// A builder for a job coordinated by this node, without other participants.
    pub fn new_local_builder(&self, job_id: JobId) -> JobExecutionContextBuilder {
        JobExecutionContextBuilder::new(job_id, &self.local_node_id, Vec::new())
    }

    /// Builds the context and registers it. Fails if a context for the job is
    /// already registered, or the registry is stopped.
    pub fn create_context(
        &self,
        builder: &JobExecutionContextBuilder,
    ) -> Result<Arc<JobExecutionContext>> {
        self.ensure_open()?;
        let job_id = builder.job_id();

        // building wires the sub-executions into the new context, so it only
        // happens once the id is known to be free. The entry guard locks a map
        // shard, it must be gone before the completion listener can run.
        let context = match self.active_contexts.entry(job_id) {
            Entry::Occupied(existing) => {
                return Err(Error::DuplicateContext(format!(
                    "context for job {job_id} already exists:\n{:?}",
                    existing.get()
                )));
            }
            Entry::Vacant(vacant) => {
                let context = Arc::new(builder.build()?);
                vacant.insert(context.clone());
                context
            }
        };
        self.stats.record_created();

        let contexts = Arc::downgrade(&self.active_contexts);
        let registered = Arc::downgrade(&context);
        let stats = self.stats.clone();
        let created_at = context.created_at();
        context.completion().when_done(move |outcome| {
            if let Some(contexts) = contexts.upgrade() {
                contexts.remove_if(&job_id, |_, current| {
                    std::ptr::eq(Arc::as_ptr(current), registered.as_ptr())
                });
                trace!("removed job {job_id}, {} jobs active", contexts.len());
            }
            stats.record_finished(outcome, created_at.elapsed());
        });

        trace!("created job {job_id}, {} jobs active", self.active_contexts.len());
        Ok(context)
    }

    pub fn get_context(&self, job_id: JobId) -> Result<Arc<JobExecutionContext>> {
        self.get_context_or_none(job_id)
            .ok_or(Error::ContextMissing {
                context_type: ContextType::JobExecutionContext,
                job_id,
            })
    }

    pub fn get_context_or_none(&self, job_id: JobId) -> Option<Arc<JobExecutionContext>> {
        self.active_contexts
            .get(&job_id)
            .map(|entry| entry.value().clone())
    }

    pub fn num_active_contexts(&self) -> usize {
        self.active_contexts.len()
    }

    /// Ids of the active jobs coordinated by `node_id`, as of the call.
    pub fn get_job_ids_by_coordinator_node(
        &self,
        node_id: &str,
    ) -> impl Iterator<Item = JobId> + Clone {
        let node_id = node_id.to_string();
        self.snapshot()
            .into_iter()
            .filter(move |context| context.coordinator_node_id() == node_id)
            .map(|context| context.job_id())
    }

    /// Ids of the active jobs `node_id` participates in, as of the call.
    pub fn get_job_ids_by_participating_nodes(
        &self,
        node_id: &str,
    ) -> impl Iterator<Item = JobId> + Clone {
        let node_id = node_id.to_string();
        self.snapshot()
            .into_iter()
            .filter(move |context| context.participating_nodes().contains(&node_id))
            .map(|context| context.job_id())
    }

    pub fn add_listener(&self, listener: Arc<dyn KillAllListener>) {
        self.kill_listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Kills every active job. Resolves to the number of jobs that were still
    /// running when this call issued kill to them, once all of the jobs it saw
    /// have completed. Never fails.
    pub fn kill_all(&self) -> Completion<usize> {
        let timestamp = monotonic_nanos();
        self.notify_listeners("kill_all_jobs", |listener| {
            listener.kill_all_jobs(timestamp)
        });
        let contexts = self.snapshot().into_iter().map(Some).collect();
        self.kill_contexts(contexts)
    }

    /// Kills the given jobs. Jobs that are not registered count as completed,
    /// but not as killed.
    pub fn kill_jobs(&self, job_ids: &[JobId]) -> Completion<usize> {
        for &job_id in job_ids {
            self.notify_listeners("kill_job", |listener| listener.kill_job(job_id));
        }
        let contexts = job_ids
            .iter()
            .map(|&job_id| self.get_context_or_none(job_id))
            .collect();
        self.kill_contexts(contexts)
    }

    pub fn stats(&self) -> Arc<JobStats> {
        self.stats.clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lock_lifecycle()
    }

    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lock_lifecycle();
        match *lifecycle {
            Lifecycle::Initialized => *lifecycle = Lifecycle::Started,
            Lifecycle::Started => {}
            Lifecycle::Stopped | Lifecycle::Closed => {
                return Err(Error::Closed(SERVICE_CLOSED_MSG.to_string()))
            }
        }
        Ok(())
    }

    /// Stops accepting jobs and kills every active one, without waiting for them.
    pub fn stop(&self) {
        {
            let mut lifecycle = self.lock_lifecycle();
            match *lifecycle {
                Lifecycle::Stopped | Lifecycle::Closed => return,
                _ => *lifecycle = Lifecycle::Stopped,
            }
        }
        let contexts: Vec<_> = self.snapshot().into_iter().map(Some).collect();
        debug!("stopping job registry, killing {} jobs", contexts.len());
        self.kill_contexts(contexts);
    }

    pub fn close(&self) {
        self.stop();
        *self.lock_lifecycle() = Lifecycle::Closed;
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<()> {
        match *self.lock_lifecycle() {
            Lifecycle::Initialized | Lifecycle::Started => Ok(()),
            Lifecycle::Stopped | Lifecycle::Closed => {
                Err(Error::Closed(SERVICE_CLOSED_MSG.to_string()))
            }
        }
    }

    fn snapshot(&self) -> Vec<Arc<JobExecutionContext>> {
        self.active_contexts
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Calls every listener, logging instead of propagating failures and panics.
    fn notify_listeners<F>(&self, callback: &str, f: F)
    where
        F: Fn(&dyn KillAllListener) -> Result<()>,
    {
        let listeners = self
            .kill_listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("KillAllListener::{callback} failed: {e}"),
                Err(_) => error!("KillAllListener::{callback} panicked"),
            }
        }
    }

    /// Kills the contexts, `None` standing for a job that is already gone.
    fn kill_contexts(&self, contexts: Vec<Option<Arc<JobExecutionContext>>>) -> Completion<usize> {
        let countdown = match CountdownCompletion::new(contexts.len()) {
            Ok(countdown) => Arc::new(countdown),
            Err(_) => return Completion::immediate(0),
        };
        let mut killed = 0;
        for context in contexts {
            match context {
                Some(context) => {
                    // a job an earlier sweep killed still counts while it runs.
                    if !context.completion().is_done() {
                        killed += 1;
                    }
                    context.kill(None);
                    let countdown = countdown.clone();
                    context.completion().when_done(move |_| {
                        countdown.on_success();
                    });
                }
                None => {
                    countdown.on_success();
                }
            }
        }
        debug!("issued kill to {killed} jobs");
        countdown.completion().then(move |_| Ok(killed))
    }
}

impl Drop for JobContextService {
    fn drop(&mut self) {
        self.stop();
    }
}
