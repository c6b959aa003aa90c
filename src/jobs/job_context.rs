use crate::collect::SharedShardContexts;
use crate::common::constants::{ALREADY_STARTED_MSG, EMPTY_BUILDER_MSG, JOB_KILLED_MSG};
use crate::common::{Error, Result};
use crate::concurrent::{Completion, CountdownCompletion};
use crate::errinput;
use crate::jobs::{JobId, SubExecutionContext};
use itertools::Itertools;
use log::{debug, trace};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    Created = 0,
    Running = 1,
    Completed = 2,
    Killed = 3,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Created,
            1 => JobState::Running,
            2 => JobState::Completed,
            _ => JobState::Killed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Killed)
    }
}

/// The sub-executions of one job on this node, and their aggregated completion.
///
/// The context's completion fires once every sub-execution completed, with the
/// first failure if any of them failed. Before it fires, all shard snapshots
/// the job acquired are released.
pub struct JobExecutionContext {
    job_id: JobId,
    coordinator_node_id: String,
    participating_nodes: Vec<String>,
    sub_contexts: Vec<Arc<dyn SubExecutionContext>>,
    shared_shard_contexts: Arc<SharedShardContexts>,
    state: Arc<AtomicU8>,
    kill_issued: AtomicBool,
    completion: Completion<()>,
    created_at: Instant,
}

impl JobExecutionContext {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn coordinator_node_id(&self) -> &str {
        &self.coordinator_node_id
    }

    pub fn participating_nodes(&self) -> &[String] {
        &self.participating_nodes
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn completion(&self) -> Completion<()> {
        self.completion.clone()
    }

    pub fn shared_shard_contexts(&self) -> Arc<SharedShardContexts> {
        self.shared_shard_contexts.clone()
    }

    pub fn get_sub_context(&self, id: i32) -> Option<Arc<dyn SubExecutionContext>> {
        self.sub_contexts.iter().find(|sub| sub.id() == id).cloned()
    }

    pub fn sub_context_count(&self) -> usize {
        self.sub_contexts.len()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Starts all sub-executions in order. If one of them fails to start, the
    /// context is killed with that failure, which is returned.
    pub fn start(&self) -> Result<()> {
        if let Err(current) = self.state.compare_exchange(
            JobState::Created as u8,
            JobState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return match JobState::from_u8(current) {
                JobState::Killed => Err(Error::Killed(JOB_KILLED_MSG.to_string())),
                _ => errinput!("{ALREADY_STARTED_MSG}: {}", self.job_id),
            };
        }
        for sub in &self.sub_contexts {
            if self.kill_issued.load(Ordering::SeqCst) {
                return Err(Error::Killed(JOB_KILLED_MSG.to_string()));
            }
            trace!("starting sub-context {}/{} of job {}", sub.id(), sub.name(), self.job_id);
            if let Err(error) = sub.start() {
                debug!(
                    "sub-context {}/{} of job {} failed to start: {error}",
                    sub.id(),
                    sub.name(),
                    self.job_id
                );
                self.kill(Some(error.clone()));
                return Err(error);
            }
        }
        Ok(())
    }

    /// Kills every sub-execution, with `reason` or a plain `Killed` error.
    ///
    /// Returns whether this call issued the kill: `false` if the context already
    /// completed or was killed before.
    pub fn kill(&self, reason: Option<Error>) -> bool {
        if self.completion.is_done() || self.kill_issued.swap(true, Ordering::SeqCst) {
            return false;
        }
        let marked = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                match JobState::from_u8(state) {
                    JobState::Completed => None,
                    _ => Some(JobState::Killed as u8),
                }
            });
        if marked.is_err() {
            return false;
        }

        let reason = reason.unwrap_or_else(|| Error::Killed(JOB_KILLED_MSG.to_string()));
        debug!(
            "killing job {} with {} sub-contexts: {reason}",
            self.job_id,
            self.sub_contexts.len()
        );
        for sub in &self.sub_contexts {
            sub.kill(&reason);
        }
        true
    }
}

impl fmt::Debug for JobExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobExecutionContext")
            .field("job_id", &self.job_id)
            .field("coordinator", &self.coordinator_node_id)
            .field("participants", &self.participating_nodes)
            .field("state", &self.state())
            .field(
                "sub_contexts",
                &self
                    .sub_contexts
                    .iter()
                    .map(|sub| format!("{}:{}", sub.id(), sub.name()))
                    .collect_vec(),
            )
            .finish()
    }
}

/// Collects the sub-executions of a job before it is registered.
pub struct JobExecutionContextBuilder {
    job_id: JobId,
    coordinator_node_id: String,
    participating_nodes: Vec<String>,
    sub_contexts: Vec<Arc<dyn SubExecutionContext>>,
    shared_shard_contexts: Arc<SharedShardContexts>,
}

impl JobExecutionContextBuilder {
    pub fn new(job_id: JobId, coordinator_node_id: &str, participating_nodes: Vec<String>) -> Self {
        Self {
            job_id,
            coordinator_node_id: coordinator_node_id.to_string(),
            participating_nodes,
            sub_contexts: Vec::new(),
            shared_shard_contexts: Arc::new(SharedShardContexts::new(job_id)),
        }
    }

    pub fn add_sub_context(&mut self, sub_context: Arc<dyn SubExecutionContext>) -> &mut Self {
        self.sub_contexts.push(sub_context);
        self
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn is_empty(&self) -> bool {
        self.sub_contexts.is_empty()
    }

    /// The shard contexts of the job, for collectors built before the job is registered.
    pub fn shared_shard_contexts(&self) -> Arc<SharedShardContexts> {
        self.shared_shard_contexts.clone()
    }

    /// Builds the context and wires the sub-execution completions into it.
    /// Fails if no sub-execution was added, or two share a phase id.
    pub fn build(&self) -> Result<JobExecutionContext> {
        if self.sub_contexts.is_empty() {
            return errinput!("{EMPTY_BUILDER_MSG}");
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.sub_contexts.iter().find(|sub| !seen.insert(sub.id())) {
            return errinput!(
                "sub-context {} was added twice to job {}",
                duplicate.id(),
                self.job_id
            );
        }

        let countdown = Arc::new(CountdownCompletion::new(self.sub_contexts.len())?);
        let state = Arc::new(AtomicU8::new(JobState::Created as u8));

        let shared = self.shared_shard_contexts.clone();
        let final_state = state.clone();
        let job_id = self.job_id;
        let completion = countdown.completion().then(move |outcome| {
            let released = shared.close();
            let _ = final_state.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                match JobState::from_u8(s) {
                    JobState::Killed => None,
                    _ => Some(JobState::Completed as u8),
                }
            });
            trace!("job {job_id} completed, released {released} shard snapshots");
            outcome.clone()
        });

        for sub in &self.sub_contexts {
            let countdown = countdown.clone();
            sub.completion().when_done(move |outcome| {
                countdown.on_outcome(outcome);
            });
        }

        Ok(JobExecutionContext {
            job_id: self.job_id,
            coordinator_node_id: self.coordinator_node_id.clone(),
            participating_nodes: self.participating_nodes.clone(),
            sub_contexts: self.sub_contexts.clone(),
            shared_shard_contexts: self.shared_shard_contexts.clone(),
            state,
            kill_issued: AtomicBool::new(false),
            completion,
            created_at: Instant::now(),
        })
    }
}
