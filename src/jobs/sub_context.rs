use crate::common::{Error, Result};
use crate::concurrent::Completion;
use crate::jobs::JobId;
use std::fmt;

/// A node-local unit of work within a job, e.g. a shard collect or a merge.
///
/// Implementations must resolve their [`Completion`] exactly once, whether they
/// finish, fail or get killed.
pub trait SubExecutionContext: Send + Sync + fmt::Debug {
    /// The phase id, unique within the job.
    fn id(&self) -> i32;

    fn name(&self) -> &str;

    fn start(&self) -> Result<()>;

    /// Requests the sub-execution to stop. Must be safe to call repeatedly and
    /// after the sub-execution completed.
    fn kill(&self, reason: &Error);

    fn completion(&self) -> Completion<()>;
}

/// Observer of kill sweeps, notified before any context is killed.
pub trait KillAllListener: Send + Sync {
    fn kill_all_jobs(&self, timestamp_nanos: u64) -> Result<()>;

    fn kill_job(&self, job_id: JobId) -> Result<()>;
}
