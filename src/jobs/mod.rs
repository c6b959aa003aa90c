mod job_context;
mod job_id;
mod service;
mod stats;
mod sub_context;

pub use job_context::{JobExecutionContext, JobExecutionContextBuilder, JobState};
pub use job_id::JobId;
pub use service::{JobContextService, Lifecycle};
pub use stats::{JobStats, JobStatsSnapshot};
pub use sub_context::{KillAllListener, SubExecutionContext};
