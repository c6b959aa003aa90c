// JobContextService
pub const EMPTY_BUILDER_MSG: &str =
    "JobExecutionContext.Builder must at least contain 1 SubExecutionContext";
pub const SERVICE_CLOSED_MSG: &str = "JobContextService is stopped or closed";

// JobExecutionContext / collectors
pub const JOB_KILLED_MSG: &str = "Job killed";
pub const ALREADY_STARTED_MSG: &str = "JobExecutionContext was already started";

// CountdownCompletion
pub const ZERO_COUNTDOWN_MSG: &str = "CountdownCompletion requires a count of at least 1";

// Completion
pub const COMPLETION_DROPPED_MSG: &str = "Completion was dropped before it was set";

// SharedShardContext / Searcher
pub const SEARCHER_SOURCE: &str = "search";
pub const SNAPSHOT_RELEASED_MSG: &str = "Searcher snapshot was already released";

// Collectors
pub const COLLECTOR_CLOSED_MSG: &str = "Collector is closed";
pub const REPEAT_NOT_SUPPORTED_MSG: &str =
    "Collector was not built with `requires_repeat`, rows can't be repeated";
