// Node
pub const DEFAULT_NODE_ID: &str = "node-0";
pub const ENV_PREFIX: &str = "RUSTYEXEC";

// ThreadPool
pub const DEFAULT_SEARCH_THREADS: usize = 4;

// Paging: rows requested per shard when neither a limit nor a page size hint bounds them.
pub const DEFAULT_PAGE_SIZE: usize = 500_000;
pub const PAGE_OVERHEAD_FACTOR: f64 = 1.5;

// QueryCache: compiled where clauses kept per shard.
pub const QUERY_CACHE_CAPACITY: usize = 256;
