//! Shard level collection: converting where clauses, sharing shard snapshots
//! within a job, and producing row batches for the merge above.
mod batch;
mod collector;
mod context;
mod inputs;
mod job_collect;
mod ordered;
mod phase;
mod provider;
mod query;
mod shared;
mod sort;
mod symbol;

pub use batch::{BatchCollector, BatchCollectorBuilder};
pub use collector::{Batch, ShardCollector};
pub use context::{CollectorContext, CollectorFieldsVisitor};
pub use inputs::{DocInputFactory, Input, InputContext};
pub use job_collect::JobCollectContext;
pub use ordered::OrderedCollector;
pub use phase::{RoutedCollectPhase, RoutedCollectPhaseBuilder};
pub use provider::ShardCollectorProvider;
pub use query::{Query, QueryBuilder, QueryCache, QueryContext, QueryShardContext, SymbolQueryBuilder};
pub use shared::{SearcherLease, SharedShardContext, SharedShardContexts};
pub use sort::{Sort, SortField, SortGenerator, SortKey, SortSource, SymbolSortGenerator};
pub use symbol::{Operator, OrderBy, Symbol, SCORE_COLUMN};

#[cfg(test)]
mod tests;
