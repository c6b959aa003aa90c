use crate::collect::{
    BatchCollectorBuilder, CollectorContext, DocInputFactory, InputContext, JobCollectContext,
    OrderedCollector, QueryBuilder, QueryContext, QueryShardContext, RoutedCollectPhase,
    SearcherLease, SharedShardContext, ShardCollector, SortGenerator, SymbolQueryBuilder,
    SymbolSortGenerator,
};
use crate::common::Result;
use crate::concurrent::ThreadPool;
use crate::config::{Paging, Settings};
use crate::errinput;
use crate::storage::IndexShard;
use log::trace;
use std::sync::Arc;

/// Builds the collectors reading one shard.
///
/// Both paths check the phase's kill signal, lease the job's shared snapshot
/// of the shard, convert the where clause, resolve the collected columns,
/// register the searcher with the phase, and only then commit the lease. A
/// failure before the commit drops the lease, which releases a snapshot
/// acquired for this construction.
pub struct ShardCollectorProvider {
    shard: Arc<dyn IndexShard>,
    query_builder: Arc<dyn QueryBuilder>,
    sort_generator: Arc<dyn SortGenerator>,
    thread_pool: Arc<ThreadPool>,
    local_node_id: String,
    paging: Paging,
}

struct Prepared {
    lease: SearcherLease,
    query: QueryContext,
    inputs: InputContext,
    context: CollectorContext,
    factory: DocInputFactory,
}

impl ShardCollectorProvider {
    pub fn new(shard: Arc<dyn IndexShard>, thread_pool: Arc<ThreadPool>, settings: &Settings) -> Self {
        Self {
            shard,
            query_builder: Arc::new(SymbolQueryBuilder),
            sort_generator: Arc::new(SymbolSortGenerator),
            thread_pool,
            local_node_id: settings.node_id.clone(),
            paging: settings.paging,
        }
    }

    pub fn with_query_builder(mut self, query_builder: Arc<dyn QueryBuilder>) -> Self {
        self.query_builder = query_builder;
        self
    }

    pub fn with_sort_generator(mut self, sort_generator: Arc<dyn SortGenerator>) -> Self {
        self.sort_generator = sort_generator;
        self
    }

    pub fn shard(&self) -> &Arc<dyn IndexShard> {
        &self.shard
    }

    /// The collector fitting the phase: ordered if it requests an ordering.
    pub fn get_collector(
        &self,
        phase: &RoutedCollectPhase,
        collect_context: &JobCollectContext,
        requires_repeat: bool,
    ) -> Result<ShardCollector> {
        match phase.order_by() {
            Some(_) => {
                let shared = collect_context
                    .shared_shard_contexts()
                    .get_or_create(self.shard.clone())?;
                let collector =
                    self.get_ordered_collector(phase, &shared, collect_context, requires_repeat)?;
                Ok(ShardCollector::Ordered(collector))
            }
            None => {
                let builder = self.get_builder(phase, collect_context)?;
                Ok(ShardCollector::Batch(builder.build(builder.requires_scores())))
            }
        }
    }

    /// Prepares a one-shot collector over the job's snapshot of the shard.
    pub fn get_builder(
        &self,
        phase: &RoutedCollectPhase,
        collect_context: &JobCollectContext,
    ) -> Result<BatchCollectorBuilder> {
        let shared = collect_context
            .shared_shard_contexts()
            .get_or_create(self.shard.clone())?;
        let prepared = self.prepare(phase, &shared, collect_context)?;
        let executor = self.thread_pool.search()?;

        let reader_id = prepared.context.reader_id();
        collect_context.add_searcher(reader_id, prepared.lease.searcher().clone())?;
        let searcher = prepared.lease.commit()?;
        trace!(
            "created batch collector for shard {} of job {}, reader {reader_id}",
            self.shard.shard_id(),
            phase.job_id()
        );
        Ok(BatchCollectorBuilder::new(
            searcher,
            prepared.query,
            prepared.inputs,
            prepared.context,
            collect_context.kill_signal(),
            executor,
        ))
    }

    /// Builds a resumable collector returning the shard's rows in the phase's
    /// order, in batches sized by the node's row budget.
    pub fn get_ordered_collector(
        &self,
        phase: &RoutedCollectPhase,
        shared: &Arc<SharedShardContext>,
        collect_context: &JobCollectContext,
        requires_repeat: bool,
    ) -> Result<OrderedCollector> {
        let Some(order_by) = phase.order_by() else {
            return errinput!("collect phase {} has no ordering", phase.phase_id());
        };
        let prepared = self.prepare(phase, shared, collect_context)?;
        let sort = self
            .sort_generator
            .generate(&prepared.context, order_by, &prepared.factory)?;
        let batch_size = phase.shard_queue_size(&self.local_node_id, &self.paging);

        let reader_id = prepared.context.reader_id();
        collect_context.add_searcher(reader_id, prepared.lease.searcher().clone())?;
        let searcher = prepared.lease.commit()?;
        trace!(
            "created ordered collector for shard {} of job {}, reader {reader_id}, \
             expected batch size {batch_size}",
            self.shard.shard_id(),
            phase.job_id()
        );
        Ok(OrderedCollector::new(
            self.shard.shard_id().clone(),
            searcher,
            prepared.query,
            prepared.inputs,
            prepared.context,
            sort,
            batch_size,
            requires_repeat,
            collect_context.kill_signal(),
        ))
    }

    /// Everything up to the commit. The returned lease still releases the
    /// snapshot when dropped, so every later failure of the caller must happen
    /// before it commits.
    fn prepare(
        &self,
        phase: &RoutedCollectPhase,
        shared: &Arc<SharedShardContext>,
        collect_context: &JobCollectContext,
    ) -> Result<Prepared> {
        collect_context.kill_signal().check()?;
        let lease = shared.acquire_searcher()?;
        let mapping = self.shard.mapping();
        let query = self.query_builder.convert(
            phase.where_clause(),
            &QueryShardContext {
                shard_id: self.shard.shard_id(),
                mapping: &mapping,
                cache: self.shard.query_cache(),
            },
        )?;
        let factory = DocInputFactory::new(mapping.clone());
        let inputs = factory.extract_implementations(phase.to_collect())?;
        let context = CollectorContext::new(
            mapping,
            inputs.fields_visitor(),
            lease.reader_id(),
            phase.relation_id(),
        );
        Ok(Prepared {
            lease,
            query,
            inputs,
            context,
            factory,
        })
    }
}
