use super::*;
use crate::assert_errors;
use crate::common::utility::{create_random_row, users_mapping, RecordingSubContext};
use crate::common::{ContextType, Error, Result};
use crate::concurrent::ThreadPool;
use crate::config::config::DEFAULT_NODE_ID;
use crate::config::{Paging, Settings};
use crate::jobs::{JobContextService, JobExecutionContext, JobId, JobState, SubExecutionContext};
use crate::storage::{IndexShard, MemoryShard, Row, ShardId};
use crate::types::Field;
use itertools::Itertools;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::cmp::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Fixture {
    service: JobContextService,
    shard: Arc<MemoryShard>,
    documents: Vec<Row>,
    provider: ShardCollectorProvider,
}

impl Fixture {
    fn new(docs: usize) -> Self {
        Self::with_settings(docs, Settings::default())
    }

    fn with_settings(docs: usize, settings: Settings) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let shard = MemoryShard::new(ShardId::new("users", 0), users_mapping());
        let documents = (0..docs)
            .map(|id| create_random_row(id as i32, &mut rng))
            .collect_vec();
        for document in &documents {
            shard.index(document.clone()).unwrap();
        }
        let shard = Arc::new(shard);
        let thread_pool = Arc::new(ThreadPool::new(&settings));
        Self {
            service: JobContextService::new(&settings).unwrap(),
            provider: ShardCollectorProvider::new(shard.clone(), thread_pool, &settings),
            shard,
            documents,
        }
    }

    /// Registers and starts a job running `phase`.
    fn start_job(
        &self,
        phase: &RoutedCollectPhase,
    ) -> (Arc<JobExecutionContext>, Arc<JobCollectContext>) {
        self.start_job_with(phase, &[])
    }

    /// Registers and starts a job running `phase` next to other sub-executions.
    fn start_job_with(
        &self,
        phase: &RoutedCollectPhase,
        others: &[Arc<RecordingSubContext>],
    ) -> (Arc<JobExecutionContext>, Arc<JobCollectContext>) {
        let mut builder = self.service.new_local_builder(phase.job_id());
        let collect = Arc::new(JobCollectContext::new(
            phase,
            builder.shared_shard_contexts(),
        ));
        builder.add_sub_context(collect.clone());
        for other in others {
            builder.add_sub_context(other.clone());
        }
        let job = self.service.create_context(&builder).unwrap();
        job.start().unwrap();
        (job, collect)
    }

    fn shared_context(&self, collect: &JobCollectContext) -> Arc<SharedShardContext> {
        collect
            .shared_shard_contexts()
            .get_or_create(self.shard.clone())
            .unwrap()
    }
}

/// `SELECT id, score FROM users` routed to the local node's only shard.
fn phase(job_id: JobId) -> RoutedCollectPhaseBuilder {
    let mut builder = RoutedCollectPhase::builder(job_id, 1);
    builder
        .relation_id("users")
        .route(DEFAULT_NODE_ID, vec![ShardId::new("users", 0)])
        .to_collect(vec![Symbol::column("id"), Symbol::column("score")]);
    builder
}

fn id_and_score(document: &Row) -> Row {
    Row::from(vec![
        document.get_field(0).unwrap(),
        document.get_field(2).unwrap(),
    ])
}

struct RejectingQueryBuilder;

impl QueryBuilder for RejectingQueryBuilder {
    fn convert(&self, _: Option<&Symbol>, _: &QueryShardContext<'_>) -> Result<QueryContext> {
        Err(Error::Translation("unsupported predicate".to_string()))
    }
}

fn is_cancelled<T>(result: Result<T>) -> bool {
    matches!(result, Err(e) if e.is_cancellation())
}

/// Kills the collect phase while its where clause is being converted.
struct KillingQueryBuilder {
    collect: Arc<JobCollectContext>,
}

impl QueryBuilder for KillingQueryBuilder {
    fn convert(
        &self,
        where_clause: Option<&Symbol>,
        context: &QueryShardContext<'_>,
    ) -> Result<QueryContext> {
        self.collect.kill(&Error::Killed("killed during conversion".to_string()));
        SymbolQueryBuilder.convert(where_clause, context)
    }
}

#[test]
fn test_concurrent_builds_share_one_snapshot() {
    let fixture = Fixture::new(10);
    let phase = phase(JobId::new()).build().unwrap();
    let (job, collect) = fixture.start_job(&phase);

    let builders = thread::scope(|s| {
        let handles = (0..8)
            .map(|_| s.spawn(|| fixture.provider.get_builder(&phase, &collect)))
            .collect_vec();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect_vec()
    });
    assert_eq!(fixture.shard.acquisitions(), 1);
    let reader_ids = builders
        .iter()
        .map(|b| b.collector_context().reader_id())
        .unique()
        .collect_vec();
    assert_eq!(reader_ids.len(), 1);
    assert!(collect.searcher(reader_ids[0]).is_ok());

    collect.finish(Ok(()));
    assert_eq!(job.completion().wait_timeout(Duration::from_secs(5)), Some(Ok(())));
    assert_eq!(fixture.shard.releases(), 1);
    assert_eq!(fixture.service.num_active_contexts(), 0);
}

#[test]
fn test_ordered_collector_pages_through_shard() {
    let settings = Settings {
        paging: Paging {
            page_size: 50,
            overhead_factor: 1.0,
        },
        ..Settings::default()
    };
    let fixture = Fixture::with_settings(120, settings);
    let phase = phase(JobId::new())
        .order_by(OrderBy::desc(Symbol::column("score")))
        .build()
        .unwrap();
    let (_job, collect) = fixture.start_job(&phase);
    let shared = fixture.shared_context(&collect);
    let mut collector = fixture
        .provider
        .get_ordered_collector(&phase, &shared, &collect, true)
        .unwrap();
    assert_eq!(collector.batch_size(), 50);

    let mut batches = Vec::new();
    loop {
        let batch = collector.produce_batch().unwrap();
        let last = batch.last;
        batches.push(batch);
        if last {
            break;
        }
    }
    assert_eq!(batches.iter().map(Batch::len).collect_vec(), vec![50, 50, 20]);
    assert!(collector.is_exhausted());
    assert_eq!(collector.produce_batch().unwrap(), Batch::terminal());

    // score descending with NULLs first, ties by doc id.
    let expected = fixture
        .documents
        .iter()
        .map(id_and_score)
        .sorted_by(|a, b| {
            let (x, y) = (a.field(1).unwrap(), b.field(1).unwrap());
            let by_score = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => y.cmp(x),
            };
            by_score.then_with(|| a.field(0).cmp(&b.field(0)))
        })
        .collect_vec();
    let collected = batches.into_iter().flat_map(|b| b.rows).collect_vec();
    assert_eq!(collected, expected);

    let repeated = collector.repeat().unwrap().collect::<Result<Vec<_>>>().unwrap();
    assert_eq!(repeated, expected);
    assert_eq!(fixture.shard.acquisitions(), 1);
}

#[test]
fn test_ordered_collector_with_few_rows_is_done_in_one_batch() {
    let fixture = Fixture::new(7);
    let phase = phase(JobId::new())
        .where_clause(Symbol::compare(Symbol::column("id"), Operator::Lt, Symbol::literal(5)))
        .order_by(OrderBy::asc(Symbol::column("id")))
        .limit(100)
        .build()
        .unwrap();
    let (_job, collect) = fixture.start_job(&phase);
    let shared = fixture.shared_context(&collect);
    let mut collector = fixture
        .provider
        .get_ordered_collector(&phase, &shared, &collect, false)
        .unwrap();

    let batch = collector.produce_batch().unwrap();
    assert!(batch.last);
    let ids = batch.rows.iter().map(|r| r.get_field(0).unwrap()).collect_vec();
    assert_eq!(ids, (0..5).map(Field::from).collect_vec());
    assert_errors!(collector.repeat(), Error::InvalidInput(_));
}

#[test]
fn test_failed_conversion_releases_fresh_snapshot() {
    let fixture = Fixture::new(10);
    let failing = phase(JobId::from_u128(1))
        .where_clause(Symbol::compare(
            Symbol::column("missing"),
            Operator::Eq,
            Symbol::literal(1),
        ))
        .build()
        .unwrap();
    let (job, collect) = fixture.start_job(&failing);

    assert_errors!(
        fixture.provider.get_builder(&failing, &collect),
        Error::Translation(_)
    );
    assert_eq!(fixture.shard.acquisitions(), 1);
    assert_eq!(fixture.shard.releases(), 1);
    let shared = fixture.shared_context(&collect);
    assert!(!shared.has_searcher());

    // the shared context is usable again afterwards.
    let valid = phase(JobId::from_u128(1)).build().unwrap();
    fixture.provider.get_builder(&valid, &collect).unwrap();
    assert_eq!(fixture.shard.acquisitions(), 2);
    assert_eq!(fixture.shard.open_searchers(), 1);

    collect.finish(Ok(()));
    job.completion().wait().unwrap();
    assert_eq!(fixture.shard.releases(), 2);
}

#[test]
fn test_failed_conversion_keeps_snapshot_in_use() {
    let fixture = Fixture::new(10);
    let phase = phase(JobId::new()).build().unwrap();
    let (job, collect) = fixture.start_job(&phase);
    fixture.provider.get_builder(&phase, &collect).unwrap();

    let rejecting = ShardCollectorProvider::new(
        fixture.shard.clone(),
        Arc::new(ThreadPool::new(&Settings::default())),
        &Settings::default(),
    )
    .with_query_builder(Arc::new(RejectingQueryBuilder));
    assert_errors!(rejecting.get_builder(&phase, &collect), Error::Translation(_));
    assert_eq!(fixture.shard.acquisitions(), 1);
    assert_eq!(fixture.shard.releases(), 0);

    collect.finish(Ok(()));
    job.completion().wait().unwrap();
    assert_eq!(fixture.shard.releases(), 1);
}

#[test]
fn test_failed_sort_generation_releases_snapshot() {
    let fixture = Fixture::new(10);
    let phase = phase(JobId::new())
        .order_by(OrderBy::asc(Symbol::not(Symbol::column("active"))))
        .build()
        .unwrap();
    let (_job, collect) = fixture.start_job(&phase);
    let shared = fixture.shared_context(&collect);

    assert_errors!(
        fixture
            .provider
            .get_ordered_collector(&phase, &shared, &collect, false),
        Error::Translation(_)
    );
    assert_eq!(fixture.shard.acquisitions(), 1);
    assert_eq!(fixture.shard.releases(), 1);
    assert_errors!(collect.searcher(shared.reader_id()), Error::ContextMissing {
        context_type: ContextType::Searcher,
        ..
    });
}

#[test]
fn test_batch_collector_scores() {
    let fixture = Fixture::new(40);
    let where_clause = Symbol::and(vec![
        Symbol::compare(Symbol::column("id"), Operator::Lt, Symbol::literal(20)),
        Symbol::column("active"),
        Symbol::compare(Symbol::Score, Operator::Gte, Symbol::literal(2)),
    ]);
    let phase = phase(JobId::new())
        .where_clause(where_clause)
        .to_collect(vec![Symbol::column("id"), Symbol::Score])
        .build()
        .unwrap();
    let (_job, collect) = fixture.start_job(&phase);
    let builder = fixture.provider.get_builder(&phase, &collect).unwrap();
    assert!(builder.requires_scores());

    let expected_ids = fixture
        .documents
        .iter()
        .filter(|d| d.get_field(0).unwrap() < Field::from(20))
        .filter(|d| d.get_field(3).unwrap() == Field::from(true))
        .map(|d| d.get_field(0).unwrap())
        .collect_vec();

    let rows = builder.build(true).collect().wait().unwrap();
    assert_eq!(
        rows,
        expected_ids
            .iter()
            .map(|id| Row::from(vec![id.clone(), Field::Float(2.0)]))
            .collect_vec()
    );

    let mut unscored = builder.build(false);
    let batch = unscored.produce_batch().unwrap();
    assert!(batch.last);
    assert!(batch.rows.iter().all(|r| r.get_field(1).unwrap().is_null()));
    assert_eq!(batch.len(), expected_ids.len());
    assert_eq!(unscored.produce_batch().unwrap(), Batch::terminal());
}

#[test]
fn test_min_score_above_every_score_matches_nothing() {
    let fixture = Fixture::new(10);
    let phase = phase(JobId::new())
        .where_clause(Symbol::compare(Symbol::Score, Operator::Gte, Symbol::literal(1.5_f32)))
        .build()
        .unwrap();
    let (_job, collect) = fixture.start_job(&phase);
    let rows = fixture
        .provider
        .get_builder(&phase, &collect)
        .unwrap()
        .build(false)
        .collect()
        .wait()
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_kill_stops_collection() {
    let fixture = Fixture::new(100);
    let phase = phase(JobId::new())
        .order_by(OrderBy::asc(Symbol::column("id")))
        .limit(10)
        .build()
        .unwrap();
    let (job, collect) = fixture.start_job(&phase);
    let mut collector = match fixture.provider.get_collector(&phase, &collect, false).unwrap() {
        ShardCollector::Ordered(collector) => collector,
        ShardCollector::Batch(_) => panic!("expected an ordered collector"),
    };
    assert_eq!(collector.produce_batch().unwrap().len(), 10);

    assert!(job.kill(None));
    assert_eq!(job.state(), JobState::Killed);
    let error = collector.produce_batch().unwrap_err();
    assert!(error.is_cancellation());
    assert!(job.completion().wait().unwrap_err().is_cancellation());
    assert_eq!(fixture.shard.releases(), 1);

    // nothing new can be built for the killed job.
    assert_errors!(fixture.provider.get_builder(&phase, &collect));
    assert_eq!(fixture.shard.acquisitions(), 1);
}

#[test]
fn test_killed_running_job_acquires_no_snapshot() {
    let fixture = Fixture::new(100);
    let ordered = phase(JobId::new())
        .order_by(OrderBy::asc(Symbol::column("id")))
        .build()
        .unwrap();
    let other = RecordingSubContext::ignoring_kill(2);
    let (job, collect) = fixture.start_job_with(&ordered, &[other.clone()]);

    assert!(job.kill(None));
    // the other sub-execution keeps the job running, its shard contexts stay open.
    assert!(!job.completion().is_done());
    let shared = fixture.shared_context(&collect);
    assert!(!shared.is_closed());

    assert!(is_cancelled(fixture.provider.get_builder(&ordered, &collect)));
    assert!(is_cancelled(fixture.provider.get_ordered_collector(
        &ordered, &shared, &collect, false
    )));
    assert_eq!(fixture.shard.acquisitions(), 0);
    assert_eq!(fixture.shard.open_searchers(), 0);

    other.complete(Ok(()));
    assert!(job.completion().wait().unwrap_err().is_cancellation());
}

#[test]
fn test_kill_during_construction_releases_fresh_snapshot() {
    let fixture = Fixture::new(100);
    let ordered = phase(JobId::new())
        .order_by(OrderBy::asc(Symbol::column("id")))
        .build()
        .unwrap();
    let other = RecordingSubContext::ignoring_kill(2);
    let (job, collect) = fixture.start_job_with(&ordered, &[other.clone()]);
    let settings = Settings::default();
    let provider = ShardCollectorProvider::new(
        fixture.shard.clone(),
        Arc::new(ThreadPool::new(&settings)),
        &settings,
    )
    .with_query_builder(Arc::new(KillingQueryBuilder {
        collect: collect.clone(),
    }));

    assert!(is_cancelled(provider.get_builder(&ordered, &collect)));
    assert_eq!(fixture.shard.acquisitions(), 1);
    assert_eq!(fixture.shard.releases(), 1);
    assert_eq!(fixture.shard.open_searchers(), 0);
    assert!(!fixture.shared_context(&collect).has_searcher());
    assert_errors!(collect.searcher(0), Error::ContextMissing { .. });

    // the job is still running; completing it has nothing left to release.
    other.complete(Ok(()));
    assert!(job.completion().wait().unwrap_err().is_cancellation());
    assert_eq!(fixture.shard.releases(), 1);
}

#[test]
fn test_released_snapshot_is_not_read() {
    let fixture = Fixture::new(100);
    let phase = phase(JobId::new())
        .order_by(OrderBy::asc(Symbol::column("id")))
        .limit(10)
        .build()
        .unwrap();
    let (job, collect) = fixture.start_job(&phase);
    let mut collector = fixture.provider.get_collector(&phase, &collect, false).unwrap();
    collector.produce_batch().unwrap();

    collect.finish(Ok(()));
    job.completion().wait().unwrap();
    assert_eq!(fixture.shard.releases(), 1);
    assert_errors!(collector.produce_batch(), Error::Closed(_));

    collector.close();
    assert_eq!(fixture.shard.releases(), 1);
}

#[test]
fn test_get_collector_without_order_is_batch() {
    let fixture = Fixture::new(5);
    let phase = phase(JobId::new()).build().unwrap();
    let (_job, collect) = fixture.start_job(&phase);
    let mut collector = fixture.provider.get_collector(&phase, &collect, false).unwrap();
    assert!(matches!(collector, ShardCollector::Batch(_)));
    assert_eq!(collector.produce_batch().unwrap().len(), 5);
    collector.close();
    assert_errors!(collector.produce_batch(), Error::Closed(_));
}

#[test]
fn test_failed_acquisition_leaves_nothing_behind() {
    let fixture = Fixture::new(5);
    let phase = phase(JobId::new()).build().unwrap();
    let (_job, collect) = fixture.start_job(&phase);
    fixture.shard.set_fail_acquire(true);
    assert_errors!(fixture.provider.get_builder(&phase, &collect), Error::Internal(_));
    assert_eq!(fixture.shard.open_searchers(), 0);

    fixture.shard.set_fail_acquire(false);
    assert!(fixture.provider.get_builder(&phase, &collect).is_ok());
    assert_eq!(fixture.shard.open_searchers(), 1);
}

#[test]
fn test_reader_ids_are_stable_per_shard() {
    let contexts = SharedShardContexts::new(JobId::new());
    let users: Arc<dyn IndexShard> = Arc::new(MemoryShard::new(ShardId::new("users", 0), users_mapping()));
    let orders: Arc<dyn IndexShard> = Arc::new(MemoryShard::new(ShardId::new("users", 1), users_mapping()));

    let first = contexts.get_or_create(users.clone()).unwrap();
    let second = contexts.get_or_create(orders).unwrap();
    assert_ne!(first.reader_id(), second.reader_id());
    assert_eq!(contexts.get_or_create(users).unwrap().reader_id(), first.reader_id());
    assert_eq!(contexts.len(), 2);

    assert_eq!(contexts.close(), 0);
    assert!(first.is_closed());
    assert_errors!(first.acquire_searcher(), Error::Closed(_));
}

#[test]
fn test_shard_queue_size() {
    let shards = (0..4).map(|i| ShardId::new("users", i)).collect_vec();
    let phase = RoutedCollectPhase::builder(JobId::new(), 1)
        .route("node-a", shards.clone())
        .route("node-b", shards[..2].to_vec())
        .to_collect(vec![Symbol::column("id")])
        .limit(100)
        .build()
        .unwrap();
    let paging = Paging::default();
    assert_eq!(phase.shard_queue_size("node-a", &paging), 37);
    assert_eq!(phase.shard_queue_size("node-b", &paging), 75);
    assert_eq!(phase.shard_queue_size("node-c", &paging), 100);

    let hinted = RoutedCollectPhase::builder(JobId::new(), 1)
        .route("node-a", shards[..2].to_vec())
        .to_collect(vec![Symbol::column("id")])
        .node_page_size_hint(1000)
        .build()
        .unwrap();
    assert_eq!(hinted.shard_queue_size("node-a", &paging), 750);
}
