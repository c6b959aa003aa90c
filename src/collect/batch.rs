use crate::collect::collector::ensure_live;
use crate::collect::{Batch, CollectorContext, InputContext, QueryContext};
use crate::common::constants::COLLECTOR_CLOSED_MSG;
use crate::common::{Error, Result};
use crate::concurrent::{Completion, Executor, KillSignal};
use crate::storage::{scan_docs, Row, Searcher};
use log::trace;
use std::sync::Arc;

/// Everything a batch collector needs, prepared by the provider. The scoring
/// requirements are only known to the caller, see [`BatchCollectorBuilder::build`].
pub struct BatchCollectorBuilder {
    searcher: Arc<Searcher>,
    query: QueryContext,
    inputs: InputContext,
    context: CollectorContext,
    kill_signal: KillSignal,
    executor: Arc<Executor>,
}

impl BatchCollectorBuilder {
    pub(super) fn new(
        searcher: Arc<Searcher>,
        query: QueryContext,
        inputs: InputContext,
        context: CollectorContext,
        kill_signal: KillSignal,
        executor: Arc<Executor>,
    ) -> Self {
        Self {
            searcher,
            query,
            inputs,
            context,
            kill_signal,
            executor,
        }
    }

    pub fn collector_context(&self) -> &CollectorContext {
        &self.context
    }

    /// Whether the collected columns include `_score`.
    pub fn requires_scores(&self) -> bool {
        self.inputs.requires_score()
    }

    /// `do_scores` fills `_score` outputs, otherwise they are NULL.
    pub fn build(&self, do_scores: bool) -> BatchCollector {
        BatchCollector {
            scan: Arc::new(Scan {
                searcher: self.searcher.clone(),
                query: self.query.clone(),
                inputs: self.inputs.clone(),
                context: self.context.clone(),
                kill_signal: self.kill_signal.clone(),
                do_scores,
            }),
            executor: self.executor.clone(),
            done: false,
            closed: false,
        }
    }
}

struct Scan {
    searcher: Arc<Searcher>,
    query: QueryContext,
    inputs: InputContext,
    context: CollectorContext,
    kill_signal: KillSignal,
    do_scores: bool,
}

impl Scan {
    fn run(&self) -> Result<Vec<Row>> {
        self.kill_signal.check()?;
        let reader = self.searcher.reader()?;
        let mut rows = Vec::new();
        for entry in scan_docs(reader) {
            ensure_live(&self.kill_signal, &self.searcher)?;
            let (_, document) = entry?;
            if let Some(score) = self.query.score(&document)? {
                let score = self.do_scores.then_some(score);
                rows.push(self.inputs.project(&self.context, &document, score)?);
            }
        }
        trace!(
            "collected {} rows from reader {}",
            rows.len(),
            self.context.reader_id()
        );
        Ok(rows)
    }
}

/// Collects every matching row of the shard in one go, on the search executor.
pub struct BatchCollector {
    scan: Arc<Scan>,
    executor: Arc<Executor>,
    done: bool,
    closed: bool,
}

impl BatchCollector {
    /// Runs the collection on the search executor.
    pub fn collect(&self) -> Completion<Vec<Row>> {
        let completion = Completion::new();
        if self.closed {
            completion.set(Err(Error::Closed(COLLECTOR_CLOSED_MSG.to_string())));
            return completion;
        }
        let scan = self.scan.clone();
        let target = completion.clone();
        if let Err(e) = self.executor.execute(move || {
            target.set(scan.run());
        }) {
            completion.set(Err(e));
        }
        completion
    }

    /// All rows as a single last batch, then empty terminal batches.
    pub fn produce_batch(&mut self) -> Result<Batch> {
        if self.closed {
            return Err(Error::Closed(COLLECTOR_CLOSED_MSG.to_string()));
        }
        if self.done {
            return Ok(Batch::terminal());
        }
        let rows = self.collect().wait()?;
        self.done = true;
        Ok(Batch { rows, last: true })
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}
