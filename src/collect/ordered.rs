use crate::collect::collector::ensure_live;
use crate::collect::{Batch, CollectorContext, InputContext, QueryContext, Sort, SortKey};
use crate::common::constants::{COLLECTOR_CLOSED_MSG, REPEAT_NOT_SUPPORTED_MSG};
use crate::common::{Error, Result};
use crate::concurrent::KillSignal;
use crate::errinput;
use crate::storage::{scan_docs, Row, Rows, Searcher, ShardId};
use std::cmp::Ordering;
use std::sync::Arc;

/// A resumable, sorted stream of row batches from one shard snapshot.
///
/// Every batch continues after the sort key of the last row emitted before
/// (search-after), so a merging consumer can pull more rows from exactly the
/// shards it still needs. Memory stays bounded by the batch size: each pass
/// keeps at most twice the batch size of candidates.
pub struct OrderedCollector {
    shard_id: ShardId,
    searcher: Arc<Searcher>,
    query: QueryContext,
    inputs: InputContext,
    context: CollectorContext,
    sort: Sort,
    batch_size: usize,
    do_scores: bool,
    requires_repeat: bool,
    kill_signal: KillSignal,
    last_key: Option<SortKey>,
    exhausted: bool,
    closed: bool,
    emitted: Vec<Row>,
}

impl OrderedCollector {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        shard_id: ShardId,
        searcher: Arc<Searcher>,
        query: QueryContext,
        inputs: InputContext,
        context: CollectorContext,
        sort: Sort,
        batch_size: usize,
        requires_repeat: bool,
        kill_signal: KillSignal,
    ) -> Self {
        let do_scores = inputs.requires_score();
        Self {
            shard_id,
            searcher,
            query,
            inputs,
            context,
            sort,
            batch_size: batch_size.max(1),
            do_scores,
            requires_repeat,
            kill_signal,
            last_key: None,
            exhausted: false,
            closed: false,
            emitted: Vec::new(),
        }
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn collector_context(&self) -> &CollectorContext {
        &self.context
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The next batch in sort order. Once the shard is exhausted, returns
    /// empty terminal batches.
    pub fn produce_batch(&mut self) -> Result<Batch> {
        if self.closed {
            return Err(Error::Closed(COLLECTOR_CLOSED_MSG.to_string()));
        }
        if self.exhausted {
            return Ok(Batch::terminal());
        }
        self.kill_signal.check()?;
        let reader = self.searcher.reader()?;

        let capacity = self.batch_size.saturating_mul(2);
        let mut candidates: Vec<(SortKey, Row, f32)> = Vec::new();
        for entry in scan_docs(reader) {
            ensure_live(&self.kill_signal, &self.searcher)?;
            let (doc, document) = entry?;
            let Some(score) = self.query.score(&document)? else {
                continue;
            };
            let key = self.sort.key(doc, &document, score)?;
            if let Some(last) = &self.last_key {
                if self.sort.compare(&key, last) != Ordering::Greater {
                    continue;
                }
            }
            candidates.push((key, document, score));
            if candidates.len() >= capacity {
                self.keep_top(&mut candidates);
            }
        }
        self.keep_top(&mut candidates);

        self.exhausted = candidates.len() < self.batch_size;
        if let Some((key, _, _)) = candidates.last() {
            self.last_key = Some(key.clone());
        }
        let rows = candidates
            .iter()
            .map(|(_, document, score)| {
                let score = self.do_scores.then_some(*score);
                self.inputs.project(&self.context, document, score)
            })
            .collect::<Result<Vec<_>>>()?;
        if self.requires_repeat {
            self.emitted.extend(rows.iter().cloned());
        }
        Ok(Batch {
            rows,
            last: self.exhausted,
        })
    }

    /// Replays every row emitted so far, from the first batch on. Only
    /// available when built with `requires_repeat`.
    pub fn repeat(&self) -> Result<Rows> {
        if !self.requires_repeat {
            return errinput!("{REPEAT_NOT_SUPPORTED_MSG}");
        }
        if self.closed {
            return Err(Error::Closed(COLLECTOR_CLOSED_MSG.to_string()));
        }
        Ok(Box::new(self.emitted.clone().into_iter().map(Ok::<Row, Error>)))
    }

    /// Stops the collector. The snapshot is released by the job, not here.
    pub fn close(&mut self) {
        self.closed = true;
        self.emitted.clear();
    }

    fn keep_top(&self, candidates: &mut Vec<(SortKey, Row, f32)>) {
        candidates.sort_by(|a, b| self.sort.compare(&a.0, &b.0));
        candidates.truncate(self.batch_size);
    }
}
