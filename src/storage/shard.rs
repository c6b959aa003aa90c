use crate::collect::QueryCache;
use crate::common::Result;
use crate::storage::{Row, Searcher};
use crate::types::Mapping;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Position of a document inside a segment snapshot.
pub type DocId = u32;

/// Identifies a shard: the index it belongs to and its number in that index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId {
    pub index: String,
    pub id: u32,
}

impl ShardId {
    pub fn new(index: &str, id: u32) -> Self {
        Self {
            index: index.to_string(),
            id,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index, self.id)
    }
}

/// A read-only, point-in-time view of a shard's documents.
pub trait SegmentReader: Send + Sync {
    /// One past the largest document id in the snapshot.
    fn max_doc(&self) -> DocId;

    /// Returns the document stored under `doc`, or `None` if it was deleted.
    fn document(&self, doc: DocId) -> Result<Option<Row>>;
}

/// An iterator over the live documents of a snapshot.
pub trait DocIterator: Iterator<Item = Result<(DocId, Row)>> {}
/// Blanket implementation of DocIterator for any `I` satisfying the trait bound.
impl<I: Iterator<Item = Result<(DocId, Row)>>> DocIterator for I {}

/// Scans every live document of `reader` in doc id order.
pub fn scan_docs(reader: Arc<dyn SegmentReader>) -> impl DocIterator {
    (0..reader.max_doc()).filter_map(move |doc| match reader.document(doc) {
        Ok(Some(row)) => Some(Ok((doc, row))),
        Ok(None) => None,
        Err(err) => Some(Err(err)),
    })
}

/// A shard that collectors read from.
pub trait IndexShard: Send + Sync + fmt::Debug {
    fn shard_id(&self) -> &ShardId;

    fn mapping(&self) -> Arc<Mapping>;

    fn query_cache(&self) -> &QueryCache;

    /// Acquires a new point-in-time snapshot of the shard. Every acquired
    /// searcher must be closed exactly once.
    fn acquire_searcher(&self, source: &str) -> Result<Searcher>;
}
