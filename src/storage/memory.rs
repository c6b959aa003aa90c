use crate::collect::QueryCache;
use crate::common::{Error, Result};
use crate::errinput;
use crate::storage::{DocId, IndexShard, Row, Searcher, SegmentReader, ShardId};
use crate::types::Mapping;
use log::trace;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

type Docs = Arc<Vec<Option<Row>>>;

/// An in-memory shard. Writers copy the document list on write, so an
/// acquired searcher keeps seeing the documents as of its acquisition.
#[derive(Debug)]
pub struct MemoryShard {
    shard_id: ShardId,
    mapping: Arc<Mapping>,
    docs: RwLock<Docs>,
    cache: QueryCache,
    acquisitions: AtomicUsize,
    releases: Arc<AtomicUsize>,
    fail_acquire: AtomicBool,
}

impl MemoryShard {
    pub fn new(shard_id: ShardId, mapping: Mapping) -> Self {
        Self {
            shard_id,
            mapping: Arc::new(mapping),
            docs: RwLock::new(Arc::new(Vec::new())),
            cache: QueryCache::default(),
            acquisitions: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
            fail_acquire: AtomicBool::new(false),
        }
    }

    /// Stores a document, returning its doc id.
    pub fn index(&self, row: Row) -> Result<DocId> {
        self.check_row(&row)?;
        let mut docs = self.docs.write()?;
        let doc = DocId::try_from(docs.len()).map_err(|_| Error::OutOfBounds)?;
        Arc::make_mut(&mut docs).push(Some(row));
        Ok(doc)
    }

    /// Deletes a document. Returns false if there was no live document.
    pub fn delete(&self, doc: DocId) -> Result<bool> {
        let mut docs = self.docs.write()?;
        match docs.get(doc as usize) {
            Some(Some(_)) => {
                Arc::make_mut(&mut docs)[doc as usize] = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn doc_count(&self) -> Result<usize> {
        Ok(self.docs.read()?.iter().flatten().count())
    }

    /// Number of searchers acquired so far.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Number of searchers released so far.
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn open_searchers(&self) -> usize {
        self.acquisitions().saturating_sub(self.releases())
    }

    /// Makes subsequent searcher acquisitions fail.
    pub fn set_fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    fn check_row(&self, row: &Row) -> Result<()> {
        if row.size() != self.mapping.col_count() {
            return errinput!(
                "document has {} values but shard {} maps {} columns",
                row.size(),
                self.shard_id,
                self.mapping.col_count()
            );
        }
        for (field, column) in row.iter().zip(self.mapping.columns()) {
            match field.data_type() {
                None if !column.nullable() => {
                    return errinput!("column {} can't be NULL", column.name());
                }
                Some(data_type) if data_type != column.data_type() => {
                    return errinput!(
                        "value {field} doesn't match column {} of type {}",
                        column.name(),
                        column.data_type()
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl IndexShard for MemoryShard {
    fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    fn mapping(&self) -> Arc<Mapping> {
        self.mapping.clone()
    }

    fn query_cache(&self) -> &QueryCache {
        &self.cache
    }

    fn acquire_searcher(&self, source: &str) -> Result<Searcher> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(Error::Internal(format!(
                "failed to acquire searcher on shard {}",
                self.shard_id
            )));
        }
        let snapshot = self.docs.read()?.clone();
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        trace!("acquired searcher [{source}] on shard {}", self.shard_id);

        let releases = self.releases.clone();
        let reader = Arc::new(MemorySegmentReader { docs: snapshot });
        Ok(Searcher::new(source, reader, move || {
            releases.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

struct MemorySegmentReader {
    docs: Docs,
}

impl SegmentReader for MemorySegmentReader {
    fn max_doc(&self) -> DocId {
        DocId::try_from(self.docs.len()).unwrap_or(DocId::MAX)
    }

    fn document(&self, doc: DocId) -> Result<Option<Row>> {
        match self.docs.get(doc as usize) {
            Some(row) => Ok(row.clone()),
            None => Err(Error::OutOfBounds),
        }
    }
}
