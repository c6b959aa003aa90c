mod memory;
mod row;
mod searcher;
mod shard;

pub use memory::MemoryShard;
pub use row::{Row, RowIterator, Rows};
pub use searcher::Searcher;
pub use shard::{scan_docs, DocId, DocIterator, IndexShard, SegmentReader, ShardId};
