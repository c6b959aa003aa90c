use crate::common::{Error, Result};
use crate::common::constants::SNAPSHOT_RELEASED_MSG;
use crate::storage::SegmentReader;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// An acquired snapshot of a shard. Closing it releases the snapshot back to
/// the shard; the reader can no longer be used afterwards.
pub struct Searcher {
    source: String,
    reader: Arc<dyn SegmentReader>,
    closed: AtomicBool,
    on_release: Mutex<Option<ReleaseHook>>,
}

impl Searcher {
    pub fn new(
        source: &str,
        reader: Arc<dyn SegmentReader>,
        on_release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            source: source.to_string(),
            reader,
            closed: AtomicBool::new(false),
            on_release: Mutex::new(Some(Box::new(on_release))),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn reader(&self) -> Result<Arc<dyn SegmentReader>> {
        if self.is_closed() {
            return Err(Error::Closed(SNAPSHOT_RELEASED_MSG.to_string()));
        }
        Ok(self.reader.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Releases the snapshot. Returns false if it was already released.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let hook = match self.on_release.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(hook) = hook {
            hook();
        }
        true
    }
}

impl Drop for Searcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Searcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Searcher")
            .field("source", &self.source)
            .field("max_doc", &self.reader.max_doc())
            .field("closed", &self.is_closed())
            .finish()
    }
}
