use crate::common::constants::JOB_KILLED_MSG;
use crate::common::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative kill flag, shared between a sub-execution and the collectors
/// producing rows for it. Producers poll it at row and batch boundaries.
#[derive(Clone, Debug, Default)]
pub struct KillSignal {
    killed: Arc<AtomicBool>,
}

impl KillSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Returns `true` only for the call that raised it.
    pub fn kill(&self) -> bool {
        !self.killed.swap(true, Ordering::SeqCst)
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Fails with `Error::Killed` once the flag is raised.
    pub fn check(&self) -> Result<()> {
        match self.is_killed() {
            true => Err(Error::Killed(JOB_KILLED_MSG.to_string())),
            false => Ok(()),
        }
    }
}
