use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Cluster-wide identifier of a distributed job, assigned by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// A fresh random job id.
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }

    pub fn from_u128(id: u128) -> Self {
        JobId(Uuid::from_u128(id))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        JobId(uuid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
