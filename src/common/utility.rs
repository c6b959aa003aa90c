use crate::common::{Error, Result};
use crate::concurrent::Completion;
use crate::jobs::{JobId, KillAllListener, SubExecutionContext};
use crate::storage::{MemoryShard, Row, ShardId};
use crate::types::field::Field;
use crate::types::{DataType, Mapping};
use rand::{random, Rng};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// `id INTEGER NOT NULL, name STRING, score FLOAT, active BOOLEAN`
pub fn users_mapping() -> Mapping {
    Mapping::builder()
        .not_null_column("id", DataType::Integer)
        .column("name", DataType::String)
        .column("score", DataType::Float)
        .column("active", DataType::Boolean)
        .build()
}

pub fn create_random_row(id: i32, rng: &mut ChaCha8Rng) -> Row {
    let name = match rng.gen_range(0..5) {
        0 => Field::Null,
        _ => Field::from(format!("user-{}", rng.gen_range(0..1000))),
    };
    let score = match rng.gen_range(0..8) {
        0 => Field::Null,
        _ => Field::from(rng.gen_range(0.0_f32..100.0)),
    };
    Row::from(vec![Field::from(id), name, score, Field::from(rng.gen_bool(0.5))])
}

/// A `users` shard holding `n` random documents with ids `0..n`.
pub fn create_user_shard(n: usize, seed_in: Option<u64>) -> Arc<MemoryShard> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed_in.unwrap_or_else(random));
    let shard = MemoryShard::new(ShardId::new("users", 0), users_mapping());
    for id in 0..n {
        shard
            .index(create_random_row(id as i32, &mut rng))
            .unwrap();
    }
    Arc::new(shard)
}

/// A sub-execution that records how it is driven and completes on demand.
#[derive(Debug)]
pub struct RecordingSubContext {
    id: i32,
    name: String,
    starts: AtomicUsize,
    kills: AtomicUsize,
    complete_on_kill: AtomicBool,
    fail_start: AtomicBool,
    completion: Completion<()>,
}

impl RecordingSubContext {
    pub fn new(id: i32) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: format!("recording-{id}"),
            starts: AtomicUsize::new(0),
            kills: AtomicUsize::new(0),
            complete_on_kill: AtomicBool::new(true),
            fail_start: AtomicBool::new(false),
            completion: Completion::new(),
        })
    }

    /// A sub-execution that ignores kills, so a test controls when it completes.
    pub fn ignoring_kill(id: i32) -> Arc<Self> {
        let sub = Self::new(id);
        sub.complete_on_kill.store(false, Ordering::SeqCst);
        sub
    }

    pub fn failing_start(id: i32) -> Arc<Self> {
        let sub = Self::new(id);
        sub.fail_start.store(true, Ordering::SeqCst);
        sub
    }

    pub fn complete(&self, outcome: Result<()>) -> bool {
        self.completion.set(outcome)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

impl SubExecutionContext for RecordingSubContext {
    fn id(&self) -> i32 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        match self.fail_start.load(Ordering::SeqCst) {
            true => Err(Error::Internal(format!("{} failed to start", self.name))),
            false => Ok(()),
        }
    }

    fn kill(&self, reason: &Error) {
        self.kills.fetch_add(1, Ordering::SeqCst);
        if self.complete_on_kill.load(Ordering::SeqCst) {
            self.completion.set(Err(reason.clone()));
        }
    }

    fn completion(&self) -> Completion<()> {
        self.completion.clone()
    }
}

/// Records every kill sweep notification.
#[derive(Default)]
pub struct RecordingListener {
    pub kill_all_timestamps: Mutex<Vec<u64>>,
    pub killed_jobs: Mutex<Vec<JobId>>,
}

impl KillAllListener for RecordingListener {
    fn kill_all_jobs(&self, timestamp_nanos: u64) -> Result<()> {
        self.kill_all_timestamps.lock()?.push(timestamp_nanos);
        Ok(())
    }

    fn kill_job(&self, job_id: JobId) -> Result<()> {
        self.killed_jobs.lock()?.push(job_id);
        Ok(())
    }
}

pub struct FailingListener;

impl KillAllListener for FailingListener {
    fn kill_all_jobs(&self, _: u64) -> Result<()> {
        Err(Error::Internal("listener failed".to_string()))
    }

    fn kill_job(&self, _: JobId) -> Result<()> {
        Err(Error::Internal("listener failed".to_string()))
    }
}

pub struct PanickingListener;

impl KillAllListener for PanickingListener {
    fn kill_all_jobs(&self, _: u64) -> Result<()> {
        panic!("listener panicked")
    }

    fn kill_job(&self, _: JobId) -> Result<()> {
        panic!("listener panicked")
    }
}
