use crate::common::{Error, Result};
use crate::config::Settings;
use crate::errinput;
use crossbeam::channel::{self, Sender};
use log::{error, trace};
use once_cell::sync::OnceCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of named worker threads fed through a channel.
pub struct Executor {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    pub fn new(name: &str, threads: usize) -> Result<Self> {
        if threads == 0 {
            return errinput!("executor `{name}` needs at least one thread");
        }
        let (sender, receiver) = channel::unbounded::<Task>();
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = receiver.clone();
            let worker_name = format!("{name}[{i}]");
            let handle = thread::Builder::new()
                .name(worker_name.clone())
                .spawn(move || {
                    for task in receiver.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                            error!("task panicked on worker {worker_name}");
                        }
                    }
                })
                .map_err(|e| Error::Internal(format!("failed to spawn {name} worker: {e}")))?;
            workers.push(handle);
        }
        trace!("started executor {name} with {threads} threads");
        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues the task. Fails once the executor was shut down.
    pub fn execute<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock()?;
        let Some(sender) = sender.as_ref() else {
            return Err(Error::Closed(format!("executor {} is shut down", self.name)));
        };
        sender
            .send(Box::new(task))
            .map_err(|_| Error::Closed(format!("executor {} is shut down", self.name)))
    }

    /// Stops accepting tasks, drains the queue and joins the workers.
    pub fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if worker.thread().id() == thread::current().id() {
                continue;
            }
            let _ = worker.join();
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The node's named executors. Pools are started on first use.
pub struct ThreadPool {
    search_threads: usize,
    search: OnceCell<Arc<Executor>>,
}

impl ThreadPool {
    pub fn new(settings: &Settings) -> Self {
        Self {
            search_threads: settings.search_threads,
            search: OnceCell::new(),
        }
    }

    /// The executor designated for search (document collection) work.
    pub fn search(&self) -> Result<Arc<Executor>> {
        self.search
            .get_or_try_init(|| Executor::new("search", self.search_threads).map(Arc::new))
            .cloned()
    }

    pub fn shutdown(&self) {
        if let Some(search) = self.search.get() {
            search.shutdown();
        }
    }
}
