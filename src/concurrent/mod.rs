//! Concurrency primitives shared by the job registry and the collectors.
mod completion;
mod countdown;
mod kill_signal;
mod threadpool;

pub use completion::Completion;
pub use countdown::CountdownCompletion;
pub use kill_signal::KillSignal;
pub use threadpool::{Executor, ThreadPool};
