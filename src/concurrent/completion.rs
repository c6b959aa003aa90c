use crate::common::constants::COMPLETION_DROPPED_MSG;
use crate::common::{Error, Result};
use crossbeam::channel::{self, RecvTimeoutError};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type Listener<T> = Box<dyn FnOnce(&Result<T>) + Send>;

enum State<T> {
    Pending(Vec<Listener<T>>),
    Done(Result<T>),
}

/// A one-shot result shared by every clone of the handle.
///
/// The first call to [`Completion::set`] wins. Listeners registered through
/// [`Completion::when_done`] run exactly once: on the thread that sets the
/// result, or right away on the registering thread if the result is already
/// known. Listeners never run while the internal lock is held, so they may
/// freely register further listeners or complete other completions.
pub struct Completion<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Completion<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Pending(Vec::new()))),
        }
    }

    /// A completion that is already resolved with `value`.
    pub fn immediate(value: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Done(Ok(value)))),
        }
    }

    /// A completion that is already resolved with `error`.
    pub fn failed(error: Error) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Done(Err(error)))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves the completion and runs the pending listeners.
    ///
    /// Returns `false` if the completion was already resolved, in which case
    /// `outcome` is dropped.
    pub fn set(&self, outcome: Result<T>) -> bool {
        let listeners = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, State::Done(outcome.clone())) {
                State::Pending(listeners) => listeners,
                State::Done(previous) => {
                    *state = State::Done(previous);
                    return false;
                }
            }
        };
        for listener in listeners {
            listener(&outcome);
        }
        true
    }

    /// Registers a listener that runs once the outcome is known.
    pub fn when_done<F>(&self, listener: F)
    where
        F: FnOnce(&Result<T>) + Send + 'static,
    {
        let outcome = {
            let mut state = self.lock();
            match &mut *state {
                State::Pending(listeners) => {
                    listeners.push(Box::new(listener));
                    return;
                }
                State::Done(outcome) => outcome.clone(),
            }
        };
        listener(&outcome);
    }

    /// Derives a new completion from this one's outcome.
    pub fn then<U, F>(&self, f: F) -> Completion<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(&Result<T>) -> Result<U> + Send + 'static,
    {
        let next = Completion::new();
        let target = next.clone();
        self.when_done(move |outcome| {
            target.set(f(outcome));
        });
        next
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.lock(), State::Done(_))
    }

    /// The outcome, if already known. Never blocks.
    pub fn outcome(&self) -> Option<Result<T>> {
        match &*self.lock() {
            State::Done(outcome) => Some(outcome.clone()),
            State::Pending(_) => None,
        }
    }

    /// Blocks the calling thread until the outcome is known.
    pub fn wait(&self) -> Result<T> {
        let (sender, receiver) = channel::bounded(1);
        self.when_done(move |outcome| {
            let _ = sender.send(outcome.clone());
        });
        receiver
            .recv()
            .unwrap_or_else(|_| Err(Error::Internal(COMPLETION_DROPPED_MSG.to_string())))
    }

    /// Like [`Completion::wait`], but gives up after `timeout` and returns `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        let (sender, receiver) = channel::bounded(1);
        self.when_done(move |outcome| {
            let _ = sender.send(outcome.clone());
        });
        match receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(Err(Error::Internal(COMPLETION_DROPPED_MSG.to_string())))
            }
        }
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let done = match self.state.lock() {
            Ok(state) => matches!(*state, State::Done(_)),
            Err(_) => false,
        };
        f.debug_struct("Completion").field("done", &done).finish()
    }
}
