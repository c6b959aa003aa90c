use crate::common::constants::ZERO_COUNTDOWN_MSG;
use crate::common::{Error, Result};
use crate::concurrent::Completion;
use crate::errinput;
use log::warn;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Fan-in of `count` independent completions into a single [`Completion`].
///
/// Every expected input calls one of the `on_*` methods exactly once, from any
/// thread, successful or not. The completion resolves on the last call: with
/// the first recorded failure if there was one, with `Ok(())` otherwise.
#[derive(Debug)]
pub struct CountdownCompletion {
    remaining: AtomicUsize,
    first_failure: Mutex<Option<Error>>,
    completion: Completion<()>,
}

impl CountdownCompletion {
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 {
            return errinput!("{ZERO_COUNTDOWN_MSG}");
        }
        Ok(Self {
            remaining: AtomicUsize::new(count),
            first_failure: Mutex::new(None),
            completion: Completion::new(),
        })
    }

    pub fn on_success(&self) -> bool {
        self.count_down(None)
    }

    pub fn on_failure(&self, error: &Error) -> bool {
        self.count_down(Some(error))
    }

    /// Counts down with the given outcome; returns whether this was the last input.
    pub fn on_outcome<T>(&self, outcome: &Result<T>) -> bool {
        self.count_down(outcome.as_ref().err())
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn completion(&self) -> Completion<()> {
        self.completion.clone()
    }

    fn count_down(&self, failure: Option<&Error>) -> bool {
        // the failure is recorded before decrementing, so that the last caller sees it.
        if let Some(error) = failure {
            let mut first = self
                .first_failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if first.is_none() {
                *first = Some(error.clone());
            }
        }
        match self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(1) => {
                let failure = self
                    .first_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                self.completion.set(match failure {
                    Some(error) => Err(error),
                    None => Ok(()),
                });
                true
            }
            Ok(_) => false,
            Err(_) => {
                warn!("CountdownCompletion counted down more often than expected");
                false
            }
        }
    }
}
