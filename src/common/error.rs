use crate::jobs::JobId;
use std::fmt;
use std::sync::PoisonError;

/// The kind of context a failed lookup was looking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextType {
    JobExecutionContext,
    Searcher,
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextType::JobExecutionContext => f.write_str("JobExecutionContext"),
            ContextType::Searcher => f.write_str("Searcher"),
        }
    }
}

/// Execution core errors. All errors are cloneable, since one failure may have
/// to complete several waiting futures.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Invalid user or caller input, e.g. a job builder without sub-executions.
    InvalidInput(String),
    /// Malformed stored data.
    InvalidData(String),
    /// A lookup for a context that is not (or no longer) registered.
    ContextMissing {
        context_type: ContextType,
        job_id: JobId,
    },
    /// A context for the job is already registered.
    DuplicateContext(String),
    /// A predicate or ordering could not be converted into a native query/sort.
    Translation(String),
    /// The operation observed a kill request.
    Killed(String),
    /// A resource was used after it was released or shut down.
    Closed(String),
    Config(String),
    Internal(String),
    OutOfBounds,
}

impl Error {
    /// Whether this error is the expected outcome of a kill, as opposed to a crash.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Killed(_))
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::ContextMissing {
                context_type,
                job_id,
            } => write!(f, "{context_type} for job {job_id} is missing"),
            Error::DuplicateContext(msg) => f.write_str(msg),
            Error::Translation(msg) => write!(f, "translation failed: {msg}"),
            Error::Killed(msg) => f.write_str(msg),
            Error::Closed(msg) => write!(f, "closed: {msg}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Internal(msg) => write!(f, "internal error: {msg}"),
            Error::OutOfBounds => f.write_str("out of bounds"),
        }
    }
}

/// Constructs a Result from an Error, so that `errinput!` can be used in both
/// error and result position.
impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
