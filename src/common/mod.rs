pub mod clock;
pub mod constants;
mod error;
#[cfg(test)]
pub mod utility;

pub use error::{ContextType, Error, Result};

/// Constructs an `Error::InvalidInput` via format!() and into().
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::common::Error::InvalidInput(format!($($args)*)).into() };
}

/// Asserts that the given `Result` is an `Err`, optionally matching a pattern.
#[macro_export]
macro_rules! assert_errors {
    ($result:expr) => {
        match $result {
            Ok(_) => panic!("expected an error from `{}`", stringify!($result)),
            Err(_) => {}
        }
    };
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            Err(other) => panic!(
                "`{}` failed with {:?}, expected {}",
                stringify!($result),
                other,
                stringify!($pattern)
            ),
            Ok(_) => panic!("expected an error from `{}`", stringify!($result)),
        }
    };
}
