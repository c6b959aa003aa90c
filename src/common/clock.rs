use lazy_static::lazy_static;
use std::time::Instant;

lazy_static! {
    static ref ORIGIN: Instant = Instant::now();
}

/// Nanoseconds elapsed since the process first read this clock. Monotonic.
pub fn monotonic_nanos() -> u64 {
    u64::try_from(ORIGIN.elapsed().as_nanos()).unwrap_or(u64::MAX)
}
