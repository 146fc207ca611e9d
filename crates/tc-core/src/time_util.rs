//! Monotonic time in fractional milliseconds.
//!
//! Every timestamp stored in the note and anchor buffers is measured on this
//! clock, so wall-clock jumps never reorder or evict history.

use std::sync::LazyLock;
use std::time::Instant;

static ORIGIN: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Milliseconds elapsed since the first call into this module.
#[inline]
pub fn monotonic_ms() -> f64 {
    ORIGIN.elapsed().as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_never_goes_backwards() {
        let a = monotonic_ms();
        let b = monotonic_ms();
        assert!(b >= a);
    }
}
