//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

/// Calculate the delay to wait after the given failed attempt (1-based).
///
/// With `exponential` the base delay doubles per attempt; the result is
/// capped at `max_ms` before jitter is applied.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, exponential: bool, jitter: bool) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let delay_ms = if exponential {
        let exponential_base = 2u64.saturating_pow(attempt - 1);
        base_ms.saturating_mul(exponential_base)
    } else {
        base_ms
    };
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter && jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
