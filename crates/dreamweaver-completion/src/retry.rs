use std::time::Duration;

pub const BASE_BACKOFF_MS: u64 = 250;

pub fn should_retry_status(status: u16) -> bool {
    status == 408 || status == 425 || status == 429 || status >= 500
}

/// Exponential backoff before retry `attempt` (0-based), capped at 2^5.
pub fn backoff(attempt: usize) -> Duration {
    let shift = attempt.min(5);
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1_u64 << shift))
}
