//! Wall-clock source for freshness checks

/// Source of "now" in Unix milliseconds
///
/// Freshness is compared against timestamps written by other processes,
/// so production code must use wall-clock time.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> u64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        unix_now_ms()
    }
}

/// Get current timestamp in milliseconds (0 if the clock is before the epoch)
pub fn unix_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
