use chrono::{DateTime, Utc};

/// Injectable wall clock so Cloudflare sticky-fallback timing and cooldown expiry can be tested
/// deterministically (see spec end-to-end scenario 3: sticky activation anchored on block-detected
/// time, not request-start time).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
