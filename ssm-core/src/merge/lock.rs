//! Process-wide merge-pass try-lock (spec §4.15 step 1): non-blocking, at most one merge pass
//! runs at a time; a concurrent caller gets `Busy` immediately instead of waiting.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct MergeLock {
    locked: AtomicBool,
}

impl MergeLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<MergeLockGuard<'_>> {
        match self.locked.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => Some(MergeLockGuard { lock: self }),
            Err(_) => None,
        }
    }
}

pub struct MergeLockGuard<'a> {
    lock: &'a MergeLock,
}

impl Drop for MergeLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_concurrent_acquire_is_busy_until_guard_drops() {
        let lock = MergeLock::new();
        let guard = lock.try_acquire().expect("first acquire succeeds");
        assert!(lock.try_acquire().is_none());
        drop(guard);
        assert!(lock.try_acquire().is_some());
    }
}
