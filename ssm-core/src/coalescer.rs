//! Scan-request coalescer (spec §4.2): merges concurrent `RequestScan(reason, force)` calls into
//! a single pending request, honoring the strongest force flag and the most recent reason.

use ssm_model::DispatchOutcome;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct PendingScan {
    reason: String,
    force: bool,
}

#[derive(Default)]
pub struct ScanCoalescer {
    pending: Mutex<Option<PendingScan>>,
}

impl ScanCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a new request into the pending one: `force` is the disjunction across all pending
    /// calls, `reason` is always overwritten with the most recent.
    pub fn request_scan(&self, reason: impl Into<String>, force: bool) {
        let mut pending = self.pending.lock().unwrap();
        let reason = reason.into();
        match pending.as_mut() {
            Some(existing) => {
                existing.reason = reason;
                existing.force = existing.force || force;
            }
            None => {
                *pending = Some(PendingScan { reason, force });
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    /// Hands the pending request (if any) to `handler`, propagating its outcome verbatim. A
    /// successful dispatch (anything but `Busy`) clears the pending request; `Busy` leaves it in
    /// place so the caller can retry after `lockRetrySeconds`.
    pub fn dispatch_pending<F>(&self, handler: F) -> DispatchOutcome
    where
        F: FnOnce(&str, bool) -> DispatchOutcome,
    {
        let taken = self.pending.lock().unwrap().clone();
        let Some(PendingScan { reason, force }) = taken else {
            return DispatchOutcome::NoPendingRequest;
        };

        let outcome = handler(&reason, force);
        if !matches!(outcome, DispatchOutcome::Busy) {
            *self.pending.lock().unwrap() = None;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_force_as_disjunction_and_keeps_latest_reason() {
        let coalescer = ScanCoalescer::new();
        coalescer.request_scan("inotify-event", false);
        coalescer.request_scan("timer", true);
        let outcome = coalescer.dispatch_pending(|reason, force| {
            assert_eq!(reason, "timer");
            assert!(force);
            DispatchOutcome::Success
        });
        assert_eq!(outcome, DispatchOutcome::Success);
        assert!(!coalescer.has_pending());
    }

    #[test]
    fn busy_outcome_keeps_request_pending() {
        let coalescer = ScanCoalescer::new();
        coalescer.request_scan("inotify-event", false);
        let outcome = coalescer.dispatch_pending(|_, _| DispatchOutcome::Busy);
        assert_eq!(outcome, DispatchOutcome::Busy);
        assert!(coalescer.has_pending());
    }

    #[test]
    fn no_pending_request_reports_sentinel() {
        let coalescer = ScanCoalescer::new();
        let outcome = coalescer.dispatch_pending(|_, _| DispatchOutcome::Success);
        assert_eq!(outcome, DispatchOutcome::NoPendingRequest);
    }
}
