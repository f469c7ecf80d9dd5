//! RAII guard for cancellation-safe in-flight request counting.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;

use super::registry::{AccountEntry, AccountOutcome};

/// Holds one in-flight slot on an account.
///
/// Decrements on drop, so a cancelled request (client gone, task dropped)
/// never leaks a slot. The guard is bound to the entry itself, not to the id,
/// so a configuration reload cannot make the count go negative.
pub struct InFlightGuard {
    entry: Arc<AccountEntry>,
    released: bool,
}

impl InFlightGuard {
    pub(crate) fn new(entry: Arc<AccountEntry>) -> Self {
        let now = entry.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        crate::proxy::prometheus::set_in_flight(entry.id(), now);
        Self { entry, released: false }
    }

    /// Account this slot belongs to.
    pub fn account_id(&self) -> &str {
        self.entry.id()
    }

    pub(crate) fn entry(&self) -> &AccountEntry {
        &self.entry
    }

    /// Record an attempt outcome on the entry this slot was taken from.
    ///
    /// After a reload the id may name a different entry; that one was not
    /// tried and keeps its state.
    pub(crate) fn record_outcome(&self, outcome: AccountOutcome) {
        self.entry.apply_outcome(outcome, Utc::now());
    }

    /// Give the slot back now instead of at drop.
    pub fn release(mut self) {
        self.decrement();
        self.released = true;
    }

    fn decrement(&self) {
        let prev = self.entry.in_flight.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
            if v > 0 {
                Some(v - 1)
            } else {
                None
            }
        });
        match prev {
            Ok(v) => crate::proxy::prometheus::set_in_flight(self.entry.id(), v - 1),
            Err(_) => tracing::error!(
                "In-flight counter for account {} already at zero on release",
                self.entry.id()
            ),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.released {
            self.decrement();
        }
    }
}

impl std::fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightGuard")
            .field("account_id", &self.entry.id())
            .field("released", &self.released)
            .finish()
    }
}
