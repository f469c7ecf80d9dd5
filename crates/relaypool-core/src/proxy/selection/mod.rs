//! Selection Policy: picks the account for one forward attempt.
//!
//! A pure function of a registry snapshot, so it can be tested without any
//! I/O and never mutates state on its own.


use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::proxy::registry::AccountSnapshot;

/// Why an account won the pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionReason {
    /// Fewest in-flight requests among the candidates.
    LeastLoaded,
    /// Tied on load; the one used longest ago (or never) won.
    LeastRecentlyUsed,
    /// Any attempt after the first for the same request.
    ForcedFailover,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeastLoaded => write!(f, "least-loaded"),
            Self::LeastRecentlyUsed => write!(f, "least-recently-used"),
            Self::ForcedFailover => write!(f, "forced-failover"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionDecision {
    Selected { account_id: String, reason: SelectionReason },
    NoneAvailable,
}

impl SelectionDecision {
    pub fn account_id(&self) -> Option<&str> {
        match self {
            Self::Selected { account_id, .. } => Some(account_id),
            Self::NoneAvailable => None,
        }
    }
}

/// `None` (never used) sorts before any timestamp.
fn compare_last_used(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.cmp(&b),
    }
}

/// Choose an account from `snapshot` (configuration order).
///
/// Candidates are healthy accounts and rate-limited ones whose reset is not
/// in the future, minus everything in `tried`. Lowest in-flight wins; ties go
/// to the least recently used, then to configuration order.
pub fn select(
    snapshot: &[AccountSnapshot],
    tried: &HashSet<String>,
    attempt: u32,
    now: DateTime<Utc>,
) -> SelectionDecision {
    let candidates: Vec<&AccountSnapshot> =
        snapshot.iter().filter(|a| a.is_eligible(now) && !tried.contains(&a.id)).collect();

    // min_by keeps the first of equal elements, which gives configuration order.
    let Some(best) = candidates.iter().copied().min_by(|a, b| {
        a.in_flight
            .cmp(&b.in_flight)
            .then_with(|| compare_last_used(a.last_used, b.last_used))
    }) else {
        return SelectionDecision::NoneAvailable;
    };

    let reason = if attempt > 0 {
        SelectionReason::ForcedFailover
    } else if candidates.iter().any(|c| {
        c.id != best.id
            && c.in_flight == best.in_flight
            && compare_last_used(c.last_used, best.last_used) == Ordering::Greater
    }) {
        SelectionReason::LeastRecentlyUsed
    } else {
        SelectionReason::LeastLoaded
    };

    SelectionDecision::Selected { account_id: best.id.clone(), reason }
}
