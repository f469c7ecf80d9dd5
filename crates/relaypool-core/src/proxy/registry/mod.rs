//! Account Registry: configured upstream accounts and their live state.
//!
//! The account set sits behind an `RwLock<Arc<..>>` that is only written on
//! configuration reload; every per-request mutation goes through the
//! per-account lock or atomic in [`AccountEntry`].

mod entry;


pub use entry::{AccountEntry, AccountOutcome, AccountSnapshot};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use relaypool_types::{AccountConfig, HealthConfig, HealthState, RelayConfig};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::proxy::in_flight_guard::InFlightGuard;

struct AccountSet {
    ordered: Vec<Arc<AccountEntry>>,
    index: HashMap<String, usize>,
}

impl AccountSet {
    fn build(entries: Vec<Arc<AccountEntry>>) -> AppResult<Self> {
        let mut index = HashMap::with_capacity(entries.len());
        for (pos, entry) in entries.iter().enumerate() {
            if index.insert(entry.id().to_string(), pos).is_some() {
                return Err(AppError::Account(format!("duplicate account id '{}'", entry.id())));
            }
        }
        Ok(Self { ordered: entries, index })
    }

    fn get(&self, id: &str) -> Option<&Arc<AccountEntry>> {
        self.index.get(id).and_then(|&pos| self.ordered.get(pos))
    }
}

/// Lifecycle-scoped registry owned by the server state.
pub struct AccountRegistry {
    accounts: RwLock<Arc<AccountSet>>,
}

impl AccountRegistry {
    /// Build from an ordered account list. Duplicate ids are rejected.
    pub fn new(accounts: Vec<AccountConfig>) -> AppResult<Self> {
        let entries = accounts.into_iter().map(|c| Arc::new(AccountEntry::new(c))).collect();
        let set = AccountSet::build(entries)?;
        tracing::info!("Account registry initialized with {} account(s)", set.ordered.len());
        Ok(Self { accounts: RwLock::new(Arc::new(set)) })
    }

    /// Build from the enabled accounts of a config.
    pub fn from_config(config: &RelayConfig) -> AppResult<Self> {
        Self::new(config.enabled_accounts())
    }

    fn current(&self) -> Arc<AccountSet> {
        Arc::clone(&self.accounts.read())
    }

    pub fn len(&self) -> usize {
        self.current().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every account, in configuration order.
    pub fn list(&self) -> Vec<AccountSnapshot> {
        self.current().ordered.iter().map(|e| e.snapshot()).collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<AccountEntry>> {
        self.current().get(id).cloned()
    }

    /// Take an in-flight slot on `id` and stamp its last-used time.
    pub fn mark_in_flight(&self, id: &str) -> AppResult<InFlightGuard> {
        let entry =
            self.get(id).ok_or_else(|| AppError::Account(format!("Account not found: {}", id)))?;
        entry.touch(Utc::now());
        Ok(InFlightGuard::new(entry))
    }

    /// Current in-flight count, 0 for unknown ids.
    pub fn in_flight(&self, id: &str) -> u32 {
        self.get(id).map_or(0, |e| e.in_flight())
    }

    /// Record an attempt outcome. Returns false when the id is no longer configured.
    pub fn mark_outcome(&self, id: &str, outcome: AccountOutcome) -> bool {
        self.mark_outcome_at(id, outcome, Utc::now())
    }

    pub fn mark_outcome_at(&self, id: &str, outcome: AccountOutcome, now: DateTime<Utc>) -> bool {
        match self.get(id) {
            Some(entry) => {
                entry.apply_outcome(outcome, now);
                true
            },
            None => {
                tracing::debug!("Outcome for account {} dropped: no longer configured", id);
                false
            },
        }
    }

    /// Replace the whole account set (configuration reload).
    ///
    /// Accounts whose config is unchanged keep their entry, so health and
    /// in-flight counters carry over; everything else starts fresh.
    pub fn replace_all(&self, accounts: Vec<AccountConfig>) -> AppResult<usize> {
        let previous = self.current();
        let mut kept = 0usize;
        let entries: Vec<Arc<AccountEntry>> = accounts
            .into_iter()
            .map(|config| match previous.get(&config.id) {
                Some(existing) if existing.same_config(&config) => {
                    kept += 1;
                    Arc::clone(existing)
                },
                _ => Arc::new(AccountEntry::new(config)),
            })
            .collect();

        let set = AccountSet::build(entries)?;
        let count = set.ordered.len();
        *self.accounts.write() = Arc::new(set);

        tracing::info!("Account registry reloaded: {} account(s), {} unchanged", count, kept);
        Ok(count)
    }

    /// Move accounts whose penalty has expired back to `healthy`.
    pub fn reconcile(&self, now: DateTime<Utc>, config: &HealthConfig) -> usize {
        let unreachable_cooldown = secs(config.unreachable_cooldown_secs);
        let unauthorized_cooldown = config.unauthorized_cooldown_secs.map(secs);
        let mut recovered = 0usize;

        for entry in &self.current().ordered {
            let mut state = entry.state.lock();
            let since_outcome = |cooldown: ChronoDuration| {
                state.last_outcome_at.map_or(true, |at| {
                    at.checked_add_signed(cooldown).is_some_and(|until| until <= now)
                })
            };
            let recover = match state.health {
                HealthState::Healthy => false,
                HealthState::RateLimited => state.rate_limit_reset.map_or(true, |r| r <= now),
                HealthState::Unreachable => since_outcome(unreachable_cooldown),
                HealthState::Unauthorized => unauthorized_cooldown.is_some_and(since_outcome),
            };

            if recover {
                tracing::info!("🔄 Account {} recovered from {}", entry.id(), state.health);
                state.health = HealthState::Healthy;
                state.rate_limit_reset = None;
                recovered += 1;
            }
        }

        recovered
    }

    /// Seconds until the soonest rate-limit reset, when no account is usable
    /// for any reason other than a pending reset.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        let snapshot = self.list();
        if snapshot.is_empty() || snapshot.iter().any(|a| a.health != HealthState::RateLimited) {
            return None;
        }
        snapshot
            .iter()
            .filter_map(|a| a.rate_limit_reset)
            .min()
            .map(|reset| (reset - now).num_seconds().max(1) as u64)
    }
}

fn secs(value: u64) -> ChronoDuration {
    ChronoDuration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}
