//! One account and its live state.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relaypool_types::{AccountConfig, AuthScheme, ForwardError, HealthState};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU32, Ordering};

/// Result of one forward attempt, as recorded against the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOutcome {
    Success,
    RateLimited { reset_at: DateTime<Utc> },
    Unauthorized,
    NetworkError,
}

impl From<&ForwardError> for AccountOutcome {
    fn from(err: &ForwardError) -> Self {
        match err {
            ForwardError::RateLimited { reset_at, .. } => Self::RateLimited { reset_at: *reset_at },
            ForwardError::Unauthorized { .. } => Self::Unauthorized,
            ForwardError::Network { .. } => Self::NetworkError,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AccountState {
    pub(crate) health: HealthState,
    pub(crate) rate_limit_reset: Option<DateTime<Utc>>,
    pub(crate) last_used: Option<DateTime<Utc>>,
    pub(crate) last_outcome_at: Option<DateTime<Utc>>,
    pub(crate) consecutive_failures: u32,
}

/// Immutable config plus per-account lock and in-flight counter.
///
/// Health fields sit behind a per-account mutex; the in-flight count is a
/// plain atomic. Nothing here takes a registry-wide lock.
pub struct AccountEntry {
    config: AccountConfig,
    fingerprint: String,
    pub(crate) in_flight: AtomicU32,
    pub(crate) state: Mutex<AccountState>,
}

impl AccountEntry {
    pub(crate) fn new(config: AccountConfig) -> Self {
        let fingerprint = credential_fingerprint(&config.credential);
        Self {
            config,
            fingerprint,
            in_flight: AtomicU32::new(0),
            state: Mutex::new(AccountState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn credential(&self) -> &str {
        &self.config.credential
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        self.config.auth_scheme
    }

    /// Short hash of the credential, safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// True when a reload can keep this entry (and its counters) as-is.
    pub(crate) fn same_config(&self, other: &AccountConfig) -> bool {
        self.config == *other
    }

    pub(crate) fn touch(&self, now: DateTime<Utc>) {
        self.state.lock().last_used = Some(now);
    }

    pub(crate) fn apply_outcome(&self, outcome: AccountOutcome, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        let previous = state.health;
        state.last_outcome_at = Some(now);

        match outcome {
            AccountOutcome::Success => {
                // a response to a request sent before the 429 does not lift it
                let pending_reset = state.health == HealthState::RateLimited
                    && state.rate_limit_reset.is_some_and(|reset| reset > now);
                if pending_reset {
                    tracing::debug!(
                        "Account {} answered while rate limited; keeping the reset",
                        self.id()
                    );
                } else {
                    state.health = HealthState::Healthy;
                    state.rate_limit_reset = None;
                    state.consecutive_failures = 0;
                }
            },
            AccountOutcome::RateLimited { reset_at } => {
                state.health = HealthState::RateLimited;
                state.rate_limit_reset = Some(reset_at);
                state.consecutive_failures += 1;
            },
            AccountOutcome::Unauthorized => {
                state.health = HealthState::Unauthorized;
                state.rate_limit_reset = None;
                state.consecutive_failures += 1;
            },
            AccountOutcome::NetworkError => {
                state.health = HealthState::Unreachable;
                state.rate_limit_reset = None;
                state.consecutive_failures += 1;
            },
        }

        if previous != state.health {
            tracing::info!(
                "Account {} health {} -> {} (failures in a row: {})",
                self.id(),
                previous,
                state.health,
                state.consecutive_failures
            );
        }
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        let state = self.state.lock().clone();
        AccountSnapshot {
            id: self.config.id.clone(),
            health: state.health,
            rate_limit_reset: state.rate_limit_reset,
            last_used: state.last_used,
            in_flight: self.in_flight(),
            consecutive_failures: state.consecutive_failures,
        }
    }
}

impl std::fmt::Debug for AccountEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountEntry")
            .field("id", &self.config.id)
            .field("credential", &self.fingerprint)
            .field("base_url", &self.config.base_url)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of one account, the input to selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub id: String,
    pub health: HealthState,
    pub rate_limit_reset: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub in_flight: u32,
    pub consecutive_failures: u32,
}

impl AccountSnapshot {
    /// Healthy, or rate limited with the reset already behind us.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.health {
            HealthState::Healthy => true,
            HealthState::RateLimited => self.rate_limit_reset.map_or(true, |reset| reset <= now),
            HealthState::Unauthorized | HealthState::Unreachable => false,
        }
    }
}

fn credential_fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    digest.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}
