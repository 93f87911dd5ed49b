//! Credential pool: rotation, quota accounting, and usage persistence.
//!
//! The pool is the one piece of mutable state shared by every worker, so
//! selection and accounting happen in a single critical section: an
//! `acquire` both picks the least-used credential and reserves the call's
//! units before the lock is released. Two workers can therefore never both
//! conclude that the same credential has the last remaining units.
//!
//! Usage persistence is decoupled from the call path. Committed usage is
//! pushed onto an unbounded channel drained by a background writer task;
//! a failed write is logged and dropped (drift is bounded by one call's
//! units), never retried synchronously.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::config::CredentialEntry;
use crate::error::AppError;
use crate::traits::CredentialStore;

/// An API credential with its quota budget.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,
    pub api_key: String,
    /// Units consumed in the current reset window, including in-flight
    /// reservations. Monotonically increasing until the out-of-band reset.
    pub quota_used: i64,
    pub quota_limit: i64,
    /// Cleared when the API rejects the key outright.
    pub active: bool,
}

impl Credential {
    fn can_serve(&self, units: i64) -> bool {
        self.active && self.quota_used + units <= self.quota_limit
    }
}

/// A successful acquisition: the key to attach plus the reserved units.
///
/// Callers either [`CredentialPool::commit`] the lease after the API call
/// consumed quota, or [`CredentialPool::release`] it when the call failed
/// before reaching the API (connect error, timeout before send).
#[derive(Debug, Clone)]
pub struct CredentialLease {
    pub credential_id: String,
    pub api_key: String,
    pub units: i64,
}

/// Point-in-time view of one credential, for the status surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CredentialStatus {
    pub id: String,
    pub quota_used: i64,
    pub quota_limit: i64,
    pub active: bool,
    pub exhausted: bool,
}

/// Message sent to the background usage writer.
#[derive(Debug, Clone)]
pub enum UsageMessage {
    Usage { credential_id: String, units: i64 },
    SetActive { credential_id: String, active: bool },
}

/// Thread-safe pool of rate-limited API credentials.
#[derive(Clone)]
pub struct CredentialPool {
    inner: Arc<Mutex<Vec<Credential>>>,
    usage_tx: Option<mpsc::UnboundedSender<UsageMessage>>,
}

impl CredentialPool {
    /// Builds a pool from configuration entries, seeding `quota_used` from
    /// the persisted usage mirror so a restart mid-window does not forget
    /// spent quota.
    pub fn new(
        entries: &[CredentialEntry],
        usage_seed: &std::collections::HashMap<String, i64>,
    ) -> Self {
        let credentials = entries
            .iter()
            .map(|e| Credential {
                id: e.id.clone(),
                api_key: e.api_key.clone(),
                quota_used: usage_seed.get(&e.id).copied().unwrap_or(0),
                quota_limit: e.daily_quota,
                active: e.enabled,
            })
            .collect();

        Self {
            inner: Arc::new(Mutex::new(credentials)),
            usage_tx: None,
        }
    }

    /// Attaches the channel feeding the background usage writer.
    pub fn with_usage_sink(mut self, tx: mpsc::UnboundedSender<UsageMessage>) -> Self {
        self.usage_tx = Some(tx);
        self
    }

    /// Spawns the background writer draining [`UsageMessage`]s into the
    /// store. Returns the sender to pass to [`Self::with_usage_sink`].
    pub fn spawn_usage_writer<CS: CredentialStore>(
        store: CS,
    ) -> mpsc::UnboundedSender<UsageMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel::<UsageMessage>();

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let result = match &message {
                    UsageMessage::Usage {
                        credential_id,
                        units,
                    } => store.record_usage(credential_id, *units).await,
                    UsageMessage::SetActive {
                        credential_id,
                        active,
                    } => store.set_active(credential_id, *active).await,
                };
                if let Err(e) = result {
                    tracing::warn!(?message, error = %e, "Failed to persist credential usage");
                }
            }
        });

        tx
    }

    /// Atomically selects the least-used qualifying credential and reserves
    /// `units` against it.
    ///
    /// Greedy least-used selection maximizes aggregate remaining capacity
    /// before any single key runs dry.
    pub fn acquire(&self, units: i64) -> Result<CredentialLease, AppError> {
        let mut credentials = self.inner.lock().unwrap();

        let candidate = credentials
            .iter_mut()
            .filter(|c| c.can_serve(units))
            .min_by_key(|c| c.quota_used);

        match candidate {
            Some(credential) => {
                credential.quota_used += units;
                Ok(CredentialLease {
                    credential_id: credential.id.clone(),
                    api_key: credential.api_key.clone(),
                    units,
                })
            }
            None => Err(AppError::CredentialsExhausted),
        }
    }

    /// Confirms that the leased units were actually spent against the API
    /// and forwards them to the usage writer.
    pub fn commit(&self, lease: &CredentialLease) {
        if let Some(tx) = &self.usage_tx {
            let _ = tx.send(UsageMessage::Usage {
                credential_id: lease.credential_id.clone(),
                units: lease.units,
            });
        }
    }

    /// Returns reserved units for a call that never reached the API.
    pub fn release(&self, lease: &CredentialLease) {
        let mut credentials = self.inner.lock().unwrap();
        if let Some(c) = credentials.iter_mut().find(|c| c.id == lease.credential_id) {
            c.quota_used = (c.quota_used - lease.units).max(0);
        }
    }

    /// The API said this key's quota is spent; pin its usage to the
    /// ceiling so it is never selected again this window.
    pub fn mark_exhausted(&self, credential_id: &str) {
        let mut credentials = self.inner.lock().unwrap();
        if let Some(c) = credentials.iter_mut().find(|c| c.id == credential_id) {
            c.quota_used = c.quota_used.max(c.quota_limit);
            tracing::warn!(credential = credential_id, "Credential exhausted");
        }
    }

    /// The API rejected this key outright; deactivate it until an operator
    /// intervenes.
    pub fn mark_invalid(&self, credential_id: &str) {
        let mut credentials = self.inner.lock().unwrap();
        if let Some(c) = credentials.iter_mut().find(|c| c.id == credential_id) {
            c.active = false;
            tracing::error!(credential = credential_id, "Credential rejected by API, deactivated");
        }
        drop(credentials);

        if let Some(tx) = &self.usage_tx {
            let _ = tx.send(UsageMessage::SetActive {
                credential_id: credential_id.to_string(),
                active: false,
            });
        }
    }

    /// Number of credentials that could still serve a minimal call.
    pub fn usable_count(&self) -> usize {
        let credentials = self.inner.lock().unwrap();
        credentials.iter().filter(|c| c.can_serve(1)).count()
    }

    /// Per-credential usage view for `/status` and the CLI.
    pub fn snapshot(&self) -> Vec<CredentialStatus> {
        let credentials = self.inner.lock().unwrap();
        credentials
            .iter()
            .map(|c| CredentialStatus {
                id: c.id.clone(),
                quota_used: c.quota_used.min(c.quota_limit),
                quota_limit: c.quota_limit,
                active: c.active,
                exhausted: c.quota_used >= c.quota_limit,
            })
            .collect()
    }
}
