//! One-shot readiness gate.
//!
//! The store starts `Pending` while the bootstrapper owns the database file.
//! Every storage operation waits on the gate; once it settles it never
//! changes again.

use std::sync::Arc;

use tokio::sync::watch;

use crate::{StorageError, StorageResult};

/// State carried by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

/// Cloneable handle on the store's readiness state.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<Readiness>>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    /// A gate that is still pending.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Readiness::Pending);
        Self { tx: Arc::new(tx) }
    }

    /// A gate that is already open.
    pub fn ready() -> Self {
        let gate = Self::new();
        gate.mark_ready();
        gate
    }

    pub fn state(&self) -> Readiness {
        self.tx.borrow().clone()
    }

    /// Opens the gate. Has no effect once the gate has settled.
    pub fn mark_ready(&self) {
        self.settle(Readiness::Ready);
    }

    /// Fails the gate permanently. Has no effect once the gate has settled.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.settle(Readiness::Failed(reason.into()));
    }

    fn settle(&self, next: Readiness) {
        self.tx.send_if_modified(|state| {
            if *state == Readiness::Pending {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    /// Waits until the gate settles.
    pub async fn wait(&self) -> StorageResult<()> {
        let mut rx = self.tx.subscribe();
        let settled = rx
            .wait_for(|state| *state != Readiness::Pending)
            .await
            .map_err(|_| StorageError::Initialization("readiness gate dropped".into()))?
            .clone();
        match settled {
            Readiness::Failed(reason) => Err(StorageError::Initialization(reason)),
            _ => Ok(()),
        }
    }
}
