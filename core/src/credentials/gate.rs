//! Readiness gate: lifecycle of a resolution pass and the wait contract
//!
//! State moves `Pending -> Succeeded` or `Pending -> Failed`, and only goes
//! back to `Pending` when a refresh starts. Waiters subscribe to a watch
//! channel, so every waiter observes the terminal transition and nobody
//! polls. A waiter that times out does not affect the resolution itself.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::debug;

use super::error::{CredentialError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionState {
    Pending,
    Succeeded,
    Failed(CredentialError),
}

impl ResolutionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResolutionState::Pending)
    }
}

pub struct ReadinessGate {
    tx: watch::Sender<ResolutionState>,
    timeout: Duration,
}

impl ReadinessGate {
    pub fn new(timeout: Duration) -> Self {
        let (tx, _rx) = watch::channel(ResolutionState::Pending);
        Self { tx, timeout }
    }

    /// Snapshot of the current state; never waits
    pub fn state(&self) -> ResolutionState {
        self.tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.tx.borrow(), ResolutionState::Succeeded)
    }

    pub(crate) fn begin(&self) {
        self.tx.send_replace(ResolutionState::Pending);
    }

    pub(crate) fn succeed(&self) {
        self.tx.send_replace(ResolutionState::Succeeded);
    }

    pub(crate) fn fail(&self, err: CredentialError) {
        self.tx.send_replace(ResolutionState::Failed(err));
    }

    /// Return once resolution has succeeded, or its terminal error.
    /// Fails with `InitTimeout` if nothing terminal happens within the configured bound.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.ensure_ready_within(self.timeout).await
    }

    pub async fn ensure_ready_within(&self, limit: Duration) -> Result<()> {
        let started = Instant::now();
        let mut rx = self.tx.subscribe();
        let wait = async move {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    ResolutionState::Succeeded => return Some(Ok(())),
                    ResolutionState::Failed(e) => return Some(Err(e)),
                    ResolutionState::Pending => {}
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        };
        match timeout(limit, wait).await {
            Ok(Some(res)) => res,
            Ok(None) | Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                debug!(target: "readiness_gate", waited_ms, "Gave up waiting for credentials");
                Err(CredentialError::InitTimeout { waited_ms })
            }
        }
    }
}
