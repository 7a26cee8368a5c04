//! Trust transition participants
//!
//! Participants run between a trust state change being applied and the
//! change event being published: extension hosts shut down, task runners
//! drain, debug sessions stop. They run sequentially in registration order
//! and a failure aborts the remaining participants and the event.

use crate::error::{Result, TrustError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

#[async_trait]
pub trait TrustTransitionParticipant: Send + Sync {
    async fn on_trust_change(&self, trusted: bool) -> anyhow::Result<()>;
}

type ParticipantList = Vec<(u64, Arc<dyn TrustTransitionParticipant>)>;

pub struct TrustTransitionCoordinator {
    participants: Arc<Mutex<ParticipantList>>,
    next_id: AtomicU64,
}

impl TrustTransitionCoordinator {
    pub fn new() -> Self {
        TrustTransitionCoordinator {
            participants: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a participant; dropping the returned handle removes it.
    pub fn register(&self, participant: Arc<dyn TrustTransitionParticipant>) -> ParticipantHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.participants
            .lock()
            .expect("participant list poisoned")
            .push((id, participant));
        ParticipantHandle {
            id,
            participants: Arc::downgrade(&self.participants),
        }
    }

    /// Run every participant sequentially in registration order, awaiting
    /// each. Fail-fast: the first error aborts the remaining participants.
    pub async fn participate(&self, trusted: bool) -> Result<()> {
        let snapshot: Vec<Arc<dyn TrustTransitionParticipant>> = self
            .participants
            .lock()
            .expect("participant list poisoned")
            .iter()
            .map(|(_, p)| p.clone())
            .collect();

        for participant in snapshot {
            participant
                .on_trust_change(trusted)
                .await
                .map_err(TrustError::TransitionFailed)?;
        }
        Ok(())
    }

    /// Remove all participants without invoking them.
    pub fn dispose(&self) {
        self.participants
            .lock()
            .expect("participant list poisoned")
            .clear();
    }

    pub fn participant_count(&self) -> usize {
        self.participants
            .lock()
            .expect("participant list poisoned")
            .len()
    }
}

impl Default for TrustTransitionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters its participant on drop
pub struct ParticipantHandle {
    id: u64,
    participants: Weak<Mutex<ParticipantList>>,
}

impl ParticipantHandle {
    pub fn dispose(self) {}
}

impl Drop for ParticipantHandle {
    fn drop(&mut self) {
        if let Some(participants) = self.participants.upgrade() {
            participants
                .lock()
                .expect("participant list poisoned")
                .retain(|(id, _)| *id != self.id);
        }
    }
}
