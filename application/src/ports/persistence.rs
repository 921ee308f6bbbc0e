//! State persistence port
//!
//! Durable storage for the [`PersistedState`] snapshot used for crash
//! recovery. Implementations must be safe to call from a state machine
//! transition callback: writes are synchronous.

use ralph_domain::PersistedState;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Errors from saving or clearing a snapshot.
///
/// `load` never fails: unreadable data is treated as "nothing to recover".
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Port for storing the supervisor snapshot.
pub trait StatePersistence: Send + Sync {
    /// Durably write the snapshot, replacing any previous one.
    fn save(&self, snapshot: &PersistedState) -> Result<(), PersistenceError>;

    /// The stored snapshot, or `None` if absent or unreadable.
    fn load(&self) -> Option<PersistedState>;

    fn exists(&self) -> bool;

    /// Time since the snapshot was last written.
    fn age(&self) -> Option<Duration>;

    /// A missing snapshot counts as stale.
    fn is_stale(&self, max_age: Duration) -> bool {
        self.age().is_none_or(|age| age > max_age)
    }

    /// Remove the snapshot. Clearing when nothing is stored is not an error.
    fn clear(&self) -> Result<(), PersistenceError>;
}

/// Process-local persistence, for tests and for runs that opt out of disk state.
#[derive(Default)]
pub struct InMemoryPersistence {
    slot: Mutex<Option<PersistedState>>,
    saves: AtomicUsize,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<PersistedState>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StatePersistence for InMemoryPersistence {
    fn save(&self, snapshot: &PersistedState) -> Result<(), PersistenceError> {
        *self.slot() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Option<PersistedState> {
        self.slot().clone()
    }

    fn exists(&self) -> bool {
        self.slot().is_some()
    }

    fn age(&self) -> Option<Duration> {
        self.slot().as_ref().map(PersistedState::age)
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        *self.slot() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_domain::{Metadata, SupervisorState, TaskContext};

    fn snapshot() -> PersistedState {
        PersistedState::new(
            TaskContext::new("Refactor parser", 3, Metadata::new()),
            SupervisorState::Execute,
            Vec::new(),
        )
    }

    #[test]
    fn test_in_memory_round_trip() {
        let persistence = InMemoryPersistence::new();
        assert!(!persistence.exists());
        assert!(persistence.load().is_none());
        assert!(persistence.is_stale(Duration::from_secs(60)));

        let saved = snapshot();
        persistence.save(&saved).unwrap();
        assert!(persistence.exists());
        assert_eq!(persistence.load(), Some(saved));
        assert!(!persistence.is_stale(Duration::from_secs(60)));
        assert_eq!(persistence.save_count(), 1);

        persistence.clear().unwrap();
        assert!(!persistence.exists());
        persistence.clear().unwrap();
    }

    #[test]
    fn test_is_stale_compares_age() {
        let persistence = InMemoryPersistence::new();
        let mut old = snapshot();
        old.persisted_at = chrono::Utc::now() - chrono::Duration::hours(25);
        persistence.save(&old).unwrap();

        assert!(persistence.is_stale(Duration::from_secs(24 * 60 * 60)));
        assert!(!persistence.is_stale(Duration::from_secs(48 * 60 * 60)));
    }
}
