use super::{PersistedState, PersistenceError, StatePersistence};
use std::sync::{Arc, Mutex, PoisonError};

/// In-memory persistence, mainly for tests.
///
/// Clones share the same backing document, so a test can keep a handle to
/// inspect what the store flushed or to reopen a store on the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    stored: Option<PersistedState>,
    flushes: usize,
    fail_flushes: bool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PersistedState) -> Self {
        let persistence = Self::new();
        persistence.lock().stored = Some(state);
        persistence
    }

    /// Last successfully flushed document.
    pub fn stored(&self) -> Option<PersistedState> {
        self.lock().stored.clone()
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    /// Make every subsequent flush fail.
    pub fn set_fail_flushes(&self, fail: bool) {
        self.lock().fail_flushes = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatePersistence for MemoryPersistence {
    fn load(&self) -> Result<PersistedState, PersistenceError> {
        Ok(self.lock().stored.clone().unwrap_or_default())
    }

    fn flush(&self, state: &PersistedState) -> Result<(), PersistenceError> {
        let mut inner = self.lock();
        if inner.fail_flushes {
            return Err(PersistenceError::Unavailable("flushes disabled".to_string()));
        }
        inner.stored = Some(state.clone());
        inner.flushes += 1;
        Ok(())
    }
}
