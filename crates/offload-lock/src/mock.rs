//! Mock termination watch for testing without real remote parties
//!
//! [`MockWatch`] records every registration in memory. Tests decide when a
//! holder dies by calling [`MockWatch::kill`], or make a token dead before it
//! is ever registered with [`MockWatch::mark_dead`].
//!
//! ```
//! use offload_lock::mock::MockWatch;
//! use offload_lock::LockRegistry;
//! use std::sync::Arc;
//!
//! let watch = Arc::new(MockWatch::<u64>::new());
//! let registry = LockRegistry::new(watch.clone(), || {}, || {});
//!
//! watch.mark_dead(&9);
//! assert!(!registry.acquire(9, "already gone"));
//! ```

use crate::{DeathNotifier, RemoteToken, TerminationWatch, WatchError};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct MockWatchState<T: RemoteToken> {
    watched: HashMap<T, DeathNotifier<T>>,
    dead: HashSet<T>,
}

/// In-memory termination watch
pub struct MockWatch<T: RemoteToken> {
    state: RwLock<MockWatchState<T>>,
}

impl<T: RemoteToken> MockWatch<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MockWatchState {
                watched: HashMap::new(),
                dead: HashSet::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MockWatchState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockWatchState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate the death of `token`'s owner.
    ///
    /// Returns `true` if a live subscription was notified.
    pub fn kill(&self, token: &T) -> bool {
        let notifier = {
            let mut state = self.write();
            state.dead.insert(token.clone());
            state.watched.remove(token)
        };

        match notifier {
            Some(notifier) => {
                tracing::debug!("[MOCK] Killing {:?}", token);
                notifier.notify();
                true
            }
            None => false,
        }
    }

    /// Mark `token` as dead without notifying anyone
    pub fn mark_dead(&self, token: &T) {
        self.write().dead.insert(token.clone());
    }

    /// Bring a dead token back so it can be registered again
    pub fn revive(&self, token: &T) {
        self.write().dead.remove(token);
    }

    /// Whether `token` has a live subscription
    pub fn is_watched(&self, token: &T) -> bool {
        self.read().watched.contains_key(token)
    }

    /// Number of live subscriptions
    pub fn watched(&self) -> usize {
        self.read().watched.len()
    }

    /// Notifier currently registered for `token`
    pub fn notifier(&self, token: &T) -> Option<DeathNotifier<T>> {
        self.read().watched.get(token).cloned()
    }
}

impl<T: RemoteToken> Default for MockWatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RemoteToken> TerminationWatch<T> for MockWatch<T> {
    fn register(&self, token: &T, notifier: DeathNotifier<T>) -> Result<(), WatchError> {
        let mut state = self.write();
        if state.dead.contains(token) {
            return Err(WatchError::AlreadyDead);
        }
        state.watched.insert(token.clone(), notifier);
        Ok(())
    }

    fn cancel(&self, token: &T) {
        self.write().watched.remove(token);
    }
}
