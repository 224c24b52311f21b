//! Reference-counted lock registry

use crate::{RemoteToken, TerminationWatch};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback = Box<dyn Fn() + Send + Sync>;

/// One held lock
#[derive(Debug)]
struct Holder {
    name: String,
    /// Matches the generation of the live watch registration for this token.
    generation: u64,
}

struct RegistryState<T> {
    locks: HashMap<T, Holder>,
    next_generation: u64,
}

struct Shared<T: RemoteToken> {
    state: Mutex<RegistryState<T>>,
    watch: Arc<dyn TerminationWatch<T>>,
    on_first_acquired: Callback,
    on_all_released: Callback,
}

impl<T: RemoteToken> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, RegistryState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop `token`'s lock. A death notice carries the generation it was
    /// registered under and is ignored if the token has been re-acquired since.
    fn remove(&self, token: &T, death_generation: Option<u64>) {
        let emptied = {
            let mut state = self.lock();
            match state.locks.get(token) {
                None => return,
                Some(holder) if death_generation.is_some_and(|g| g != holder.generation) => {
                    tracing::debug!("Ignoring stale death notice for {:?}", token);
                    return;
                }
                Some(_) => {}
            }

            if death_generation.is_none() {
                self.watch.cancel(token);
            }

            if let Some(holder) = state.locks.remove(token) {
                if death_generation.is_some() {
                    tracing::debug!("Lock holder '{}' died, releasing {:?}", holder.name, token);
                } else {
                    tracing::debug!("Lock holder '{}' released {:?}", holder.name, token);
                }
            }

            state.locks.is_empty()
        };

        if emptied {
            tracing::info!("All display control locks released");
            (self.on_all_released)();
        }
    }
}

/// Tracks which remote parties currently hold display control.
///
/// `on_first_acquired` runs when the registry goes from no holders to one;
/// `on_all_released` runs when the last holder goes away, whether it released
/// explicitly or died. Both run on the calling (or notifying) thread after the
/// internal lock has been dropped, so they may call back into the registry.
///
/// Callbacks from racing transitions on different threads are not ordered
/// with respect to each other; an owner that needs the current state should
/// consult [`should_block`](Self::should_block) from within the callback.
pub struct LockRegistry<T: RemoteToken> {
    shared: Arc<Shared<T>>,
}

impl<T: RemoteToken> LockRegistry<T> {
    /// Create an empty registry backed by `watch`
    pub fn new<W, F, R>(watch: Arc<W>, on_first_acquired: F, on_all_released: R) -> Self
    where
        W: TerminationWatch<T> + 'static,
        F: Fn() + Send + Sync + 'static,
        R: Fn() + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState {
                    locks: HashMap::new(),
                    next_generation: 0,
                }),
                watch,
                on_first_acquired: Box::new(on_first_acquired),
                on_all_released: Box::new(on_all_released),
            }),
        }
    }

    /// Take a lock on behalf of `token`.
    ///
    /// Returns `false` without changing anything if the token is null or its
    /// owner has already terminated. Acquiring a token that is already held
    /// refreshes its watch and name and never fires a callback.
    pub fn acquire(&self, token: T, name: impl Into<String>) -> bool {
        if token.is_null() {
            tracing::warn!("Refusing display control lock for null token");
            return false;
        }

        let name = name.into();
        let first = {
            let mut state = self.shared.lock();
            let generation = state.next_generation;
            state.next_generation += 1;

            let notifier = DeathNotifier {
                registry: Arc::downgrade(&self.shared),
                token: token.clone(),
                generation,
            };

            if let Err(e) = self.shared.watch.register(&token, notifier) {
                tracing::warn!("Display control lock for '{}' refused: {}", name, e);
                // A re-acquire by a holder that has since died counts as its death.
                let held = state.locks.contains_key(&token);
                if held {
                    self.shared.watch.cancel(&token);
                    state.locks.remove(&token);
                }
                let emptied = held && state.locks.is_empty();
                drop(state);
                if emptied {
                    tracing::info!("All display control locks released");
                    (self.shared.on_all_released)();
                }
                return false;
            }

            let was_empty = state.locks.is_empty();
            let holder = Holder {
                name: name.clone(),
                generation,
            };
            if state.locks.insert(token.clone(), holder).is_some() {
                tracing::debug!("Lock holder '{}' re-acquired {:?}", name, token);
            } else {
                tracing::debug!("Lock holder '{}' acquired {:?}", name, token);
            }
            was_empty
        };

        if first {
            tracing::info!("Display control lock taken by '{}'", name);
            (self.shared.on_first_acquired)();
        }
        true
    }

    /// Give up the lock held by `token`. Unknown tokens are ignored.
    pub fn release(&self, token: &T) {
        self.shared.remove(token, None);
    }

    /// Whether any party holds a lock
    pub fn should_block(&self) -> bool {
        !self.shared.lock().locks.is_empty()
    }

    /// Number of held locks
    pub fn len(&self) -> usize {
        self.shared.lock().locks.len()
    }

    /// Whether no lock is held
    pub fn is_empty(&self) -> bool {
        !self.should_block()
    }

    /// Snapshot of current holders and the names they gave, for dumps
    pub fn holders(&self) -> Vec<(T, String)> {
        self.shared
            .lock()
            .locks
            .iter()
            .map(|(token, holder)| (token.clone(), holder.name.clone()))
            .collect()
    }
}

impl<T: RemoteToken> Clone for LockRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: RemoteToken> fmt::Debug for LockRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry")
            .field("holders", &self.shared.lock().locks)
            .finish()
    }
}

/// Handed to a [`TerminationWatch`] with each registration.
///
/// Calling [`notify`](Self::notify) releases the token's lock as if the holder
/// had released it. Notifiers that outlive their registration (the token was
/// released or re-acquired, or the registry was dropped) do nothing.
pub struct DeathNotifier<T: RemoteToken> {
    registry: Weak<Shared<T>>,
    token: T,
    generation: u64,
}

impl<T: RemoteToken> DeathNotifier<T> {
    /// Token this notifier was registered for
    pub fn token(&self) -> &T {
        &self.token
    }

    /// Report that the token's owner has terminated
    pub fn notify(&self) {
        if let Some(shared) = self.registry.upgrade() {
            shared.remove(&self.token, Some(self.generation));
        }
    }
}

impl<T: RemoteToken> Clone for DeathNotifier<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Weak::clone(&self.registry),
            token: self.token.clone(),
            generation: self.generation,
        }
    }
}

impl<T: RemoteToken> fmt::Debug for DeathNotifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeathNotifier")
            .field("token", &self.token)
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWatch;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        watch: Arc<MockWatch<String>>,
        registry: LockRegistry<String>,
        first: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            let watch = Arc::new(MockWatch::new());
            let first = Arc::new(AtomicUsize::new(0));
            let released = Arc::new(AtomicUsize::new(0));
            let registry = {
                let first = Arc::clone(&first);
                let released = Arc::clone(&released);
                LockRegistry::new(
                    Arc::clone(&watch),
                    move || {
                        first.fetch_add(1, Ordering::SeqCst);
                    },
                    move || {
                        released.fetch_add(1, Ordering::SeqCst);
                    },
                )
            };

            Self {
                watch,
                registry,
                first,
                released,
            }
        }

        fn counts(&self) -> (usize, usize) {
            (
                self.first.load(Ordering::SeqCst),
                self.released.load(Ordering::SeqCst),
            )
        }
    }

    fn token(name: &str) -> String {
        name.to_string()
    }

    #[test]
    fn test_first_acquire_fires_once() {
        let fx = Fixture::new();
        assert!(!fx.registry.should_block());

        assert!(fx.registry.acquire(token("a"), "alpha"));
        assert_eq!(fx.counts(), (1, 0));

        assert!(fx.registry.acquire(token("b"), "beta"));
        assert_eq!(fx.counts(), (1, 0));
        assert!(fx.registry.should_block());
        assert_eq!(fx.registry.len(), 2);
    }

    #[test]
    fn test_last_release_fires_once() {
        let fx = Fixture::new();
        fx.registry.acquire(token("a"), "alpha");
        fx.registry.acquire(token("b"), "beta");

        fx.registry.release(&token("a"));
        assert_eq!(fx.counts(), (1, 0));
        assert!(fx.registry.should_block());

        fx.registry.release(&token("b"));
        assert_eq!(fx.counts(), (1, 1));
        assert!(!fx.registry.should_block());

        fx.registry.release(&token("b"));
        fx.registry.release(&token("never-held"));
        assert_eq!(fx.counts(), (1, 1));
    }

    #[test]
    fn test_null_token_rejected() {
        let fx = Fixture::new();
        assert!(!fx.registry.acquire(String::new(), "nobody"));
        assert!(!fx.registry.should_block());
        assert_eq!(fx.counts(), (0, 0));
        assert_eq!(fx.watch.watched(), 0);
    }

    #[test]
    fn test_release_cancels_watch() {
        let fx = Fixture::new();
        fx.registry.acquire(token("a"), "alpha");
        assert!(fx.watch.is_watched(&token("a")));

        fx.registry.release(&token("a"));
        assert!(!fx.watch.is_watched(&token("a")));
        assert!(!fx.watch.kill(&token("a")));
        assert_eq!(fx.counts(), (1, 1));
    }

    #[test]
    fn test_death_acts_like_release() {
        let fx = Fixture::new();
        fx.registry.acquire(token("a"), "alpha");
        fx.registry.acquire(token("b"), "beta");

        assert!(fx.watch.kill(&token("a")));
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(fx.counts(), (1, 0));

        assert!(fx.watch.kill(&token("b")));
        assert!(!fx.registry.should_block());
        assert_eq!(fx.counts(), (1, 1));
    }

    #[test]
    fn test_acquire_dead_token_fails() {
        let fx = Fixture::new();
        fx.watch.mark_dead(&token("ghost"));

        assert!(!fx.registry.acquire(token("ghost"), "ghost"));
        assert!(!fx.registry.should_block());
        assert_eq!(fx.counts(), (0, 0));
    }

    #[test]
    fn test_reacquire_after_holder_died_releases_and_cancels_watch() {
        let fx = Fixture::new();
        assert!(fx.registry.acquire(token("a"), "alpha"));
        fx.watch.mark_dead(&token("a"));

        assert!(!fx.registry.acquire(token("a"), "alpha again"));
        assert!(!fx.registry.should_block());
        assert_eq!(fx.counts(), (1, 1));
        assert_eq!(fx.watch.watched(), 0);
        assert!(!fx.watch.is_watched(&token("a")));

        fx.registry.release(&token("a"));
        assert_eq!(fx.counts(), (1, 1));
    }

    #[test]
    fn test_reacquire_replaces_name_without_callbacks() {
        let fx = Fixture::new();
        fx.registry.acquire(token("a"), "first name");
        fx.registry.acquire(token("a"), "second name");

        assert_eq!(fx.counts(), (1, 0));
        assert_eq!(
            fx.registry.holders(),
            vec![(token("a"), "second name".to_string())]
        );
        assert_eq!(fx.watch.watched(), 1);
    }

    #[test]
    fn test_stale_notifier_is_ignored() {
        let fx = Fixture::new();
        fx.registry.acquire(token("a"), "alpha");
        let stale = fx.watch.notifier(&token("a")).unwrap();

        fx.registry.release(&token("a"));
        fx.registry.acquire(token("a"), "alpha again");

        stale.notify();
        assert!(fx.registry.should_block());
        assert_eq!(fx.counts(), (2, 1));
    }

    #[test]
    fn test_notifier_outliving_registry_is_harmless() {
        let fx = Fixture::new();
        fx.registry.acquire(token("a"), "alpha");
        let notifier = fx.watch.notifier(&token("a")).unwrap();

        drop(fx.registry);
        notifier.notify();
        assert_eq!(notifier.token(), "a");
    }

    #[test]
    fn test_callback_may_reenter_registry() {
        let watch = Arc::new(MockWatch::<String>::new());
        let slot: Arc<Mutex<Option<LockRegistry<String>>>> = Arc::new(Mutex::new(None));
        let observed = Arc::new(AtomicUsize::new(0));

        let registry = {
            let slot = Arc::clone(&slot);
            let observed = Arc::clone(&observed);
            LockRegistry::new(
                Arc::clone(&watch),
                move || {
                    let registry = slot.lock().unwrap().clone();
                    if let Some(registry) = registry {
                        observed.store(registry.len(), Ordering::SeqCst);
                    }
                },
                || {},
            )
        };
        *slot.lock().unwrap() = Some(registry.clone());

        assert!(registry.acquire(token("a"), "alpha"));
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let fx = Fixture::new();

        std::thread::scope(|s| {
            for t in 0..8 {
                let registry = fx.registry.clone();
                s.spawn(move || {
                    for i in 0..100 {
                        let tok = format!("{}-{}", t, i);
                        assert!(registry.acquire(tok.clone(), "worker"));
                        registry.release(&tok);
                    }
                });
            }
        });

        assert!(!fx.registry.should_block());
        let (first, released) = fx.counts();
        assert_eq!(first, released);
        assert!(first >= 1);
        assert_eq!(fx.watch.watched(), 0);
    }
}
