//! Memoizing id allocator

use crate::{IdError, IdKey};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

type ReservedPredicate = Box<dyn Fn(i32) -> bool + Send + Sync>;

#[derive(Debug, Default)]
struct AllocState {
    /// Next candidate. Wider than `i32` so running off the end is observable.
    next: i64,
    assigned: HashMap<IdKey, i32>,
    /// Every id handed out since the last reset, keyed or not.
    issued: HashSet<i32>,
}

/// Hands out small non-negative ids and remembers them per key.
///
/// All operations serialize on one internal mutex, so concurrent callers see a
/// single linear sequence of allocations.
///
/// The reservation predicate is called with the lock held and may be called
/// many times per allocation. It must be pure and cheap, and it must leave
/// unreserved ids reachable: a predicate that reserves every non-negative
/// `i32` makes every allocation fail with [`IdError::Exhausted`] after a full
/// scan of the id space.
pub struct IdAllocator {
    state: Mutex<AllocState>,
    reserved: ReservedPredicate,
}

impl IdAllocator {
    /// Create an allocator that never auto-assigns ids matching `reserved`
    pub fn new<F>(reserved: F) -> Self
    where
        F: Fn(i32) -> bool + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(AllocState::default()),
            reserved: Box::new(reserved),
        }
    }

    /// Create an allocator with no reserved ids
    pub fn unreserved() -> Self {
        Self::new(|_| false)
    }

    fn lock(&self) -> MutexGuard<'_, AllocState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `id` is off limits for automatic assignment
    pub fn is_reserved(&self, id: i32) -> bool {
        (self.reserved)(id)
    }

    /// Forget every mapping and restart the counter at zero.
    ///
    /// Ids issued before the reset may be issued again afterwards.
    pub fn reset(&self) {
        let mut state = self.lock();
        let dropped = state.assigned.len();
        *state = AllocState::default();
        tracing::debug!("Id allocator reset, {} mappings dropped", dropped);
    }

    /// Allocate a fresh id that is not bound to any key
    pub fn next_id(&self) -> Result<i32, IdError> {
        let mut state = self.lock();
        self.advance(&mut state)
    }

    /// Return the id for `key`, allocating one on first use.
    ///
    /// An integer key that the reservation predicate reserves maps to itself.
    pub fn get_id(&self, key: impl Into<IdKey>) -> Result<i32, IdError> {
        let key = key.into();
        let mut state = self.lock();

        if let Some(value) = key.as_int() {
            if self.is_reserved(value) {
                state.issued.insert(value);
                state.assigned.insert(key, value);
                tracing::trace!("Reserved id {} requested explicitly", value);
                return Ok(value);
            }
        }

        if let Some(&id) = state.assigned.get(&key) {
            return Ok(id);
        }

        let id = self.advance(&mut state)?;
        tracing::debug!("Assigned id {} to {}", id, key);
        state.assigned.insert(key, id);
        Ok(id)
    }

    /// Id previously assigned to `key`, without allocating
    pub fn lookup(&self, key: &IdKey) -> Option<i32> {
        self.lock().assigned.get(key).copied()
    }

    /// Number of keys with an assigned id
    pub fn len(&self) -> usize {
        self.lock().assigned.len()
    }

    /// Whether no key has an id yet
    pub fn is_empty(&self) -> bool {
        self.lock().assigned.is_empty()
    }

    fn advance(&self, state: &mut AllocState) -> Result<i32, IdError> {
        loop {
            let candidate = i32::try_from(state.next).map_err(|_| IdError::Exhausted)?;
            state.next += 1;

            if state.issued.contains(&candidate) || self.is_reserved(candidate) {
                continue;
            }

            state.issued.insert(candidate);
            return Ok(candidate);
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::unreserved()
    }
}

impl fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("IdAllocator")
            .field("next", &state.next)
            .field("assigned", &state.assigned.len())
            .finish_non_exhaustive()
    }
}
