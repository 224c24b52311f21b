//! Display control locks for the offload service
//!
//! While a watch face is in ambient mode the offload controller owns the
//! display. Remote parties (apps running an animation, a system dialog) can
//! ask the service to keep control on the main processor by holding a display
//! control lock. Each holder identifies itself with a token; the service
//! blocks offloading for as long as at least one token is held.
//!
//! Holders can vanish without releasing. Every held token is therefore paired
//! with a termination watch, and a holder that dies is released as if it had
//! called [`LockRegistry::release`] itself.
//!
//! # Watch backends
//!
//! - [`ProcessWatch`]: local processes, checked by pid
//! - [`mock::MockWatch`]: in-memory, for tests
//!
//! # Example
//!
//! ```
//! use offload_lock::LockRegistry;
//! use offload_lock::mock::MockWatch;
//! use std::sync::Arc;
//!
//! let watch = Arc::new(MockWatch::<String>::new());
//! let registry = LockRegistry::new(
//!     watch.clone(),
//!     || println!("blocking offload"),
//!     || println!("offload allowed again"),
//! );
//!
//! let token = String::from("com.example.stopwatch");
//! assert!(registry.acquire(token.clone(), "stopwatch"));
//! assert!(registry.should_block());
//!
//! // The holder crashes without releasing.
//! watch.kill(&token);
//! assert!(!registry.should_block());
//! ```

pub mod mock;
mod process;
mod registry;

pub use process::{ProcessToken, ProcessWatch};
pub use registry::{DeathNotifier, LockRegistry};

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Remote party already terminated")]
    AlreadyDead,

    #[error("Liveness check failed: {0}")]
    Liveness(#[from] nix::errno::Errno),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle identifying a remote lock holder
pub trait RemoteToken: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Whether this is the null token, which can never hold a lock
    fn is_null(&self) -> bool {
        false
    }
}

impl RemoteToken for String {
    fn is_null(&self) -> bool {
        self.is_empty()
    }
}

impl RemoteToken for Arc<str> {
    fn is_null(&self) -> bool {
        self.is_empty()
    }
}

impl RemoteToken for u64 {
    fn is_null(&self) -> bool {
        *self == 0
    }
}

/// Subscription service telling the registry when a holder terminates.
///
/// Implementations keep at most one subscription per token; registering a
/// token that is already watched replaces its notifier. A notifier must never
/// be invoked from inside `register` or while the implementation holds its
/// own internal lock, because the registry calls `register` and `cancel` with
/// its lock held and [`DeathNotifier::notify`] takes that lock.
pub trait TerminationWatch<T: RemoteToken>: Send + Sync {
    /// Start watching `token`.
    ///
    /// Returns [`WatchError::AlreadyDead`] if the party is already gone, in
    /// which case no subscription is kept.
    fn register(&self, token: &T, notifier: DeathNotifier<T>) -> Result<(), WatchError>;

    /// Stop watching `token`. Unknown tokens are ignored.
    fn cancel(&self, token: &T);
}
