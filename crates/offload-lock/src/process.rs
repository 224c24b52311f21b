//! Process liveness watch
//!
//! Watches local processes by pid. Liveness is checked with a null signal
//! (`kill(pid, 0)`); `ESRCH` means the process is gone. A background thread
//! re-checks every watched pid on a fixed interval and notifies the registry
//! about the ones that have exited.
//!
//! A zombie still answers the null signal until its parent reaps it.

use crate::{DeathNotifier, RemoteToken, TerminationWatch, WatchError};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::collections::HashMap;
use std::fmt;
use std::num::TryFromIntError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

/// Token naming a local process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessToken {
    pub pid: i32,
}

impl ProcessToken {
    pub fn new(pid: i32) -> Self {
        Self { pid }
    }

    /// Check whether the process still exists
    pub fn is_alive(&self) -> Result<bool, WatchError> {
        match kill(Pid::from_raw(self.pid), None) {
            Ok(()) => Ok(true),
            // Exists, but belongs to someone we may not signal
            Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(WatchError::Liveness(e)),
        }
    }
}

impl RemoteToken for ProcessToken {
    fn is_null(&self) -> bool {
        self.pid <= 0
    }
}

impl fmt::Display for ProcessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.pid)
    }
}

impl TryFrom<u32> for ProcessToken {
    type Error = TryFromIntError;

    fn try_from(pid: u32) -> Result<Self, Self::Error> {
        i32::try_from(pid).map(Self::new)
    }
}

type Watched = HashMap<ProcessToken, DeathNotifier<ProcessToken>>;

struct WatchShared {
    watched: Mutex<Watched>,
}

impl WatchShared {
    fn lock(&self) -> MutexGuard<'_, Watched> {
        self.watched.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check every watched pid and notify for the dead ones
    fn poll(&self) -> usize {
        let dead: Vec<DeathNotifier<ProcessToken>> = {
            let mut watched = self.lock();
            let gone: Vec<ProcessToken> = watched
                .keys()
                .filter(|token| match token.is_alive() {
                    Ok(alive) => !alive,
                    Err(e) => {
                        tracing::warn!("Failed to check {}: {}", token, e);
                        false
                    }
                })
                .copied()
                .collect();

            gone.iter().filter_map(|token| watched.remove(token)).collect()
        };

        for notifier in &dead {
            tracing::debug!("Process {} exited", notifier.token());
            notifier.notify();
        }
        dead.len()
    }
}

/// Termination watch for local processes
pub struct ProcessWatch {
    shared: Arc<WatchShared>,
    poll_interval: Option<Duration>,
}

impl ProcessWatch {
    /// Create a watch with a background poller probing every `poll_interval`.
    ///
    /// The poller thread exits on its next tick after the watch is dropped.
    pub fn new(poll_interval: Duration) -> Result<Self, WatchError> {
        let watch = Self {
            shared: Arc::new(WatchShared {
                watched: Mutex::new(HashMap::new()),
            }),
            poll_interval: Some(poll_interval),
        };

        let weak = Arc::downgrade(&watch.shared);
        thread::Builder::new()
            .name("offload-proc-watch".to_string())
            .spawn(move || poll_loop(weak, poll_interval))?;

        tracing::info!("Process watch started, polling every {:?}", poll_interval);
        Ok(watch)
    }

    /// Create a watch without a poller; deaths are only noticed by
    /// [`poll_now`](Self::poll_now)
    pub fn manual() -> Self {
        Self {
            shared: Arc::new(WatchShared {
                watched: Mutex::new(HashMap::new()),
            }),
            poll_interval: None,
        }
    }

    /// Check all watched processes immediately.
    ///
    /// Returns how many were found dead and released.
    pub fn poll_now(&self) -> usize {
        self.shared.poll()
    }

    /// Number of processes being watched
    pub fn watched(&self) -> usize {
        self.shared.lock().len()
    }

    /// Background polling interval, if a poller is running
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval
    }
}

fn poll_loop(shared: Weak<WatchShared>, interval: Duration) {
    loop {
        thread::sleep(interval);
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.poll();
    }
    tracing::debug!("Process watch poller stopped");
}

impl TerminationWatch<ProcessToken> for ProcessWatch {
    fn register(
        &self,
        token: &ProcessToken,
        notifier: DeathNotifier<ProcessToken>,
    ) -> Result<(), WatchError> {
        if !token.is_alive()? {
            return Err(WatchError::AlreadyDead);
        }
        self.shared.lock().insert(*token, notifier);
        Ok(())
    }

    fn cancel(&self, token: &ProcessToken) {
        self.shared.lock().remove(token);
    }
}
