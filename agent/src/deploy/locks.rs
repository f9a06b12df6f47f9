//! Per-application mutual exclusion

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::errors::DeployerError;

/// Guard held for the duration of a mutating operation
pub type AppGuard = OwnedMutexGuard<()>;

/// Lazily populated map of application name to lock. Entries are never
/// removed, so two callers always contend on the same mutex.
#[derive(Default)]
pub struct AppLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AppLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Acquire the lock for `name`, waiting at most `wait`. Waiters are served
    /// in arrival order. A zero wait tries exactly once.
    pub async fn acquire(&self, name: &str, wait: Duration) -> Result<AppGuard, DeployerError> {
        let lock = self.entry(name);
        let busy = || {
            DeployerError::Busy(format!(
                "another operation on '{}' is in progress",
                name
            ))
        };

        if wait.is_zero() {
            return lock.try_lock_owned().map_err(|_| busy());
        }

        match tokio::time::timeout(wait, lock.lock_owned()).await {
            Ok(guard) => {
                debug!(application = %name, "Acquired application lock");
                Ok(guard)
            }
            Err(_) => Err(busy()),
        }
    }
}
