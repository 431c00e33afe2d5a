//! Concurrency guards.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

/// Scopes with a generation in progress.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    scopes: Mutex<HashSet<String>>,
}

/// Releases its scopes on drop.
#[derive(Debug)]
pub(crate) struct InFlightGuard<'a> {
    owner: &'a InFlight,
    scopes: Vec<String>,
}

impl InFlight {
    /// Claims every scope in `ids`, or none.
    ///
    /// Returns the first busy id on contention.
    pub(crate) fn try_begin(&self, ids: &[String]) -> Result<InFlightGuard<'_>, String> {
        let mut scopes = self.scopes.lock();
        if let Some(busy) = ids.iter().find(|id| scopes.contains(*id)) {
            return Err(busy.clone());
        }
        scopes.extend(ids.iter().cloned());
        Ok(InFlightGuard {
            owner: self,
            scopes: ids.to_vec(),
        })
    }

    #[cfg(test)]
    pub(crate) fn is_busy(&self, id: &str) -> bool {
        self.scopes.lock().contains(id)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut scopes = self.owner.scopes.lock();
        for id in &self.scopes {
            scopes.remove(id);
        }
    }
}

/// One mutex per key, created on first use.
///
/// Keys are students (edits of one student's rotations) or
/// `planning/service` pairs (seats of one service in one planning).
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    /// Mutex serializing work on `key`.
    pub(crate) fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}
