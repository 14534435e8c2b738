//! Per-shard multi-granularity lock
//!
//! Compatibility:
//!
//! ```text
//!          IS   IX   X
//!     IS   yes  yes  no
//!     IX   yes  yes  no
//!     X    no   no   no
//! ```
//!
//! A lock is held by a `ShardLockGuard` and released when the guard drops,
//! on every exit path of the owning operation.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Lock mode requested on a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Read-only and inspection work
    IntentShared,
    /// Single-shard mutation (binlog apply, restore)
    IntentExclusive,
    /// Topology or exclusivity-sensitive change (source rebinding)
    Exclusive,
}

impl LockMode {
    /// Short name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::IntentShared => "IS",
            LockMode::IntentExclusive => "IX",
            LockMode::Exclusive => "X",
        }
    }

    /// Whether a holder in `self` may coexist with a holder in `other`
    pub fn is_compatible(self, other: LockMode) -> bool {
        !matches!(self, LockMode::Exclusive) && !matches!(other, LockMode::Exclusive)
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Default)]
struct Holders {
    intent_shared: usize,
    intent_exclusive: usize,
    exclusive: usize,
}

impl Holders {
    fn admits(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::IntentShared | LockMode::IntentExclusive => self.exclusive == 0,
            LockMode::Exclusive => {
                self.intent_shared == 0 && self.intent_exclusive == 0 && self.exclusive == 0
            }
        }
    }

    fn slot(&mut self, mode: LockMode) -> &mut usize {
        match mode {
            LockMode::IntentShared => &mut self.intent_shared,
            LockMode::IntentExclusive => &mut self.intent_exclusive,
            LockMode::Exclusive => &mut self.exclusive,
        }
    }
}

/// Lock protecting one shard
#[derive(Debug, Default)]
pub struct ShardLock {
    holders: Mutex<Holders>,
    released: Condvar,
}

impl ShardLock {
    /// Create an unheld lock
    pub fn new() -> Self {
        Self::default()
    }

    fn holders(&self) -> MutexGuard<'_, Holders> {
        // Holders is plain counters; a panic elsewhere cannot leave it torn.
        self.holders.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Block until `mode` is compatible with current holders, then take it.
    pub fn lock(&self, mode: LockMode) -> ShardLockGuard<'_> {
        let mut holders = self.holders();
        while !holders.admits(mode) {
            holders = self
                .released
                .wait(holders)
                .unwrap_or_else(|p| p.into_inner());
        }
        *holders.slot(mode) += 1;
        ShardLockGuard { lock: self, mode }
    }

    /// Take `mode` only if it is immediately compatible.
    pub fn try_lock(&self, mode: LockMode) -> Option<ShardLockGuard<'_>> {
        let mut holders = self.holders();
        if !holders.admits(mode) {
            return None;
        }
        *holders.slot(mode) += 1;
        Some(ShardLockGuard { lock: self, mode })
    }

    /// Number of current holders in `mode`
    pub fn holder_count(&self, mode: LockMode) -> usize {
        *self.holders().slot(mode)
    }

    fn release(&self, mode: LockMode) {
        let mut holders = self.holders();
        let slot = holders.slot(mode);
        *slot = slot.saturating_sub(1);
        drop(holders);
        self.released.notify_all();
    }
}

/// Scoped hold of a `ShardLock`; releases on drop
#[derive(Debug)]
pub struct ShardLockGuard<'a> {
    lock: &'a ShardLock,
    mode: LockMode,
}

impl ShardLockGuard<'_> {
    /// Mode this guard holds
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for ShardLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(self.mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_compatibility_matrix() {
        use LockMode::*;
        assert!(IntentShared.is_compatible(IntentShared));
        assert!(IntentShared.is_compatible(IntentExclusive));
        assert!(IntentExclusive.is_compatible(IntentExclusive));
        assert!(!IntentShared.is_compatible(Exclusive));
        assert!(!IntentExclusive.is_compatible(Exclusive));
        assert!(!Exclusive.is_compatible(Exclusive));
    }

    #[test]
    fn test_intent_modes_coexist() {
        let lock = ShardLock::new();
        let _a = lock.lock(LockMode::IntentShared);
        let _b = lock.lock(LockMode::IntentExclusive);
        assert_eq!(lock.holder_count(LockMode::IntentShared), 1);
        assert_eq!(lock.holder_count(LockMode::IntentExclusive), 1);
        assert!(lock.try_lock(LockMode::Exclusive).is_none());
    }

    #[test]
    fn test_exclusive_excludes_everything() {
        let lock = ShardLock::new();
        let x = lock.lock(LockMode::Exclusive);
        assert!(lock.try_lock(LockMode::IntentShared).is_none());
        assert!(lock.try_lock(LockMode::IntentExclusive).is_none());
        assert!(lock.try_lock(LockMode::Exclusive).is_none());
        drop(x);
        assert!(lock.try_lock(LockMode::Exclusive).is_some());
    }

    #[test]
    fn test_guard_releases_on_early_return() {
        fn fails_while_holding(lock: &ShardLock) -> Result<(), ()> {
            let _guard = lock.lock(LockMode::Exclusive);
            Err(())
        }
        let lock = ShardLock::new();
        assert!(fails_while_holding(&lock).is_err());
        assert_eq!(lock.holder_count(LockMode::Exclusive), 0);
    }

    #[test]
    fn test_exclusive_waits_for_intent_holders() {
        let lock = Arc::new(ShardLock::new());
        let acquired = Arc::new(AtomicBool::new(false));

        let reader = lock.lock(LockMode::IntentShared);
        let handle = {
            let lock = Arc::clone(&lock);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _x = lock.lock(LockMode::Exclusive);
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(reader);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
