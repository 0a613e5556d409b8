// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIAMOND QUIZ (DQZ) - PER-ENTITY LOCKS
//
// Serializes every mutation of one account (or one quiz slot) inside this
// process. Two concurrent requests for the same entity would otherwise read
// the same state and race their writes.
//
// Lock order is always quiz → account. Never take a quiz lock while holding
// an account lock.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Entries above this count trigger a sweep of idle locks.
const PRUNE_THRESHOLD: usize = 4_096;

/// Recover from poisoned mutex instead of panicking
pub fn safe_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, account_id: &str) -> Arc<Mutex<()>> {
        self.get(format!("account:{}", account_id))
    }

    pub fn quiz(&self, quiz_id: &str) -> Arc<Mutex<()>> {
        self.get(format!("quiz:{}", quiz_id))
    }

    fn get(&self, key: String) -> Arc<Mutex<()>> {
        let mut locks = safe_lock(&self.locks);
        if locks.len() > PRUNE_THRESHOLD {
            // Only the map holds an idle lock.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        safe_lock(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    #[test]
    fn test_same_entity_shares_lock() {
        let registry = LockRegistry::new();
        let a = registry.account("alice");
        let b = registry.account("alice");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &registry.quiz("alice")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lock_serializes_read_modify_write() {
        let registry = Arc::new(LockRegistry::new());
        let counter = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let lock = registry.account("shared");
                        let _guard = safe_lock(&lock);
                        let v = counter.load(Ordering::Relaxed);
                        thread::yield_now();
                        counter.store(v + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 800);
    }
}
