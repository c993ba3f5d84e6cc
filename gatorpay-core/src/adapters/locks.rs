//! Keyed exclusive locks
//!
//! Serializes read-modify-write sequences that target the same record
//! (one wallet, one user/purpose code pair) while leaving unrelated keys
//! free to run in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::CodePurpose;

/// Registry of per-key mutexes, created on demand and pruned when idle
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`
    pub fn with_key<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        self.with_keys(&[key], f)
    }

    /// Run `f` while holding every lock in `keys`
    ///
    /// Locks are taken in sorted order, so callers sharing any subset of
    /// keys cannot deadlock. Duplicates are taken once.
    pub fn with_keys<T>(&self, keys: &[&str], f: impl FnOnce() -> T) -> T {
        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys.dedup();

        let slots: Vec<Arc<Mutex<()>>> = {
            let mut registry = self.slots.lock();
            keys.iter()
                .map(|key| Arc::clone(registry.entry(key.to_string()).or_default()))
                .collect()
        };

        let result = {
            let _guards: Vec<_> = slots.iter().map(|slot| slot.lock()).collect();
            f()
        };

        // Only the registry and this call hold a slot: nobody is waiting on it
        let mut registry = self.slots.lock();
        for (key, slot) in keys.iter().zip(&slots) {
            if Arc::strong_count(slot) == 2 {
                registry.remove(*key);
            }
        }
        result
    }

    /// Number of keys currently held or waited on
    pub fn active_keys(&self) -> usize {
        self.slots.lock().len()
    }
}

pub fn wallet_key(user_id: &Uuid) -> String {
    format!("wallet:{}", user_id)
}

pub fn code_key(user_id: &Uuid, purpose: CodePurpose) -> String {
    format!("otp:{}:{}", user_id, purpose.as_str())
}

pub fn federated_key(external_id: &str) -> String {
    format!("federated:{}", external_id)
}

/// One identity column value, e.g. `identity:email:a@fla.edu`
pub fn identity_key(column: &str, value: &str) -> String {
    format!("identity:{}:{}", column, value)
}
