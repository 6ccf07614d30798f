//! Poison-recovering lock helpers.
//!
//! A panic while holding a cache lock must not take the whole cache layer
//! down with it; the guard is recovered and the event is logged.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn note_recovery(op: &'static str, kind: &'static str) {
    warn!(op, lock_kind = kind, "Recovered poisoned cache lock; state may be stale");
}

pub(crate) fn rw_read<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        note_recovery(op, "rwlock.read");
        poisoned.into_inner()
    })
}

pub(crate) fn rw_write<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        note_recovery(op, "rwlock.write");
        poisoned.into_inner()
    })
}

pub(crate) fn mutex_lock<'a, T>(lock: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        note_recovery(op, "mutex.lock");
        poisoned.into_inner()
    })
}
