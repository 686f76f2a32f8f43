use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// A panic while a lock is held never leaves these maps half-updated, so a
// poisoned lock is still usable.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> { l.read().unwrap_or_else(PoisonError::into_inner) }

pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> { l.write().unwrap_or_else(PoisonError::into_inner) }
