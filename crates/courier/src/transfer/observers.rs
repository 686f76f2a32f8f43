use std::sync::{Arc, Mutex};

use crate::data::ProgressObserver;
use crate::sync::lock;

/// Identity of an observer, ignoring vtables.
pub(crate) fn same_observer(a: &Arc<dyn ProgressObserver>, b: &Arc<dyn ProgressObserver>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// An observer that only ever sees increasing values.
pub(crate) struct Guarded {
    observer: Arc<dyn ProgressObserver>,
    last:     Mutex<Option<f32>>,
}

impl Guarded {
    pub(crate) fn deliver(&self, value: f32) {
        let mut last = lock(&self.last);
        if last.is_some_and(|l| value <= l) {
            return;
        }
        *last = Some(value);
        self.observer.on_progress(value);
    }
}

/// Observers of one transfer plus the most recent value broadcast to them.
#[derive(Default)]
pub(crate) struct ObserverSet {
    entries: Vec<Arc<Guarded>>,
    last:    Option<f32>,
}

impl ObserverSet {
    /// Register `observer`. Returns it guarded, with the value it should be
    /// sent right away.
    pub(crate) fn add(&mut self, observer: Arc<dyn ProgressObserver>) -> (Arc<Guarded>, Option<f32>) {
        let guarded = Arc::new(Guarded {
            observer,
            last: Mutex::new(None),
        });
        self.entries.push(guarded.clone());
        (guarded, self.last)
    }

    pub(crate) fn remove(&mut self, observer: &Arc<dyn ProgressObserver>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|g| !same_observer(&g.observer, observer));
        self.entries.len() != before
    }

    pub(crate) fn clear(&mut self) { self.entries.clear(); }

    pub(crate) fn len(&self) -> usize { self.entries.len() }

    /// Record `value` and return who to send it to, or `None` if it does not
    /// advance the transfer.
    pub(crate) fn update(&mut self, value: f32) -> Option<Vec<Arc<Guarded>>> {
        if self.last.is_some_and(|l| value <= l) {
            return None;
        }
        self.last = Some(value);
        Some(self.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<dyn ProgressObserver>, Arc<Mutex<Vec<f32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: Arc<dyn ProgressObserver> = Arc::new(move |v: f32| sink.lock().unwrap().push(v));
        (observer, seen)
    }

    #[test]
    fn test_broadcast_is_monotonic() {
        let mut set = ObserverSet::default();
        let (observer, seen) = recorder();
        set.add(observer);
        for value in [0.2, 0.1, 0.5, 0.5, 1.0] {
            for guarded in set.update(value).unwrap_or_default() {
                guarded.deliver(value);
            }
        }
        assert_eq!(*seen.lock().unwrap(), vec![0.2, 0.5, 1.0]);
    }

    #[test]
    fn test_late_observer_gets_last_value() {
        let mut set = ObserverSet::default();
        set.update(0.4);
        let (observer, _) = recorder();
        let (_, last) = set.add(observer);
        assert_eq!(last, Some(0.4));
    }

    #[test]
    fn test_remove_by_identity() {
        let mut set = ObserverSet::default();
        let (a, _) = recorder();
        let (b, _) = recorder();
        set.add(a.clone());
        set.add(b);
        assert!(set.remove(&a));
        assert!(!set.remove(&a));
        assert_eq!(set.len(), 1);
    }
}
