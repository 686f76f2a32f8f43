use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::request::Request;
use crate::sync::lock;

struct Slots {
    limit:   Option<usize>,
    running: usize,
    waiters: VecDeque<oneshot::Sender<Admission>>,
}

struct Shared {
    name:  String,
    slots: Mutex<Slots>,
    peak:  AtomicUsize,
}

impl Shared {
    fn has_room(slots: &Slots) -> bool { slots.limit.is_none_or(|limit| slots.running < limit) }

    fn occupy(self: &Arc<Self>, slots: &mut Slots) -> Admission {
        slots.running += 1;
        self.peak.fetch_max(slots.running, Ordering::SeqCst);
        Admission {
            queue: Some(self.clone()),
        }
    }

    /// Hand free slots to waiters in arrival order.
    fn admit_waiters(self: &Arc<Self>, slots: &mut Slots) {
        while Self::has_room(slots) {
            let Some(waiter) = slots.waiters.pop_front() else {
                break;
            };
            let admission = self.occupy(slots);
            if let Err(mut unclaimed) = waiter.send(admission) {
                // The waiter went away; take the slot back without re-locking.
                unclaimed.queue = None;
                slots.running -= 1;
            }
        }
    }

    fn release(self: &Arc<Self>) {
        let mut slots = lock(&self.slots);
        slots.running = slots.running.saturating_sub(1);
        self.admit_waiters(&mut slots);
    }
}

/// An occupied execution slot, freed on drop.
struct Admission {
    queue: Option<Arc<Shared>>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.release();
        }
    }
}

enum Ticket {
    Ready(Admission),
    Waiting(oneshot::Receiver<Admission>),
}

impl Ticket {
    async fn admitted(self) -> Option<Admission> {
        match self {
            Ticket::Ready(admission) => Some(admission),
            Ticket::Waiting(rx) => rx.await.ok(),
        }
    }
}

/// A FIFO admission queue with an adjustable bound on how many requests
/// execute at once. Unbounded by default.
#[derive(Clone)]
pub struct ExecutionQueue {
    shared: Arc<Shared>,
}

impl ExecutionQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name:  name.into(),
                slots: Mutex::new(Slots {
                    limit:   None,
                    running: 0,
                    waiters: VecDeque::new(),
                }),
                peak:  AtomicUsize::new(0),
            }),
        }
    }

    pub fn with_limit(name: impl Into<String>, limit: usize) -> Self {
        let queue = Self::new(name);
        queue.set_limit(Some(limit));
        queue
    }

    pub fn name(&self) -> &str { &self.shared.name }

    pub fn limit(&self) -> Option<usize> { lock(&self.shared.slots).limit }

    /// Change the bound. Raising it admits waiters at once; lowering it
    /// never interrupts running requests. A limit of zero is treated as one.
    pub fn set_limit(&self, limit: Option<usize>) {
        let mut slots = lock(&self.shared.slots);
        slots.limit = limit.map(|n| n.max(1));
        self.shared.admit_waiters(&mut slots);
    }

    pub fn running(&self) -> usize { lock(&self.shared.slots).running }

    /// Requests waiting for a slot, including ones cancelled meanwhile.
    pub fn waiting(&self) -> usize { lock(&self.shared.slots).waiters.len() }

    /// Highest number of requests that held a slot at the same time.
    pub fn peak(&self) -> usize { self.shared.peak.load(Ordering::SeqCst) }

    fn ticket(&self) -> Ticket {
        let mut slots = lock(&self.shared.slots);
        if slots.waiters.is_empty() && Shared::has_room(&slots) {
            return Ticket::Ready(self.shared.occupy(&mut slots));
        }
        let (tx, rx) = oneshot::channel();
        slots.waiters.push_back(tx);
        Ticket::Waiting(rx)
    }

    /// Queue `request` for execution. Its place in line is taken before
    /// this returns. Returns `false` if the request was already dispatched.
    pub fn submit(&self, request: &Request) -> bool {
        if !request.mark_enqueued() {
            return false;
        }
        let ticket = self.ticket();
        let request = request.clone();
        let queue = self.name().to_string();
        tokio::spawn(async move {
            let admission = tokio::select! {
                admission = ticket.admitted() => admission,
                () = request.wait_terminal() => return,
            };
            tracing::debug!(request_id = request.id(), %queue, "admitted");
            if request.begin() {
                request.run().await;
            }
            drop(admission);
        });
        true
    }
}

impl fmt::Debug for ExecutionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = lock(&self.shared.slots);
        f.debug_struct("ExecutionQueue")
            .field("name", &self.shared.name)
            .field("limit", &slots.limit)
            .field("running", &slots.running)
            .field("waiting", &slots.waiters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unbounded_admits_immediately() {
        let queue = ExecutionQueue::new("test");
        let a = queue.ticket().admitted().await;
        let b = queue.ticket().admitted().await;
        assert!(a.is_some() && b.is_some());
        assert_eq!(queue.running(), 2);
        drop((a, b));
        assert_eq!(queue.running(), 0);
        assert_eq!(queue.peak(), 2);
    }

    #[tokio::test]
    async fn test_limit_admits_in_fifo_order() {
        let queue = ExecutionQueue::with_limit("test", 1);
        let first = queue.ticket().admitted().await;
        let second = queue.ticket();
        let third = queue.ticket();
        assert_eq!(queue.waiting(), 2);

        drop(first);
        let Ticket::Waiting(mut third_rx) = third else {
            panic!("third ticket should wait");
        };
        assert!(third_rx.try_recv().is_err());
        let second = second.admitted().await;
        assert!(second.is_some());
        assert_eq!(queue.running(), 1);

        drop(second);
        assert!(third_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_raising_limit_admits_waiters() {
        let queue = ExecutionQueue::with_limit("test", 1);
        let _held = queue.ticket().admitted().await;
        let waiting = queue.ticket();
        queue.set_limit(Some(2));
        assert!(waiting.admitted().await.is_some());
        assert_eq!(queue.peak(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_frees_its_slot() {
        let queue = ExecutionQueue::with_limit("test", 1);
        let held = queue.ticket().admitted().await;
        drop(queue.ticket());
        let next = queue.ticket();
        drop(held);
        let next = next.admitted().await;
        assert!(next.is_some());
        assert_eq!(queue.running(), 1);
        drop(next);
        assert_eq!(queue.running(), 0);
    }
}
