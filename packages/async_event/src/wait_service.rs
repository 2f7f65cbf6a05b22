use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;

use foldhash::{HashMap, HashMapExt};
use tracing::debug;

use crate::{Executor, Service, Work};

/// Identifies one [`AsyncEvent`][crate::AsyncEvent] within its context's wait service.
pub(crate) type EventId = u64;

/// A queued completion handler, together with the executor it must be invoked on.
pub(crate) struct WaitEntry {
    executor: Executor,
    work: Work,
}

impl WaitEntry {
    pub(crate) fn new(executor: Executor, work: Work) -> Self {
        Self { executor, work }
    }

    /// Hands the handler to its executor. The handler is not invoked here.
    pub(crate) fn release(self) {
        self.executor.post_work(self.work);
    }
}

impl fmt::Debug for WaitEntry {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitEntry")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// Owns the pending waiters of every async event whose default executor belongs to this
/// service's execution context.
///
/// A handler may own the object that owns its event. Events hold no strong reference to their
/// waiters, so shutting down the context drops every pending handler together with whatever the
/// handlers captured.
#[derive(Default)]
pub(crate) struct WaitService {
    next_id: Cell<EventId>,

    queues: RefCell<HashMap<EventId, VecDeque<WaitEntry>>>,

    shut_down: Cell<bool>,
}

impl WaitService {
    /// A service that is not attached to any context, for events whose context was already
    /// gone when they were created. It starts out shut down.
    pub(crate) fn detached() -> Self {
        let service = Self::default();
        service.shut_down.set(true);
        service
    }

    pub(crate) fn allocate_id(&self) -> EventId {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        id
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.get()
    }

    /// Appends a waiter to the tail of the event's queue.
    ///
    /// If the service has shut down, the entry is handed back so the caller can drop it.
    pub(crate) fn enqueue(&self, id: EventId, entry: WaitEntry) -> Result<(), WaitEntry> {
        if self.shut_down.get() {
            return Err(entry);
        }

        self.queues.borrow_mut().entry(id).or_default().push_back(entry);
        Ok(())
    }

    /// Removes the oldest waiter of the event, if any.
    pub(crate) fn dequeue_one(&self, id: EventId) -> Option<WaitEntry> {
        let mut queues = self.queues.borrow_mut();
        let queue = queues.get_mut(&id)?;
        let entry = queue.pop_front();

        if queue.is_empty() {
            queues.remove(&id);
        }

        entry
    }

    /// Removes every waiter of the event, oldest first.
    pub(crate) fn dequeue_all(&self, id: EventId) -> VecDeque<WaitEntry> {
        self.queues.borrow_mut().remove(&id).unwrap_or_default()
    }

    pub(crate) fn pending(&self, id: EventId) -> usize {
        self.queues.borrow().get(&id).map_or(0, VecDeque::len)
    }

    /// Drops every waiter of the event without invoking any of them.
    pub(crate) fn discard(&self, id: EventId) {
        // The handlers may own the event's owner, whose destructor may come back here.
        let discarded = self.dequeue_all(id);

        if !discarded.is_empty() {
            debug!(
                waiters = discarded.len(),
                "async event dropped with pending waiters"
            );
        }

        drop(discarded);
    }
}

impl Service for WaitService {
    fn shutdown(&self) {
        self.shut_down.set(true);

        // Take everything out first: dropping a handler may drop an event, which calls back into
        // `discard()` and needs to borrow the queues again.
        let queues = mem::replace(&mut *self.queues.borrow_mut(), HashMap::new());

        let waiters: usize = queues.values().map(VecDeque::len).sum();
        if waiters != 0 {
            debug!(
                events = queues.len(),
                waiters, "dropping pending waiters on context shutdown"
            );
        }

        drop(queues);
    }
}

impl fmt::Debug for WaitService {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitService")
            .field("next_id", &self.next_id.get())
            .field(
                "events_with_waiters",
                &self.queues.try_borrow().map(|queues| queues.len()).ok(),
            )
            .field("shut_down", &self.shut_down.get())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::ExecutionContext;
    use crate::test_utils::DropFlag;

    fn recording_entry(
        executor: &Executor,
        log: &Rc<RefCell<Vec<u32>>>,
        value: u32,
    ) -> WaitEntry {
        let log = Rc::clone(log);
        WaitEntry::new(
            executor.clone(),
            Box::new(move || log.borrow_mut().push(value)),
        )
    }

    #[test]
    fn ids_are_unique() {
        let service = WaitService::default();
        assert_ne!(service.allocate_id(), service.allocate_id());
    }

    #[test]
    fn dequeue_one_is_fifo() {
        let context = ExecutionContext::new();
        let service = WaitService::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let id = service.allocate_id();

        service
            .enqueue(id, recording_entry(&context.executor(), &log, 1))
            .unwrap();
        service
            .enqueue(id, recording_entry(&context.executor(), &log, 2))
            .unwrap();
        assert_eq!(service.pending(id), 2);

        service.dequeue_one(id).unwrap().release();
        service.dequeue_one(id).unwrap().release();
        assert!(service.dequeue_one(id).is_none());
        assert_eq!(service.pending(id), 0);

        assert_eq!(context.run(), 2);
        assert_eq!(*log.borrow(), [1, 2]);
    }

    #[test]
    fn queues_of_different_events_are_independent() {
        let context = ExecutionContext::new();
        let service = WaitService::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = service.allocate_id();
        let second = service.allocate_id();

        service
            .enqueue(first, recording_entry(&context.executor(), &log, 1))
            .unwrap();
        service
            .enqueue(second, recording_entry(&context.executor(), &log, 2))
            .unwrap();

        assert_eq!(service.dequeue_all(second).len(), 1);
        assert_eq!(service.pending(first), 1);
        assert_eq!(service.pending(second), 0);
    }

    #[test]
    fn discard_drops_without_invoking() {
        let context = ExecutionContext::new();
        let service = WaitService::default();
        let id = service.allocate_id();
        let dropped = DropFlag::new();
        let guard = dropped.guard();

        service
            .enqueue(
                id,
                WaitEntry::new(context.executor(), Box::new(move || drop(guard))),
            )
            .unwrap();

        service.discard(id);

        assert!(dropped.is_set());
        assert_eq!(context.pending_work(), 0);
    }

    #[test]
    fn shutdown_drops_all_and_rejects_new_waiters() {
        let context = ExecutionContext::new();
        let service = WaitService::default();
        let id = service.allocate_id();
        let dropped = DropFlag::new();
        let guard = dropped.guard();

        service
            .enqueue(
                id,
                WaitEntry::new(context.executor(), Box::new(move || drop(guard))),
            )
            .unwrap();

        service.shutdown();

        assert!(dropped.is_set());
        assert!(service.is_shut_down());
        assert!(
            service
                .enqueue(id, WaitEntry::new(context.executor(), Box::new(|| {})))
                .is_err()
        );
    }

    #[test]
    fn detached_service_starts_shut_down() {
        assert!(WaitService::detached().is_shut_down());
    }
}
