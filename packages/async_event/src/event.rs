use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{self, Poll, Waker};

use tracing::{debug, trace};

use crate::{Completion, EventId, Executor, WaitEntry, WaitService};

/// An asynchronous event that pending operations can wait on without blocking any thread.
///
/// This is the callback-based counterpart of a condition variable. Instead of blocking, each
/// waiter registers a completion handler via [`async_wait()`][Self::async_wait]. When the event
/// is signaled via [`notify_one()`][Self::notify_one] or [`notify_all()`][Self::notify_all],
/// released handlers are posted to their executor and run when that executor's context is next
/// driven. Waiters are released in the order they were registered.
///
/// Each handler runs on the event's executor unless it was bound to another one via
/// [`bind_executor()`][crate::bind_executor].
///
/// # Teardown
///
/// Dropping the event drops its pending handlers without invoking them. The pending handlers
/// are stored in the execution context of the event's executor, so handlers that keep the
/// event's owner alive (a reference cycle) are also dropped without being invoked when that
/// context shuts down, releasing the owner.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use async_event::{AsyncEvent, ExecutionContext};
///
/// let context = ExecutionContext::new();
/// let event = AsyncEvent::new(context.executor());
/// let invoked = Rc::new(Cell::new(0));
///
/// for _ in 0..2 {
///     let invoked = Rc::clone(&invoked);
///     event.async_wait(move || invoked.set(invoked.get() + 1));
/// }
///
/// assert_eq!(event.notify_all(), 2);
/// assert_eq!(invoked.get(), 0);
///
/// assert_eq!(context.run(), 2);
/// assert_eq!(invoked.get(), 2);
/// ```
pub struct AsyncEvent {
    executor: Executor,

    id: EventId,

    // Owned by the execution context; we only share it. Pending waiters live in here.
    waits: Rc<WaitService>,

    _single_threaded: PhantomData<*const ()>,
}

impl AsyncEvent {
    /// Creates an event whose waiters run on `executor` unless bound elsewhere.
    ///
    /// If the executor's context no longer exists, the event is created anyway but will never
    /// hold any waiters.
    #[must_use]
    pub fn new(executor: Executor) -> Self {
        let waits = executor
            .use_service::<WaitService>()
            .unwrap_or_else(|| Rc::new(WaitService::detached()));

        let id = waits.allocate_id();

        if waits.is_shut_down() {
            debug!(
                event = id,
                "async event created on an execution context that has shut down"
            );
        }

        Self {
            executor,
            id,
            waits,
            _single_threaded: PhantomData,
        }
    }

    /// The executor that waiters run on unless they were bound to another one.
    #[must_use]
    pub fn get_executor(&self) -> Executor {
        self.executor.clone()
    }

    /// Registers a handler to be released by a later [`notify_one()`][Self::notify_one] or
    /// [`notify_all()`][Self::notify_all].
    ///
    /// Never invokes the handler inline. If the event's execution context has already shut
    /// down, nothing could ever release the handler, so it is dropped immediately instead.
    pub fn async_wait<C>(&self, handler: C)
    where
        C: Completion,
    {
        let executor = handler.associated_executor(&self.executor);
        let entry = WaitEntry::new(executor, Box::new(move || handler.complete()));

        match self.waits.enqueue(self.id, entry) {
            Ok(()) => {
                trace!(event = self.id, "waiter registered");
            }
            Err(rejected) => {
                debug!(
                    event = self.id,
                    "execution context has shut down; waiter dropped without being invoked"
                );
                drop(rejected);
            }
        }
    }

    /// Releases the oldest pending waiter, posting its handler to the handler's executor.
    ///
    /// Returns the number of waiters released (0 or 1).
    pub fn notify_one(&self) -> usize {
        // The queue borrow ends before the handler is posted.
        let Some(entry) = self.waits.dequeue_one(self.id) else {
            return 0;
        };

        entry.release();

        trace!(event = self.id, "released one waiter");
        1
    }

    /// Releases every pending waiter, oldest first, posting each handler to its own executor.
    ///
    /// Returns the number of waiters released.
    pub fn notify_all(&self) -> usize {
        let entries = self.waits.dequeue_all(self.id);
        let released = entries.len();

        for entry in entries {
            entry.release();
        }

        if released != 0 {
            trace!(event = self.id, released, "released all waiters");
        }

        released
    }

    /// The number of waiters registered and not yet released.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.waits.pending(self.id)
    }

    /// Returns a future that completes once a waiter it registers has been released and run
    /// on the event's executor.
    ///
    /// The waiter is registered when the future is first polled. Dropping the future does not
    /// withdraw a registered waiter; a later notification still releases it (and counts it),
    /// but its handler does nothing.
    ///
    /// If the waiter is dropped without ever running, because the event's execution context
    /// shut down (or had already shut down when the future was first polled), the future
    /// completes anyway. No notification can arrive after that point.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::pin::pin;
    /// use std::task::{Context, Poll};
    ///
    /// use async_event::{AsyncEvent, ExecutionContext};
    /// use futures::task::noop_waker_ref;
    ///
    /// let context = ExecutionContext::new();
    /// let event = AsyncEvent::new(context.executor());
    ///
    /// let mut notified = pin!(event.notified());
    /// let mut cx = Context::from_waker(noop_waker_ref());
    ///
    /// assert!(notified.as_mut().poll(&mut cx).is_pending());
    ///
    /// event.notify_one();
    /// context.run();
    ///
    /// assert!(notified.as_mut().poll(&mut cx).is_ready());
    /// ```
    #[must_use]
    pub fn notified(&self) -> Notified<'_> {
        Notified {
            event: self,
            state: None,
        }
    }
}

impl Drop for AsyncEvent {
    fn drop(&mut self) {
        self.waits.discard(self.id);
    }
}

impl fmt::Debug for AsyncEvent {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncEvent")
            .field("executor", &self.executor)
            .field("id", &self.id)
            .field("waits", &self.waits)
            .finish_non_exhaustive()
    }
}

/// Future returned by [`AsyncEvent::notified()`].
#[must_use = "futures do nothing unless polled"]
pub struct Notified<'a> {
    event: &'a AsyncEvent,

    // Present once the waiter has been registered.
    state: Option<Rc<NotifiedState>>,
}

#[derive(Default)]
struct NotifiedState {
    // The waiter's handler ran.
    released: Cell<bool>,

    // The waiter is gone, either because its handler ran or because it was dropped unrun.
    finished: Cell<bool>,

    waker: RefCell<Option<Waker>>,
}

/// Owned by the waiter registered for a [`Notified`]. Wakes the future whenever the waiter goes
/// away, whether it ran or was dropped during shutdown.
struct NotifiedSignal {
    state: Rc<NotifiedState>,
}

impl Drop for NotifiedSignal {
    fn drop(&mut self) {
        self.state.finished.set(true);

        // Taken out first; the waker may poll the future again.
        let waker = self.state.waker.borrow_mut().take();

        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl Future for Notified<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        // No field is structurally pinned.
        let this = self.get_mut();

        let state = match &this.state {
            Some(state) => Rc::clone(state),
            None => {
                let state = Rc::new(NotifiedState::default());
                this.state = Some(Rc::clone(&state));

                let signal = NotifiedSignal {
                    state: Rc::clone(&state),
                };

                this.event.async_wait(move || {
                    signal.state.released.set(true);
                    drop(signal);
                });

                state
            }
        };

        if state.finished.get() {
            return Poll::Ready(());
        }

        *state.waker.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl fmt::Debug for Notified<'_> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notified")
            .field("event", &self.event)
            .field(
                "released",
                &self.state.as_ref().map(|state| state.released.get()),
            )
            .finish()
    }
}
