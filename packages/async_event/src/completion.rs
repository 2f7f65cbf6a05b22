use std::fmt;

use crate::Executor;

/// A completion handler that can be registered with an [`AsyncEvent`][crate::AsyncEvent].
///
/// Every `FnOnce() + 'static` closure is a completion handler that runs on whatever executor the
/// event falls back to. To make a handler run on a specific executor, wrap it with
/// [`bind_executor()`].
///
/// Handlers must not panic. A panicking handler propagates out of the run call that invoked it.
pub trait Completion: 'static {
    /// The executor this handler must be invoked on. `default` is the executor of whatever
    /// object the handler is registered with.
    fn associated_executor(&self, default: &Executor) -> Executor;

    /// Consumes the handler, running its completion logic.
    fn complete(self);
}

impl<F> Completion for F
where
    F: FnOnce() + 'static,
{
    fn associated_executor(&self, default: &Executor) -> Executor {
        default.clone()
    }

    fn complete(self) {
        self();
    }
}

/// A completion handler bound to a specific executor.
///
/// Created by [`bind_executor()`].
#[must_use]
pub struct Bound<F> {
    executor: Executor,
    handler: F,
}

impl<F> Bound<F> {
    /// The executor the handler is bound to.
    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Discards the binding, returning the original handler.
    #[must_use]
    pub fn into_inner(self) -> F {
        self.handler
    }
}

impl<F> Completion for Bound<F>
where
    F: FnOnce() + 'static,
{
    fn associated_executor(&self, _default: &Executor) -> Executor {
        self.executor.clone()
    }

    fn complete(self) {
        (self.handler)();
    }
}

impl<F> fmt::Debug for Bound<F> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// Binds a handler to an executor, so that it is invoked on that executor regardless of
/// where it is registered.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use async_event::{AsyncEvent, ExecutionContext, bind_executor};
///
/// let events = ExecutionContext::new();
/// let worker = ExecutionContext::new();
///
/// let event = AsyncEvent::new(events.executor());
/// let invoked = Rc::new(Cell::new(false));
///
/// let inner = Rc::clone(&invoked);
/// event.async_wait(bind_executor(worker.executor(), move || inner.set(true)));
/// event.notify_one();
///
/// assert_eq!(events.run(), 0);
/// assert_eq!(worker.run(), 1);
/// assert!(invoked.get());
/// ```
pub fn bind_executor<F>(executor: Executor, handler: F) -> Bound<F>
where
    F: FnOnce() + 'static,
{
    Bound { executor, handler }
}
