use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::Result;
use crate::{ContextCore, Error, Service, Work};

/// A handle for scheduling work on an [`ExecutionContext`][crate::ExecutionContext].
///
/// Executors are cheap to clone and do not keep their context alive. Two executors compare equal
/// if and only if they refer to the same context.
///
/// Work handed to an executor whose context has shut down (or been dropped) is dropped without
/// being invoked.
///
/// # Example
///
/// ```rust
/// use async_event::ExecutionContext;
///
/// let a = ExecutionContext::new();
/// let b = ExecutionContext::new();
///
/// assert_eq!(a.executor(), a.executor());
/// assert_ne!(a.executor(), b.executor());
/// ```
#[derive(Clone)]
pub struct Executor {
    core: Weak<ContextCore>,
}

impl Executor {
    pub(crate) fn new(core: Weak<ContextCore>) -> Self {
        Self { core }
    }

    /// Queues `f` to be invoked later by the context's run loop. Never invokes `f` inline.
    ///
    /// If the context no longer accepts work, `f` is dropped without being invoked.
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        self.post_work(Box::new(f));
    }

    /// Queues `f` to be invoked later by the context's run loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextShutDown`] if the context has shut down or been dropped.
    /// `f` has been dropped without being invoked in that case.
    pub fn try_post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + 'static,
    {
        self.try_post_work(Box::new(f))
    }

    /// Queues already type-erased work, dropping it if the context no longer accepts work.
    pub(crate) fn post_work(&self, work: Work) {
        if let Err(error) = self.try_post_work(work) {
            debug!(%error, "work dropped without being invoked");
        }
    }

    fn try_post_work(&self, work: Work) -> Result<()> {
        let Some(core) = self.core.upgrade() else {
            drop(work);
            return Err(Error::ContextShutDown {
                context: "<dropped>".to_string(),
            });
        };

        match core.enqueue(work) {
            Ok(()) => {
                trace!(context = core.name(), "work posted");
                Ok(())
            }
            Err(rejected) => {
                // The rejected work may own arbitrary state; drop it before reporting.
                drop(rejected);

                Err(Error::ContextShutDown {
                    context: core.name().to_string(),
                })
            }
        }
    }

    /// Invokes `f` immediately if the caller is running inside this executor's run loop,
    /// otherwise behaves like [`post()`][Self::post].
    pub fn dispatch<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        match self.core.upgrade() {
            Some(core) if core.is_running() && !core.is_shut_down() => {
                core.invoke(Box::new(f));
            }
            _ => self.post(f),
        }
    }

    /// Whether the caller is currently inside a handler run by this executor's context.
    #[must_use]
    pub fn running_in_this_context(&self) -> bool {
        self.core.upgrade().is_some_and(|core| core.is_running())
    }

    /// Whether the context still exists and accepts work.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.core.upgrade().is_some_and(|core| !core.is_shut_down())
    }

    /// The name of the context, or `None` if the context has been dropped.
    #[must_use]
    pub fn context_name(&self) -> Option<String> {
        self.core.upgrade().map(|core| core.name().to_string())
    }

    /// Returns the instance of service `S` that belongs to this executor's context, creating
    /// it first if necessary.
    ///
    /// Returns `None` if the context has been dropped.
    #[must_use]
    pub fn use_service<S>(&self) -> Option<Rc<S>>
    where
        S: Service + Default,
    {
        self.core.upgrade().map(|core| core.use_service::<S>())
    }
}

impl PartialEq for Executor {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.core, &other.core)
    }
}

impl Eq for Executor {}

impl fmt::Debug for Executor {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("context", &self.context_name())
            .finish()
    }
}
