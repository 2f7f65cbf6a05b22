use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::{ContextBuilder, Executor, Service, ServiceRegistry};

/// A unit of deferred work queued on an execution context.
pub(crate) type Work = Box<dyn FnOnce()>;

/// A single-threaded run loop that owns deferred work and the services attached to it.
///
/// Work is handed to the context through an [`Executor`] obtained from [`executor()`][Self::executor]
/// and runs only when the owner of the context drives the loop via [`run()`][Self::run],
/// [`run_one()`][Self::run_one], [`poll()`][Self::poll] or [`poll_one()`][Self::poll_one].
///
/// When a run call finds no more queued work, the context enters the stopped state, after which
/// all run calls return immediately until [`restart()`][Self::restart] is called.
///
/// Dropping the context shuts it down: every service is told to release its state and any work
/// that was never run is dropped without being invoked.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use async_event::ExecutionContext;
///
/// let context = ExecutionContext::new();
/// let counter = Rc::new(Cell::new(0));
///
/// let inner = Rc::clone(&counter);
/// context.executor().post(move || inner.set(inner.get() + 1));
///
/// assert_eq!(context.run(), 1);
/// assert_eq!(counter.get(), 1);
/// assert!(context.stopped());
/// ```
pub struct ExecutionContext {
    core: Rc<ContextCore>,
}

impl ExecutionContext {
    /// Creates a new execution context with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a new execution context with custom settings.
    ///
    /// # Example
    ///
    /// ```rust
    /// use async_event::ExecutionContext;
    ///
    /// let context = ExecutionContext::builder().name("io").build();
    /// assert_eq!(context.name(), "io");
    /// ```
    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub(crate) fn from_builder(name: String) -> Self {
        trace!(context = %name, "execution context created");

        Self {
            core: Rc::new(ContextCore {
                name,
                queue: RefCell::new(VecDeque::new()),
                stopped: Cell::new(false),
                shut_down: Cell::new(false),
                running_depth: Cell::new(0),
                services: RefCell::new(ServiceRegistry::default()),
                _single_threaded: PhantomData,
            }),
        }
    }

    /// The name given to the context when it was built, used in log output.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Returns a handle that can be used to schedule work on this context.
    ///
    /// Executors do not keep the context alive.
    #[must_use]
    pub fn executor(&self) -> Executor {
        Executor::new(Rc::downgrade(&self.core))
    }

    /// Runs queued work until the queue is empty or [`stop()`][Self::stop] is called.
    ///
    /// Work posted by the handlers themselves is also run. Returns the number of handlers invoked.
    pub fn run(&self) -> usize {
        self.core.run_handlers(usize::MAX)
    }

    /// Runs at most one queued handler. Returns the number of handlers invoked (0 or 1).
    pub fn run_one(&self) -> usize {
        self.core.run_handlers(1)
    }

    /// Runs every handler that is ready to run without waiting.
    ///
    /// This context never waits for external work, so this drains the queue exactly like
    /// [`run()`][Self::run] does.
    pub fn poll(&self) -> usize {
        self.core.run_handlers(usize::MAX)
    }

    /// Runs at most one handler that is ready to run without waiting.
    pub fn poll_one(&self) -> usize {
        self.core.run_handlers(1)
    }

    /// Puts the context into the stopped state.
    ///
    /// A `run()` call in progress returns once the current handler completes. Queued work is kept
    /// and will run after [`restart()`][Self::restart].
    pub fn stop(&self) {
        trace!(context = %self.core.name, "stop requested");
        self.core.stopped.set(true);
    }

    /// Whether the context is in the stopped state.
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.core.stopped.get()
    }

    /// Leaves the stopped state so that subsequent run calls process work again.
    pub fn restart(&self) {
        self.core.stopped.set(false);
    }

    /// The number of handlers queued and not yet invoked.
    #[must_use]
    pub fn pending_work(&self) -> usize {
        self.core.queue.borrow().len()
    }

    /// Returns the instance of service `S` that belongs to this context, creating it first
    /// if necessary.
    ///
    /// A service created after the context has shut down is shut down immediately.
    pub fn use_service<S>(&self) -> Rc<S>
    where
        S: Service + Default,
    {
        self.core.use_service::<S>()
    }

    /// Whether an instance of service `S` has been created for this context.
    #[must_use]
    pub fn has_service<S>(&self) -> bool
    where
        S: Service,
    {
        self.core.services.borrow().contains::<S>()
    }

    /// Shuts down the context.
    ///
    /// Every service is shut down (newest first), after which all queued work is dropped
    /// without being invoked. The context accepts no more work afterwards. Calling this more than
    /// once has no further effect. Dropping the context performs the same shutdown.
    pub fn shutdown(&self) {
        self.core.shutdown();
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

impl fmt::Debug for ExecutionContext {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("core", &self.core)
            .finish()
    }
}

/// The state shared between an execution context and its executors.
pub(crate) struct ContextCore {
    name: String,

    queue: RefCell<VecDeque<Work>>,

    stopped: Cell<bool>,

    // Once set, never cleared. A shut down context rejects all new work.
    shut_down: Cell<bool>,

    // How many run calls are currently executing a handler on this context. Non-zero means the
    // caller is inside the run loop, which is what `Executor::dispatch()` checks.
    running_depth: Cell<usize>,

    services: RefCell<ServiceRegistry>,

    _single_threaded: PhantomData<*const ()>,
}

impl ContextCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.get()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running_depth.get() != 0
    }

    /// Queues work for later invocation.
    ///
    /// If the context has shut down, the work is handed back to the caller instead.
    pub(crate) fn enqueue(&self, work: Work) -> Result<(), Work> {
        if self.shut_down.get() {
            return Err(work);
        }

        self.queue.borrow_mut().push_back(work);
        Ok(())
    }

    /// Runs the given work inline, marking the context as running for its duration.
    pub(crate) fn invoke(&self, work: Work) {
        let _running = RunningGuard::enter(self);
        work();
    }

    pub(crate) fn use_service<S>(&self) -> Rc<S>
    where
        S: Service + Default,
    {
        if let Some(existing) = self.services.borrow().get::<S>() {
            return existing;
        }

        // The service constructor may itself look up other services, so no borrow is held here.
        let created = Rc::new(S::default());

        {
            let mut services = self.services.borrow_mut();

            if let Some(existing) = services.get::<S>() {
                return existing;
            }

            services.insert(Rc::clone(&created));
        }

        if self.shut_down.get() {
            created.shutdown();
        }

        created
    }

    fn run_handlers(&self, limit: usize) -> usize {
        if self.stopped.get() {
            return 0;
        }

        let mut invoked: usize = 0;

        while invoked < limit {
            // A handler may have called `stop()`.
            if self.stopped.get() {
                return invoked;
            }

            // The borrow must end before the handler runs, as the handler may post more work.
            let next = self.queue.borrow_mut().pop_front();

            let Some(work) = next else {
                break;
            };

            self.invoke(work);
            invoked = invoked.saturating_add(1);
        }

        if self.queue.borrow().is_empty() {
            self.stopped.set(true);
        }

        trace!(context = %self.name, invoked, "run loop returned");

        invoked
    }

    fn shutdown(&self) {
        if self.shut_down.replace(true) {
            return;
        }

        self.stopped.set(true);

        let services = self.services.borrow().shutdown_order();

        debug!(
            context = %self.name,
            services = services.len(),
            "shutting down execution context"
        );

        for service in services {
            service.shutdown();
        }

        // Dropping the work may run arbitrary destructors, which may touch this context.
        let abandoned = mem::take(&mut *self.queue.borrow_mut());

        if !abandoned.is_empty() {
            debug!(
                context = %self.name,
                handlers = abandoned.len(),
                "dropping work that was never run"
            );
        }

        drop(abandoned);
    }
}

impl fmt::Debug for ContextCore {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextCore")
            .field("name", &self.name)
            .field("queued", &self.queue.try_borrow().map(|queue| queue.len()).ok())
            .field("stopped", &self.stopped.get())
            .field("shut_down", &self.shut_down.get())
            .field("running_depth", &self.running_depth.get())
            .field("services", &self.services.try_borrow().map(|s| s.len()).ok())
            .finish_non_exhaustive()
    }
}

/// Marks the context as running a handler for as long as the guard is alive.
struct RunningGuard<'a> {
    core: &'a ContextCore,
}

impl<'a> RunningGuard<'a> {
    fn enter(core: &'a ContextCore) -> Self {
        core.running_depth
            .set(core.running_depth.get().saturating_add(1));

        Self { core }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.core
            .running_depth
            .set(self.core.running_depth.get().saturating_sub(1));
    }
}
