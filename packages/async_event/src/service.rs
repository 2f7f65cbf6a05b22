use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

/// An object that lives inside an [`ExecutionContext`][crate::ExecutionContext] and is told when
/// that context shuts down.
///
/// Each context holds at most one instance of each service type, created on first use via
/// [`ExecutionContext::use_service()`][crate::ExecutionContext::use_service] or
/// [`Executor::use_service()`][crate::Executor::use_service].
///
/// Services are the place to keep state that must not outlive the context's run loop. In
/// particular, anything that may hold callables which (directly or indirectly) own the context's
/// users should live in a service and be dropped from [`Service::shutdown()`], so that dropping
/// the context breaks any reference cycle formed through those callables.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
///
/// use async_event::{ExecutionContext, Service};
///
/// #[derive(Debug, Default)]
/// struct Connections {
///     closed: Cell<bool>,
/// }
///
/// impl Service for Connections {
///     fn shutdown(&self) {
///         self.closed.set(true);
///     }
/// }
///
/// let context = ExecutionContext::new();
/// let connections = context.use_service::<Connections>();
///
/// context.shutdown();
/// assert!(connections.closed.get());
/// ```
pub trait Service: 'static {
    /// Called exactly once, when the owning execution context shuts down.
    ///
    /// Implementations must drop any stored callables here without invoking them. The context
    /// no longer accepts new work by the time this is called.
    fn shutdown(&self);
}

struct ServiceSlot {
    type_id: TypeId,

    // The same allocation twice: once for downcasting, once for the shutdown hook.
    instance: Rc<dyn Any>,
    service: Rc<dyn Service>,
}

/// The set of services that belong to one execution context, in creation order.
#[derive(Default)]
pub(crate) struct ServiceRegistry {
    slots: Vec<ServiceSlot>,
}

impl ServiceRegistry {
    pub(crate) fn get<S>(&self) -> Option<Rc<S>>
    where
        S: Service,
    {
        let type_id = TypeId::of::<S>();

        self.slots
            .iter()
            .find(|slot| slot.type_id == type_id)
            .and_then(|slot| Rc::clone(&slot.instance).downcast::<S>().ok())
    }

    pub(crate) fn contains<S>(&self) -> bool
    where
        S: Service,
    {
        let type_id = TypeId::of::<S>();
        self.slots.iter().any(|slot| slot.type_id == type_id)
    }

    pub(crate) fn insert<S>(&mut self, service: Rc<S>)
    where
        S: Service,
    {
        debug_assert!(!self.contains::<S>());

        let instance: Rc<dyn Any> = Rc::<S>::clone(&service);

        self.slots.push(ServiceSlot {
            type_id: TypeId::of::<S>(),
            instance,
            service,
        });
    }

    /// Services in the order they must be shut down (newest first).
    pub(crate) fn shutdown_order(&self) -> Vec<Rc<dyn Service>> {
        self.slots
            .iter()
            .rev()
            .map(|slot| Rc::clone(&slot.service))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

impl fmt::Debug for ServiceRegistry {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("len", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    thread_local! {
        static SHUTDOWN_LOG: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    }

    #[derive(Debug, Default)]
    struct First {
        shutdowns: Cell<usize>,
    }

    impl Service for First {
        fn shutdown(&self) {
            self.shutdowns.set(self.shutdowns.get().saturating_add(1));
            SHUTDOWN_LOG.with_borrow_mut(|log| log.push("first"));
        }
    }

    #[derive(Debug, Default)]
    struct Second;

    impl Service for Second {
        fn shutdown(&self) {
            SHUTDOWN_LOG.with_borrow_mut(|log| log.push("second"));
        }
    }

    #[test]
    fn get_returns_inserted_instance() {
        let mut registry = ServiceRegistry::default();
        let first = Rc::new(First::default());

        registry.insert(Rc::clone(&first));

        let found = registry.get::<First>().unwrap();
        assert!(Rc::ptr_eq(&found, &first));
        assert!(registry.get::<Second>().is_none());
    }

    #[test]
    fn contains_tracks_types() {
        let mut registry = ServiceRegistry::default();
        assert!(!registry.contains::<First>());

        registry.insert(Rc::new(First::default()));

        assert!(registry.contains::<First>());
        assert!(!registry.contains::<Second>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn shutdown_order_is_newest_first() {
        SHUTDOWN_LOG.with_borrow_mut(Vec::clear);

        let mut registry = ServiceRegistry::default();
        registry.insert(Rc::new(First::default()));
        registry.insert(Rc::new(Second));

        for service in registry.shutdown_order() {
            service.shutdown();
        }

        SHUTDOWN_LOG.with_borrow(|log| assert_eq!(log.as_slice(), ["second", "first"]));
    }
}
