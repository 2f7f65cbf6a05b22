//! Testing utilities shared by the test modules of this crate.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Runs a test on a separate thread and panics if it does not finish within 10 seconds.
///
/// A bug in the run loop tends to show up as a test that never returns, so every test that
/// drives an execution context goes through here.
pub(crate) fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    // Mutation testing needs to see hanging mutants as hangs.
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the watchdog already gave up on us.
        drop(tx.send(result));
    });

    match rx.recv_timeout(Duration::from_secs(10)) {
        Ok(result) => {
            test_handle.join().expect("test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded 10-second timeout - likely stuck in a run loop");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// Counts how many times handlers created from it have been invoked.
#[derive(Debug, Default)]
pub(crate) struct InvocationCounter {
    count: Rc<Cell<usize>>,
}

impl InvocationCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A handler that increments this counter when invoked.
    pub(crate) fn handler(&self) -> impl FnOnce() + 'static {
        let count = Rc::clone(&self.count);
        move || count.set(count.get().saturating_add(1))
    }

    pub(crate) fn count(&self) -> usize {
        self.count.get()
    }
}

/// Records whether a [`DropGuard`] created from it has been dropped.
#[derive(Debug, Default)]
pub(crate) struct DropFlag {
    dropped: Rc<Cell<bool>>,
}

impl DropFlag {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A guard to move into the handler (or other state) whose destruction we observe.
    pub(crate) fn guard(&self) -> DropGuard {
        DropGuard {
            dropped: Rc::clone(&self.dropped),
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        self.dropped.get()
    }
}

#[derive(Debug)]
pub(crate) struct DropGuard {
    dropped: Rc<Cell<bool>>,
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn watchdog_returns_result() {
        assert_eq!(with_watchdog(|| 2 + 2), 4);
    }

    #[test]
    fn counter_counts_invocations() {
        let counter = InvocationCounter::new();
        counter.handler()();
        counter.handler()();

        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn drop_flag_is_set_when_guard_drops() {
        let flag = DropFlag::new();
        let guard = flag.guard();
        assert!(!flag.is_set());

        drop(guard);
        assert!(flag.is_set());
    }
}
