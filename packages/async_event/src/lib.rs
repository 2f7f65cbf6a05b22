#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! An asynchronous event that lets pending operations wait for a signal without blocking any
//! thread.
//!
//! [`AsyncEvent`] is the callback-based analogue of a condition variable. A waiter registers a
//! completion handler with [`AsyncEvent::async_wait()`]; a later [`AsyncEvent::notify_one()`] or
//! [`AsyncEvent::notify_all()`] releases waiters in the order they were registered, posting each
//! handler to its executor. Handlers run when the owner of that executor's
//! [`ExecutionContext`] drives it.
//!
//! Everything in this crate is single-threaded: no type is `Send` or `Sync`, nothing blocks and
//! nothing takes a lock.
//!
//! # Executor affinity
//!
//! A handler runs on the event's own executor unless it was bound to another one with
//! [`bind_executor()`], so one event can release waiters onto several run loops.
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use async_event::{AsyncEvent, ExecutionContext, bind_executor};
//!
//! let producer = ExecutionContext::builder().name("producer").build();
//! let consumer = ExecutionContext::builder().name("consumer").build();
//!
//! let event = AsyncEvent::new(producer.executor());
//! let consumed = Rc::new(Cell::new(false));
//!
//! let inner = Rc::clone(&consumed);
//! event.async_wait(bind_executor(consumer.executor(), move || inner.set(true)));
//!
//! assert_eq!(event.notify_one(), 1);
//!
//! // The handler was posted to the consumer, not to the producer.
//! assert_eq!(producer.run(), 0);
//! assert!(!consumed.get());
//!
//! assert_eq!(consumer.run(), 1);
//! assert!(consumed.get());
//! ```
//!
//! # Reference cycles
//!
//! A handler may own the very object that owns the event. The pending handlers are stored in the
//! event's execution context rather than in the event, so dropping the context drops them
//! (without invoking them) and whatever they own:
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use async_event::{AsyncEvent, ExecutionContext};
//!
//! struct Connection {
//!     readable: AsyncEvent,
//! }
//!
//! let context = ExecutionContext::new();
//! let connection = Rc::new(Connection {
//!     readable: AsyncEvent::new(context.executor()),
//! });
//! let weak = Rc::downgrade(&connection);
//!
//! let keep_alive = Rc::clone(&connection);
//! connection.readable.async_wait(move || drop(keep_alive));
//! drop(connection);
//!
//! // The only owner of the connection is the pending handler.
//! assert!(weak.upgrade().is_some());
//!
//! drop(context);
//! assert!(weak.upgrade().is_none());
//! ```

mod completion;
mod context;
mod context_builder;
mod error;
mod event;
mod executor;
mod service;
#[cfg(test)]
mod test_utils;
mod wait_service;

pub use completion::*;
pub use context::ExecutionContext;
pub(crate) use context::{ContextCore, Work};
pub use context_builder::*;
pub use error::Error;
pub use event::*;
pub use executor::*;
pub use service::Service;
pub(crate) use service::ServiceRegistry;
pub(crate) use wait_service::{EventId, WaitEntry, WaitService};
