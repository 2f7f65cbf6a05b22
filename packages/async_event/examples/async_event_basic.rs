//! Basic example of releasing waiters of an async event onto two different execution contexts.
//!
//! A producer context owns the event. One waiter runs on the producer itself, the other is
//! bound to a consumer context and only runs when the consumer is driven.

use std::cell::RefCell;
use std::rc::Rc;

use async_event::{AsyncEvent, ExecutionContext, bind_executor};

fn main() {
    println!("=== Async Event Basic Example ===");

    let producer = ExecutionContext::builder().name("producer").build();
    let consumer = ExecutionContext::builder().name("consumer").build();

    let event = AsyncEvent::new(producer.executor());
    let log = Rc::new(RefCell::new(Vec::new()));

    let producer_log = Rc::clone(&log);
    event.async_wait(move || producer_log.borrow_mut().push("producer waiter"));

    let consumer_log = Rc::clone(&log);
    event.async_wait(bind_executor(consumer.executor(), move || {
        consumer_log.borrow_mut().push("consumer waiter");
    }));

    println!("Pending waiters: {}", event.pending());

    let released = event.notify_all();
    println!("Released {released} waiters; nothing has run yet: {:?}", log.borrow());

    let ran = producer.run();
    println!("Producer ran {ran} handler(s): {:?}", log.borrow());

    let ran = consumer.run();
    println!("Consumer ran {ran} handler(s): {:?}", log.borrow());

    println!("Example completed successfully!");
}
