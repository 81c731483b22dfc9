// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus.
//!
//! Publishing never disrupts the publisher: synchronous handlers run on
//! the publishing thread with panics caught and logged, and async
//! subscribers sit behind bounded queues that drop events on overflow.

use kagan_core::DomainEvent;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Synchronous event handler.
pub type EventHandler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

/// Bounded queue capacity for async subscribers.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;

struct BusInner {
    handlers: Mutex<Vec<EventHandler>>,
    subscribers: Mutex<Vec<mpsc::Sender<DomainEvent>>>,
}

/// Fan-out event bus for domain events.
///
/// Events are not persisted or replayed; new subscribers only receive
/// future events.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Publish an event to all handlers and subscribers.
    pub fn publish(&self, event: DomainEvent) {
        tracing::debug!(event = %event.log_summary(), "publish");

        let handlers = self.inner.handlers.lock().clone();
        for handler in handlers {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
            if result.is_err() {
                tracing::warn!(event = %event.log_summary(), "event handler panicked");
            }
        }

        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(event = %event.log_summary(), "subscriber queue full, dropping");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Register a synchronous handler for all events.
    pub fn add_handler(&self, handler: EventHandler) {
        self.inner.handlers.lock().push(handler);
    }

    /// Subscribe to future events through a bounded queue.
    pub fn subscribe(&self) -> mpsc::Receiver<DomainEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.inner.subscribers.lock().push(tx);
        rx
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
