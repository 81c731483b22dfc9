// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kagan_core::TaskId;
use std::sync::atomic::{AtomicUsize, Ordering};

fn deleted(id: &str) -> DomainEvent {
    DomainEvent::TaskDeleted { task_id: TaskId::from_string(id) }
}

#[test]
fn handlers_observe_published_events() {
    let bus = EventBus::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    bus.add_handler(Arc::new(move |_event| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    bus.publish(deleted("aaaa0000"));
    bus.publish(deleted("bbbb1111"));
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[test]
fn panicking_handler_does_not_disrupt_publisher_or_other_handlers() {
    let bus = EventBus::new();
    let seen = Arc::new(AtomicUsize::new(0));
    bus.add_handler(Arc::new(|_event| {
        // A faulty handler must be isolated from the publisher.
        std::panic::panic_any("handler exploded");
    }));
    let counter = Arc::clone(&seen);
    bus.add_handler(Arc::new(move |_event| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    bus.publish(deleted("aaaa0000"));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn subscribers_receive_events_in_order() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();

    bus.publish(deleted("aaaa0000"));
    bus.publish(deleted("bbbb1111"));

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first, deleted("aaaa0000"));
    assert_eq!(second, deleted("bbbb1111"));
}

#[tokio::test]
async fn full_subscriber_queue_drops_instead_of_blocking() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();

    for i in 0..150 {
        bus.publish(deleted(&format!("{i:08x}")));
    }

    // The first 100 made it; the overflow was shed.
    let mut received = 0;
    while let Ok(event) = rx.try_recv() {
        drop(event);
        received += 1;
    }
    assert_eq!(received, 100);
}

#[tokio::test]
async fn dropped_subscriber_is_pruned() {
    let bus = EventBus::new();
    let rx = bus.subscribe();
    drop(rx);
    // Publishing to a closed queue must not error.
    bus.publish(deleted("aaaa0000"));
}
