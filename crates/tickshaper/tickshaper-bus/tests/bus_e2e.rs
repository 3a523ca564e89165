//! End-to-end bus test: a real subscriber connects over TCP and receives
//! every published tick as one JSON frame, fields in wire order.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tickshaper_bus::{BusPublisher, PublishQueue};
use tickshaper_events::{Side, Tick};

fn tick(tag: u64) -> Tick {
    Tick {
        timestamp_ns: tag,
        symbol_id: 3,
        price: 15_000,
        size: 500,
        side: Side::Buy,
        message_type: b'A',
    }
}

#[test]
fn subscriber_receives_published_ticks() {
    let queue = Arc::new(PublishQueue::new());
    let mut publisher =
        BusPublisher::bind("tcp://127.0.0.1:0", queue.clone()).expect("bind failed");
    let addr = publisher.local_addr();

    let (mut socket, _response) =
        tungstenite::connect(format!("ws://{addr}")).expect("subscriber connect failed");

    // Wait until the accept thread has registered the subscription; frames
    // published before that are simply not for us (best-effort pub/sub).
    let deadline = Instant::now() + Duration::from_secs(5);
    while publisher.subscriber_count() == 0 {
        assert!(Instant::now() < deadline, "subscriber never registered");
        std::thread::sleep(Duration::from_millis(5));
    }

    for i in 0..100u64 {
        publisher.publish(tick(i));
    }

    let mut received = Vec::new();
    while received.len() < 100 {
        assert!(Instant::now() < deadline, "timed out waiting for frames");
        match socket.read().expect("read frame") {
            tungstenite::Message::Text(frame) => {
                let parsed: Tick = serde_json::from_str(&frame).expect("frame parses");
                received.push(parsed);
            }
            _ => continue,
        }
    }

    // Per-publisher FIFO, field-by-field integrity.
    for (i, parsed) in received.iter().enumerate() {
        assert_eq!(*parsed, tick(i as u64));
    }
    assert!(queue.published_count() >= 100);

    publisher.stop();
}

#[test]
fn stop_flushes_backlog_then_exits() {
    let queue = Arc::new(PublishQueue::new());
    let mut publisher =
        BusPublisher::bind("tcp://127.0.0.1:0", queue.clone()).expect("bind failed");

    for i in 0..5_000u64 {
        publisher.publish(tick(i));
    }
    publisher.stop();

    // Every queued tick was put on the wire before the publisher exited.
    assert_eq!(queue.published_count(), 5_000);
    assert!(queue.is_empty());
}
