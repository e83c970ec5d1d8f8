//! Fan-out behavior across sockets: multi-tab delivery, reconnect
//! debounce, and slow-consumer handling.

use std::time::Duration;

use uuid::Uuid;

use protocol::{ServerEvent, ServerFrame};
use server::events::EventBus;

fn chat(entry_id: i64) -> ServerEvent {
    ServerEvent::ShoutboxMessage {
        entry_id,
        username: "caller".to_string(),
        message: "hello".to_string(),
        timestamp: 0,
    }
}

#[tokio::test]
async fn acks_reach_only_the_originating_socket() {
    let bus = EventBus::with_tuning(Duration::from_millis(50), 32);

    let tab_a = Uuid::new_v4();
    let tab_b = Uuid::new_v4();
    let queue_a = bus.register_socket(tab_a, 1);
    let queue_b = bus.register_socket(tab_b, 1);

    bus.send_to_socket(
        tab_a,
        ServerFrame::Ack(protocol::AckFrame::ok(42, None)),
    );
    bus.send_to_user(1, chat(1));

    // Tab A sees its ack first, then the shared event, in order.
    match queue_a.pop().await {
        Some(ServerFrame::Ack(ack)) => assert_eq!(ack.ack, 42),
        other => panic!("expected ack, got {other:?}"),
    }
    assert!(matches!(
        queue_a.pop().await,
        Some(ServerFrame::Event(ServerEvent::ShoutboxMessage { .. }))
    ));

    // Tab B never sees the ack.
    assert!(matches!(
        queue_b.pop().await,
        Some(ServerFrame::Event(ServerEvent::ShoutboxMessage { .. }))
    ));
}

#[tokio::test]
async fn broadcast_order_is_stable_across_sockets() {
    let bus = EventBus::with_tuning(Duration::from_millis(50), 256);
    let queues: Vec<_> = (0..4)
        .map(|user| bus.register_socket(Uuid::new_v4(), user))
        .collect();

    for entry_id in 0..50 {
        bus.broadcast_all(chat(entry_id));
    }

    for queue in queues {
        for expected in 0..50 {
            match queue.pop().await {
                Some(ServerFrame::Event(ServerEvent::ShoutboxMessage { entry_id, .. })) => {
                    assert_eq!(entry_id, expected)
                }
                other => panic!("expected shoutbox event, got {other:?}"),
            }
        }
    }
}

#[tokio::test]
async fn reconnect_within_two_seconds_emits_no_presence_events() {
    let bus = EventBus::with_tuning(Duration::from_millis(80), 32);

    let observer_queue = bus.register_socket(Uuid::new_v4(), 1);
    bus.note_connected(1, "observer");
    let _ = observer_queue.pop().await;

    // User 2 connects, drops, and reconnects inside the window.
    let first = Uuid::new_v4();
    bus.register_socket(first, 2);
    bus.note_connected(2, "wanderer");
    assert!(matches!(
        observer_queue.pop().await,
        Some(ServerFrame::Event(ServerEvent::PlayerConnected { user_id: 2, .. }))
    ));

    bus.unregister_socket(first);
    bus.note_disconnected(2);

    bus.register_socket(Uuid::new_v4(), 2);
    bus.note_connected(2, "wanderer");

    // Wait past the debounce window; nothing further must arrive.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let quiet = tokio::time::timeout(Duration::from_millis(50), observer_queue.pop()).await;
    assert!(quiet.is_err(), "unexpected presence event: {quiet:?}");
}

#[tokio::test]
async fn disconnect_past_the_window_emits_leave_then_fresh_join() {
    let bus = EventBus::with_tuning(Duration::from_millis(80), 32);

    let observer_queue = bus.register_socket(Uuid::new_v4(), 1);
    bus.note_connected(1, "observer");
    let _ = observer_queue.pop().await;

    let socket = Uuid::new_v4();
    bus.register_socket(socket, 2);
    bus.note_connected(2, "wanderer");
    let _ = observer_queue.pop().await;

    bus.unregister_socket(socket);
    bus.note_disconnected(2);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(matches!(
        observer_queue.pop().await,
        Some(ServerFrame::Event(ServerEvent::PlayerDisconnected { user_id: 2, .. }))
    ));

    bus.register_socket(Uuid::new_v4(), 2);
    bus.note_connected(2, "wanderer");
    assert!(matches!(
        observer_queue.pop().await,
        Some(ServerFrame::Event(ServerEvent::PlayerConnected { user_id: 2, .. }))
    ));
}

#[tokio::test]
async fn slow_consumer_keeps_newest_events_and_one_backpressure_notice() {
    let bus = EventBus::with_tuning(Duration::from_millis(50), 16);
    let queue = bus.register_socket(Uuid::new_v4(), 1);

    for entry_id in 0..100 {
        bus.broadcast_all(chat(entry_id));
    }

    let mut got = Vec::new();
    while let Ok(Some(frame)) =
        tokio::time::timeout(Duration::from_millis(10), queue.pop()).await
    {
        got.push(frame);
    }

    let backpressure = got
        .iter()
        .filter(|frame| matches!(frame, ServerFrame::Event(ServerEvent::Backpressure { .. })))
        .count();
    assert_eq!(backpressure, 1);

    let newest_survives = got.iter().any(|frame| {
        matches!(
            frame,
            ServerFrame::Event(ServerEvent::ShoutboxMessage { entry_id: 99, .. })
        )
    });
    assert!(newest_survives);

    assert!(got.len() <= 17);
}
