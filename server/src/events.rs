//! Event fan-out over the socket gateway.
//!
//! Three addressing modes: global broadcast, per-user (a user may have
//! several tabs open), and acks bound to a single socket. Each socket owns
//! a bounded queue; a slow consumer loses its oldest entries and is told so
//! once via a `backpressure` event.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use uuid::Uuid;

use protocol::{ServerEvent, ServerFrame};

/// Outbound frames buffered per socket before the write loop drains them.
pub const SOCKET_QUEUE_CAPACITY: usize = 256;

/// How long a user may be fully disconnected before the leave event fires.
pub const PRESENCE_DEBOUNCE: Duration = Duration::from_secs(2);

struct QueueInner {
    frames: VecDeque<ServerFrame>,
    dropped: u64,
    backpressure_signalled: bool,
    closed: bool,
}

/// Bounded outbound queue for one socket. Overflow drops the oldest frame;
/// the first drop of an episode enqueues one `backpressure` notice, re-armed
/// when the client fully drains.
pub struct SocketQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
}

impl SocketQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::new(),
                dropped: 0,
                backpressure_signalled: false,
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    pub fn push(&self, frame: ServerFrame) {
        {
            let Ok(mut inner) = self.inner.lock() else {
                return;
            };
            if inner.closed {
                return;
            }

            if inner.frames.len() >= self.capacity {
                inner.frames.pop_front();
                inner.dropped += 1;

                if !inner.backpressure_signalled {
                    inner.backpressure_signalled = true;
                    let dropped = inner.dropped;
                    inner
                        .frames
                        .push_back(ServerFrame::Event(ServerEvent::Backpressure { dropped }));
                }
            }

            inner.frames.push_back(frame);
        }

        self.notify.notify_one();
    }

    /// Next frame in order; `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<ServerFrame> {
        loop {
            {
                let Ok(mut inner) = self.inner.lock() else {
                    return None;
                };

                if let Some(frame) = inner.frames.pop_front() {
                    if inner.frames.is_empty() {
                        // Episode over; the next overflow warns again.
                        inner.backpressure_signalled = false;
                        inner.dropped = 0;
                    }
                    return Some(frame);
                }

                if inner.closed {
                    return None;
                }
            }

            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
        }
        self.notify.notify_one();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.frames.len()).unwrap_or(0)
    }
}

struct SocketEntry {
    user_id: i64,
    queue: Arc<SocketQueue>,
}

struct PresenceEntry {
    username: String,
    generation: u64,
    pending_leave: bool,
}

#[derive(Clone)]
pub struct EventBus {
    sockets: Arc<DashMap<Uuid, SocketEntry>>,
    users: Arc<DashMap<i64, HashSet<Uuid>>>,
    presence: Arc<DashMap<i64, PresenceEntry>>,
    generation: Arc<AtomicU64>,
    debounce: Duration,
    queue_capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_tuning(PRESENCE_DEBOUNCE, SOCKET_QUEUE_CAPACITY)
    }

    pub fn with_tuning(debounce: Duration, queue_capacity: usize) -> Self {
        Self {
            sockets: Arc::new(DashMap::new()),
            users: Arc::new(DashMap::new()),
            presence: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(1)),
            debounce,
            queue_capacity,
        }
    }

    /// Registers a socket for the user and returns its outbound queue.
    pub fn register_socket(&self, socket_id: Uuid, user_id: i64) -> Arc<SocketQueue> {
        let queue = Arc::new(SocketQueue::new(self.queue_capacity));

        self.sockets.insert(
            socket_id,
            SocketEntry {
                user_id,
                queue: queue.clone(),
            },
        );
        self.users.entry(user_id).or_default().insert(socket_id);

        queue
    }

    pub fn unregister_socket(&self, socket_id: Uuid) {
        let Some((_, entry)) = self.sockets.remove(&socket_id) else {
            return;
        };
        entry.queue.close();

        if let Some(mut set) = self.users.get_mut(&entry.user_id) {
            set.remove(&socket_id);
        }
        self.users
            .remove_if(&entry.user_id, |_, set| set.is_empty());
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn user_socket_count(&self, user_id: i64) -> usize {
        self.users.get(&user_id).map(|set| set.len()).unwrap_or(0)
    }

    /// Delivers an event to every connected socket.
    pub fn broadcast_all(&self, event: ServerEvent) {
        let frame = ServerFrame::Event(event);
        for entry in self.sockets.iter() {
            entry.value().queue.push(frame.clone());
        }
    }

    /// Delivers an event to every socket owned by one user.
    pub fn send_to_user(&self, user_id: i64, event: ServerEvent) {
        let socket_ids: Vec<Uuid> = match self.users.get(&user_id) {
            Some(set) => set.iter().copied().collect(),
            None => return,
        };

        let frame = ServerFrame::Event(event);
        for socket_id in socket_ids {
            if let Some(entry) = self.sockets.get(&socket_id) {
                entry.value().queue.push(frame.clone());
            }
        }
    }

    /// Delivers an ack (or any frame) to one specific socket.
    pub fn send_to_socket(&self, socket_id: Uuid, frame: ServerFrame) {
        if let Some(entry) = self.sockets.get(&socket_id) {
            entry.value().queue.push(frame);
        }
    }

    /// Presence bookkeeping on socket attach. Emits `player:connected`
    /// unless the user was already present (extra tab, or a reconnect
    /// inside the debounce window).
    pub fn note_connected(&self, user_id: i64, username: &str) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let mut fresh_join = false;
        match self.presence.entry(user_id) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.generation = generation;
                entry.pending_leave = false;
                entry.username = username.to_string();
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(PresenceEntry {
                    username: username.to_string(),
                    generation,
                    pending_leave: false,
                });
                fresh_join = true;
            }
        }

        if fresh_join {
            self.broadcast_all(ServerEvent::PlayerConnected {
                user_id,
                username: username.to_string(),
            });
        }
    }

    /// Presence bookkeeping on socket detach. The leave event is debounced:
    /// it fires only if no replacement socket shows up within the window.
    pub fn note_disconnected(&self, user_id: i64) {
        if self.user_socket_count(user_id) > 0 {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        {
            let Some(mut entry) = self.presence.get_mut(&user_id) else {
                return;
            };
            entry.generation = generation;
            entry.pending_leave = true;
        }

        let bus = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(bus.debounce).await;

            let username = {
                let Some(entry) = bus.presence.get(&user_id) else {
                    return;
                };
                // A reconnect in the window bumped the generation.
                if !entry.pending_leave || entry.generation != generation {
                    return;
                }
                if bus.user_socket_count(user_id) > 0 {
                    return;
                }
                entry.username.clone()
            };

            bus.presence.remove(&user_id);
            bus.broadcast_all(ServerEvent::PlayerDisconnected { user_id, username });
        });
    }

    pub fn is_present(&self, user_id: i64) -> bool {
        self.presence.contains_key(&user_id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_bus() -> EventBus {
        EventBus::with_tuning(Duration::from_millis(50), 8)
    }

    fn step_event(index: usize) -> ServerEvent {
        ServerEvent::WalkerStep {
            user_id: 1,
            x: index as i32,
            y: 0,
            index,
        }
    }

    #[tokio::test]
    async fn broadcast_preserves_publish_order() {
        let bus = test_bus();
        let queue = bus.register_socket(Uuid::new_v4(), 1);

        for index in 0..5 {
            bus.broadcast_all(step_event(index));
        }

        for index in 0..5 {
            match queue.pop().await {
                Some(ServerFrame::Event(ServerEvent::WalkerStep { index: got, .. })) => {
                    assert_eq!(got, index)
                }
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn per_user_delivery_reaches_all_tabs_and_nobody_else() {
        let bus = test_bus();
        let tab_a = bus.register_socket(Uuid::new_v4(), 1);
        let tab_b = bus.register_socket(Uuid::new_v4(), 1);
        let stranger = bus.register_socket(Uuid::new_v4(), 2);

        bus.send_to_user(1, step_event(0));

        assert!(matches!(tab_a.pop().await, Some(ServerFrame::Event(_))));
        assert!(matches!(tab_b.pop().await, Some(ServerFrame::Event(_))));
        assert_eq!(stranger.len(), 0);
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_signals_backpressure_once() {
        let bus = test_bus();
        let queue = bus.register_socket(Uuid::new_v4(), 1);

        // Capacity is 8; push well past it without draining.
        for index in 0..20 {
            bus.broadcast_all(step_event(index));
        }

        let mut frames = Vec::new();
        while let Some(frame) = {
            let q = queue.clone();
            // Drain synchronously: everything is already buffered.
            let popped = tokio::time::timeout(Duration::from_millis(10), q.pop()).await;
            popped.ok().flatten()
        } {
            frames.push(frame);
        }

        let backpressure_count = frames
            .iter()
            .filter(|frame| {
                matches!(
                    frame,
                    ServerFrame::Event(ServerEvent::Backpressure { .. })
                )
            })
            .count();
        assert_eq!(backpressure_count, 1);

        // The newest event survived the overflow.
        assert!(frames.iter().any(|frame| matches!(
            frame,
            ServerFrame::Event(ServerEvent::WalkerStep { index: 19, .. })
        )));
        // The oldest did not.
        assert!(!frames.iter().any(|frame| matches!(
            frame,
            ServerFrame::Event(ServerEvent::WalkerStep { index: 0, .. })
        )));
    }

    #[tokio::test]
    async fn reconnect_inside_window_suppresses_presence_flicker() {
        let bus = test_bus();
        let observer = bus.register_socket(Uuid::new_v4(), 99);
        bus.note_connected(99, "observer");
        // Drain the observer's own join event.
        let _ = observer.pop().await;

        let first = Uuid::new_v4();
        bus.register_socket(first, 7);
        bus.note_connected(7, "wanderer");

        assert!(matches!(
            observer.pop().await,
            Some(ServerFrame::Event(ServerEvent::PlayerConnected { user_id: 7, .. }))
        ));

        // Drop and reconnect within the debounce window.
        bus.unregister_socket(first);
        bus.note_disconnected(7);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = Uuid::new_v4();
        bus.register_socket(second, 7);
        bus.note_connected(7, "wanderer");

        tokio::time::sleep(Duration::from_millis(120)).await;

        // Neither a second join nor any leave was observed.
        assert_eq!(observer.len(), 0);
        assert!(bus.is_present(7));
    }

    #[tokio::test]
    async fn leave_fires_after_window_and_next_join_is_fresh() {
        let bus = test_bus();
        let observer = bus.register_socket(Uuid::new_v4(), 99);
        bus.note_connected(99, "observer");
        let _ = observer.pop().await;

        let socket = Uuid::new_v4();
        bus.register_socket(socket, 7);
        bus.note_connected(7, "wanderer");
        let _ = observer.pop().await;

        bus.unregister_socket(socket);
        bus.note_disconnected(7);
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(matches!(
            observer.pop().await,
            Some(ServerFrame::Event(ServerEvent::PlayerDisconnected { user_id: 7, .. }))
        ));
        assert!(!bus.is_present(7));

        // A later reconnect announces itself again.
        bus.register_socket(Uuid::new_v4(), 7);
        bus.note_connected(7, "wanderer");
        assert!(matches!(
            observer.pop().await,
            Some(ServerFrame::Event(ServerEvent::PlayerConnected { user_id: 7, .. }))
        ));
    }

    #[tokio::test]
    async fn closed_queue_drains_then_ends() {
        let bus = test_bus();
        let socket = Uuid::new_v4();
        let queue = bus.register_socket(socket, 1);

        bus.broadcast_all(step_event(0));
        bus.unregister_socket(socket);

        assert!(matches!(queue.pop().await, Some(ServerFrame::Event(_))));
        assert!(queue.pop().await.is_none());
    }
}
