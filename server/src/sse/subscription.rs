use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::filter::EventFilter;

/// Emitted in place of dropped events when a subscriber falls behind.
/// The text is load-bearing: log scrapers match it byte-for-byte.
pub const BACKPRESSURE_COMMENT: &str = ":warning stream backpressure; events skipped\n\n";

pub const HEARTBEAT_COMMENT: &str = ": heartbeat\n\n";

/// A single SSE frame waiting to be written to a subscriber.
#[derive(Debug)]
pub(super) enum Frame {
    /// An ingested event, pre-serialized to compact JSON. Only these count
    /// toward the queue capacity and only these are dropped under
    /// backpressure.
    Event(Bytes),
    /// A control payload (the initial `connected` frame).
    Control(Bytes),
    Heartbeat,
    Backpressure,
}

impl Frame {
    pub(super) fn render(&self) -> Bytes {
        match self {
            // Compact JSON never contains a raw newline (serde_json escapes
            // them inside strings), so a single `data:` line is always valid.
            Frame::Event(payload) | Frame::Control(payload) => {
                let mut out = BytesMut::with_capacity(payload.len() + 8);
                out.extend_from_slice(b"data: ");
                out.extend_from_slice(payload);
                out.extend_from_slice(b"\n\n");
                out.freeze()
            }
            Frame::Heartbeat => Bytes::from_static(HEARTBEAT_COMMENT.as_bytes()),
            Frame::Backpressure => Bytes::from_static(BACKPRESSURE_COMMENT.as_bytes()),
        }
    }
}

/// One live SSE client registration: its filter and its bounded queue of
/// pending frames. The writer side lives in the manager's per-subscription
/// task; termination is signalled through the cancellation token.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    filter: EventFilter,
    queue: Mutex<FrameQueue>,
    notify: Notify,
    cancel: CancellationToken,
    last_write: Mutex<Instant>,
}

#[derive(Debug)]
struct FrameQueue {
    frames: VecDeque<Frame>,
    queued_events: usize,
    capacity: usize,
}

impl Subscription {
    pub(super) fn new(id: u64, filter: EventFilter, capacity: usize, cancel: CancellationToken) -> Self {
        Self {
            id,
            filter,
            queue: Mutex::new(FrameQueue {
                frames: VecDeque::new(),
                queued_events: 0,
                capacity,
            }),
            notify: Notify::new(),
            cancel,
            last_write: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(super) fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Enqueues an event for delivery. If the queue already holds its
    /// capacity in events, the oldest queued event is dropped and a
    /// backpressure comment takes its place; ingest is never blocked.
    pub(super) fn enqueue_event(&self, payload: Bytes) {
        let mut q = self.queue.lock().expect("subscription queue poisoned");
        if q.queued_events >= q.capacity {
            if let Some(idx) = q.frames.iter().position(|f| matches!(f, Frame::Event(_))) {
                q.frames.remove(idx);
                q.queued_events -= 1;

                // Consecutive drops coalesce into one comment so a reader
                // that never drains cannot grow the queue through warnings.
                let already_warned = (idx > 0
                    && matches!(q.frames.get(idx - 1), Some(Frame::Backpressure)))
                    || matches!(q.frames.get(idx), Some(Frame::Backpressure));
                if !already_warned {
                    q.frames.insert(idx, Frame::Backpressure);
                }
            }
        }
        q.frames.push_back(Frame::Event(payload));
        q.queued_events += 1;
        drop(q);
        self.notify.notify_one();
    }

    pub(super) fn enqueue_control(&self, payload: Bytes) {
        let mut q = self.queue.lock().expect("subscription queue poisoned");
        q.frames.push_back(Frame::Control(payload));
        drop(q);
        self.notify.notify_one();
    }

    pub(super) fn enqueue_heartbeat(&self) {
        let mut q = self.queue.lock().expect("subscription queue poisoned");
        // A heartbeat already waiting at the tail keeps the connection
        // alive just as well; a stalled reader must not accumulate more.
        if !matches!(q.frames.back(), Some(Frame::Heartbeat)) {
            q.frames.push_back(Frame::Heartbeat);
        }
        drop(q);
        self.notify.notify_one();
    }

    pub(super) fn pop_frame(&self) -> Option<Frame> {
        let mut q = self.queue.lock().expect("subscription queue poisoned");
        let frame = q.frames.pop_front();
        if matches!(frame, Some(Frame::Event(_))) {
            q.queued_events -= 1;
        }
        frame
    }

    #[cfg(test)]
    pub(super) fn queued_events(&self) -> usize {
        self.queue
            .lock()
            .expect("subscription queue poisoned")
            .queued_events
    }

    pub(super) async fn notified(&self) {
        self.notify.notified().await;
    }

    pub(super) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(super) fn mark_write(&self) {
        *self.last_write.lock().expect("subscription clock poisoned") = Instant::now();
    }

    pub(super) fn idle_for(&self) -> tokio::time::Duration {
        self.last_write
            .lock()
            .expect("subscription clock poisoned")
            .elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(capacity: usize) -> Subscription {
        Subscription::new(1, EventFilter::default(), capacity, CancellationToken::new())
    }

    fn payload(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn queue_never_exceeds_capacity() {
        let sub = subscription(3);
        for i in 0..10 {
            sub.enqueue_event(payload(&format!("e{i}")));
            assert!(sub.queued_events() <= 3);
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_warns_once_per_gap() {
        let sub = subscription(2);
        sub.enqueue_control(payload("connected"));
        for i in 1..=4 {
            sub.enqueue_event(payload(&format!("e{i}")));
        }

        // The control frame survives; e1 and e2 were dropped in favor of a
        // single coalesced backpressure comment.
        assert!(matches!(sub.pop_frame(), Some(Frame::Control(_))));
        assert!(matches!(sub.pop_frame(), Some(Frame::Backpressure)));
        assert!(matches!(sub.pop_frame(), Some(Frame::Event(p)) if p == payload("e3")));
        assert!(matches!(sub.pop_frame(), Some(Frame::Event(p)) if p == payload("e4")));
        assert!(sub.pop_frame().is_none());
    }

    #[tokio::test]
    async fn heartbeats_do_not_accumulate() {
        let sub = subscription(2);
        sub.enqueue_heartbeat();
        sub.enqueue_heartbeat();
        sub.enqueue_heartbeat();

        assert!(matches!(sub.pop_frame(), Some(Frame::Heartbeat)));
        assert!(sub.pop_frame().is_none());
    }

    #[test]
    fn frames_render_as_sse() {
        assert_eq!(
            Frame::Event(payload("{\"a\":1}")).render(),
            Bytes::from_static(b"data: {\"a\":1}\n\n")
        );
        assert_eq!(
            Frame::Heartbeat.render(),
            Bytes::from_static(b": heartbeat\n\n")
        );
        assert_eq!(
            Frame::Backpressure.render(),
            Bytes::from_static(b":warning stream backpressure; events skipped\n\n")
        );
    }
}
