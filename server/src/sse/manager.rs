use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::filter::EventFilter;
use super::subscription::Subscription;
use crate::model::Event;

/// How often the ticker scans for idle subscriptions, and the idle gap
/// that triggers a heartbeat comment.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// The SSE connection manager: a registry of live subscriptions, fan-out
/// of ingested events into their queues, and the heartbeat ticker.
///
/// Constructed once at startup and passed through the request-handler
/// context; cheap to clone.
#[derive(Debug, Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    subs: RwLock<HashMap<u64, Arc<Subscription>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    shutdown: CancellationToken,
}

impl Manager {
    /// Creates the manager and spawns its heartbeat ticker. Must be called
    /// from within a tokio runtime.
    pub fn new(queue_capacity: usize) -> Self {
        let inner = Arc::new(Inner {
            subs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity,
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(heartbeat_loop(inner.clone()));
        Self { inner }
    }

    /// Registers a new subscription whose frames are delivered into `sink`,
    /// and spawns its writer task. The first frame on every subscription is
    /// the `connected` control frame; no stored events are replayed.
    pub fn subscribe(&self, filter: EventFilter, sink: mpsc::Sender<Bytes>) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Arc::new(Subscription::new(
            id,
            filter,
            self.inner.queue_capacity,
            self.inner.shutdown.child_token(),
        ));
        sub.enqueue_control(connected_payload());

        self.inner
            .subs
            .write()
            .expect("subscription registry poisoned")
            .insert(id, sub.clone());
        tokio::spawn(write_loop(self.inner.clone(), sub, sink));

        log::debug!(subscription = id; "stream subscriber connected");
        id
    }

    /// Fans an event out to every matching subscription. Serializes once;
    /// delivery is enqueue-or-drop-oldest per subscriber, so a slow
    /// consumer never blocks ingest or its peers.
    pub fn broadcast(&self, event: &Event) {
        let payload = match serde_json::to_vec(event) {
            Ok(json) => Bytes::from(json),
            Err(err) => {
                log::error!("failed to serialize event for broadcast: {err}");
                return;
            }
        };

        let targets: Vec<Arc<Subscription>> = {
            let subs = self
                .inner
                .subs
                .read()
                .expect("subscription registry poisoned");
            subs.values().cloned().collect()
        };
        for sub in targets {
            if sub.filter().matches(event) {
                sub.enqueue_event(payload.clone());
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subs
            .read()
            .expect("subscription registry poisoned")
            .len()
    }

    /// Closes every subscription and stops the heartbeat ticker. Used on
    /// server shutdown so clients are disconnected promptly.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

fn connected_payload() -> Bytes {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    Bytes::from(format!(r#"{{"type":"connected","timestamp":"{now}"}}"#))
}

fn remove(inner: &Inner, id: u64) {
    inner
        .subs
        .write()
        .expect("subscription registry poisoned")
        .remove(&id);
    log::debug!(subscription = id; "stream subscriber removed");
}

/// Drains one subscription's queue into its sink until the client goes
/// away or the manager shuts down. The send suspends on a slow client;
/// that backpressure stays local to this task while broadcast keeps
/// filling (and bounding) the queue.
async fn write_loop(inner: Arc<Inner>, sub: Arc<Subscription>, sink: mpsc::Sender<Bytes>) {
    loop {
        while let Some(frame) = sub.pop_frame() {
            // The send parks on a stalled client, so shutdown must be able
            // to interrupt it.
            let sent = tokio::select! {
                res = sink.send(frame.render()) => res.is_ok(),
                _ = sub.cancel_token().cancelled() => false,
            };
            if !sent {
                log::debug!(subscription = sub.id(); "stream sink closed");
                remove(&inner, sub.id());
                return;
            }
            sub.mark_write();
        }

        tokio::select! {
            _ = sub.notified() => {}
            _ = sub.cancel_token().cancelled() => {
                remove(&inner, sub.id());
                return;
            }
        }
    }
}

/// Scans the registry every 15 s and queues a heartbeat comment into any
/// subscription that has not been written to for a full interval. The scan
/// walks a snapshot, so concurrent removals are fine.
async fn heartbeat_loop(inner: Arc<Inner>) {
    let mut tick = tokio::time::interval(HEARTBEAT_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = inner.shutdown.cancelled() => return,
        }

        let targets: Vec<Arc<Subscription>> = {
            let subs = inner.subs.read().expect("subscription registry poisoned");
            subs.values().cloned().collect()
        };
        for sub in targets {
            if sub.idle_for() >= HEARTBEAT_INTERVAL {
                sub.enqueue_heartbeat();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::model::{SpanEvent, TraceEvent};
    use crate::sse::subscription::{BACKPRESSURE_COMMENT, HEARTBEAT_COMMENT};

    fn span(trace_id: &str, span_id: &str, kind: Option<&str>) -> Event {
        Event::Span(SpanEvent {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            parent_id: None,
            kind: kind.map(str::to_string),
            name: None,
            started_at: None,
            ended_at: None,
            data: None,
            status: None,
        })
    }

    fn trace(trace_id: &str) -> Event {
        Event::Trace(TraceEvent {
            trace_id: trace_id.to_string(),
            name: None,
            group_id: None,
            started_at: None,
            ended_at: None,
            metadata: None,
        })
    }

    fn data_frame(event: &Event) -> Bytes {
        let json = serde_json::to_vec(event).expect("serialize event");
        let mut out = b"data: ".to_vec();
        out.extend_from_slice(&json);
        out.extend_from_slice(b"\n\n");
        Bytes::from(out)
    }

    async fn recv(rx: &mut mpsc::Receiver<Bytes>) -> Bytes {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("stream closed unexpectedly")
    }

    #[tokio::test]
    async fn first_frame_is_connected_and_events_follow_in_order() {
        let manager = Manager::new(16);
        let (tx, mut rx) = mpsc::channel(8);
        manager.subscribe(EventFilter::default(), tx);

        let first = recv(&mut rx).await;
        assert!(first.starts_with(b"data: {\"type\":\"connected\""));

        let a = span("t1", "s1", None);
        let b = span("t1", "s2", None);
        manager.broadcast(&a);
        manager.broadcast(&b);

        assert_eq!(recv(&mut rx).await, data_frame(&a));
        assert_eq!(recv(&mut rx).await, data_frame(&b));
    }

    #[tokio::test]
    async fn rejected_events_are_never_enqueued() {
        let manager = Manager::new(16);
        let (tx, mut rx) = mpsc::channel(8);
        manager.subscribe(
            EventFilter {
                trace_id: Some("t1".to_string()),
                ..Default::default()
            },
            tx,
        );
        let _connected = recv(&mut rx).await;

        manager.broadcast(&span("t2", "other", None));
        let matching = span("t1", "mine", None);
        manager.broadcast(&matching);

        // The first frame after `connected` is the matching event; the
        // rejected one was skipped entirely, not queued behind it.
        assert_eq!(recv(&mut rx).await, data_frame(&matching));
    }

    #[tokio::test]
    async fn subscribers_see_independent_filtered_views() {
        let manager = Manager::new(16);
        let (tx_all, mut rx_all) = mpsc::channel(16);
        let (tx_t4, mut rx_t4) = mpsc::channel(16);
        manager.subscribe(EventFilter::default(), tx_all);
        manager.subscribe(
            EventFilter {
                trace_id: Some("t4".to_string()),
                ..Default::default()
            },
            tx_t4,
        );
        let _ = recv(&mut rx_all).await;
        let _ = recv(&mut rx_t4).await;

        let events = [
            trace("t4"),
            span("t5", "a", None),
            span("t4", "b", None),
            span("t5", "c", None),
            span("t4", "d", None),
        ];
        for event in &events {
            manager.broadcast(event);
        }

        for event in &events {
            assert_eq!(recv(&mut rx_all).await, data_frame(event));
        }
        for event in [&events[0], &events[2], &events[4]] {
            assert_eq!(recv(&mut rx_t4).await, data_frame(event));
        }
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest_and_warns() {
        let manager = Manager::new(2);
        // A sink with no buffer to spare: the writer task parks on the
        // first event while the queue absorbs the rest.
        let (tx, mut rx) = mpsc::channel(1);
        manager.subscribe(EventFilter::default(), tx);

        let events: Vec<Event> = (1..=5).map(|i| span("t", &format!("s{i}"), None)).collect();
        for event in &events {
            manager.broadcast(event);
        }

        // connected fills the sink; e1 and e2 queue up; e3..e5 push the
        // two oldest out in favor of one coalesced warning.
        let first = recv(&mut rx).await;
        assert!(first.starts_with(b"data: {\"type\":\"connected\""));
        assert_eq!(recv(&mut rx).await, Bytes::from_static(BACKPRESSURE_COMMENT.as_bytes()));
        assert_eq!(recv(&mut rx).await, data_frame(&events[3]));
        assert_eq!(recv(&mut rx).await, data_frame(&events[4]));
    }

    #[tokio::test]
    async fn kind_filter_applies_to_spans_only() {
        let manager = Manager::new(16);
        let (tx, mut rx) = mpsc::channel(8);
        manager.subscribe(
            EventFilter {
                kinds: Some(HashSet::from(["agent".to_string()])),
                ..Default::default()
            },
            tx,
        );
        let _ = recv(&mut rx).await;

        manager.broadcast(&span("t1", "skipped", Some("generation")));
        let envelope = trace("t1");
        let agent_span = span("t1", "kept", Some("agent"));
        manager.broadcast(&envelope);
        manager.broadcast(&agent_span);

        assert_eq!(recv(&mut rx).await, data_frame(&envelope));
        assert_eq!(recv(&mut rx).await, data_frame(&agent_span));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_subscriber_gets_heartbeats() {
        let manager = Manager::new(16);
        let (tx, mut rx) = mpsc::channel(8);
        manager.subscribe(EventFilter::default(), tx);
        let _connected = recv(&mut rx).await;

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(
            recv(&mut rx).await,
            Bytes::from_static(HEARTBEAT_COMMENT.as_bytes())
        );

        // And again a tick later, with no event traffic in between.
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(
            recv(&mut rx).await,
            Bytes::from_static(HEARTBEAT_COMMENT.as_bytes())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn active_subscriber_gets_no_heartbeat() {
        let manager = Manager::new(16);
        let (tx, mut rx) = mpsc::channel(8);
        manager.subscribe(EventFilter::default(), tx);
        let _connected = recv(&mut rx).await;

        // Keep traffic flowing every 10 s; no heartbeat should interleave.
        for i in 0..3 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let event = span("t", &format!("s{i}"), None);
            manager.broadcast(&event);
            assert_eq!(recv(&mut rx).await, data_frame(&event));
        }
    }

    #[tokio::test]
    async fn dropped_client_is_deregistered() {
        let manager = Manager::new(16);
        let (tx, rx) = mpsc::channel(8);
        manager.subscribe(EventFilter::default(), tx);
        drop(rx);

        // The writer notices on its next send attempt.
        manager.broadcast(&span("t", "s", None));
        for _ in 0..100 {
            if manager.subscriber_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("subscriber was not deregistered");
    }

    #[tokio::test]
    async fn shutdown_closes_subscribers() {
        let manager = Manager::new(16);
        let (tx, mut rx) = mpsc::channel(8);
        manager.subscribe(EventFilter::default(), tx);
        let _connected = recv(&mut rx).await;

        manager.shutdown();
        let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for close");
        assert!(closed.is_none());
        for _ in 0..100 {
            if manager.subscriber_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry was not emptied on shutdown");
    }
}
