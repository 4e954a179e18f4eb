//! The bounded in-memory event store.
//!
//! Wraps the ring buffer with a secondary index from trace id to that
//! trace's envelope and spans. The index is append-only for the lifetime of
//! the process: evicting an event from the ring does not prune it. That
//! asymmetry is deliberate for a latest-N-events tool; the index is an
//! advisory convenience, not an authoritative mirror of the buffer.

mod ring;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub use ring::RingBuffer;

use crate::model::Event;

/// Everything the store knows about one trace id.
#[derive(Debug, Clone, Default)]
pub struct TraceEntry {
    /// The trace envelope, if one has been ingested. A re-emitted envelope
    /// replaces the previous one.
    pub trace: Option<Arc<Event>>,
    /// Spans in arrival order.
    pub spans: Vec<Arc<Event>>,
}

#[derive(Debug)]
pub struct EventStore {
    inner: RwLock<Inner>,
}

#[derive(Debug)]
struct Inner {
    ring: RingBuffer<Arc<Event>>,
    traces: HashMap<String, TraceEntry>,
}

impl EventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                ring: RingBuffer::with_capacity(capacity),
                traces: HashMap::new(),
            }),
        }
    }

    /// Appends a validated event, evicting the oldest if the buffer is
    /// full, and updates the trace index. The store never mutates events.
    pub fn append(&self, event: Arc<Event>) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.ring.push(event.clone());

        let entry = inner
            .traces
            .entry(event.trace_id().to_string())
            .or_default();
        match event.as_ref() {
            Event::Trace(_) => entry.trace = Some(event),
            Event::Span(_) => entry.spans.push(event),
        }
    }

    /// All buffered events in arrival order.
    pub fn snapshot(&self) -> Vec<Arc<Event>> {
        self.inner.read().expect("store lock poisoned").ring.snapshot()
    }

    /// A consistent snapshot of one trace, if the index knows it.
    pub fn trace(&self, trace_id: &str) -> Option<TraceEntry> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .traces
            .get(trace_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("store lock poisoned").ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().expect("store lock poisoned").ring.capacity()
    }

    /// Truncates both the buffer and the trace index.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.ring.clear();
        inner.traces.clear();
    }
}
