//! Typed event streaming for run observability
//!
//! Every run fans events out through an [`EventBus`]: vertex lifecycle
//! transitions, LLM content and reasoning deltas, bracketed tool-call
//! events, progress from groups and loops, and a terminal [`EventKind::Done`].
//!
//! # Delivery model
//!
//! Each subscriber owns a bounded buffer (default 256 events).
//! [`EventBus::publish`] never blocks the producer: a full buffer drops the
//! event for that subscriber and counts it; once the buffer has drained
//! enough to accept again, the subscriber receives a single
//! [`EventKind::SubscriberLagged`] carrying the number of dropped events
//! before delivery resumes.
//!
//! Ordering is per-producer: events published from one vertex arrive at
//! each subscriber in publication order. Events from different vertices
//! interleave arbitrarily; there is no global total order.
//!
//! # Example
//!
//! ```rust
//! use flowgraph_core::event::{Event, EventBus, EventKind};
//! use uuid::Uuid;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut sub = bus.subscribe();
//!
//! let run_id = Uuid::new_v4();
//! bus.publish(Event::new(run_id, Some("llm".into()), EventKind::Message {
//!     text: "hel".into(),
//! }));
//! bus.close(run_id);
//!
//! let first = sub.recv().await.unwrap();
//! assert!(matches!(first.kind, EventKind::Message { .. }));
//! let done = sub.recv().await.unwrap();
//! assert!(matches!(done.kind, EventKind::Done));
//! assert!(sub.recv().await.is_none());
//! # }
//! ```

use crate::graph::VertexId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

/// Default per-subscriber buffer capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Which side of a tool invocation an event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallPhase {
    /// Emitted before the tool executor runs, carrying the arguments
    Start,
    /// Emitted after the executor returns, carrying result or error
    End,
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A vertex began executing
    VertexStarted,
    /// A vertex completed and stored its output
    VertexCompleted {
        /// The stored output value
        output: Value,
    },
    /// A vertex failed
    VertexFailed {
        /// Taxonomy tag (see [`FlowError::tag`](crate::error::FlowError::tag))
        tag: String,
        /// Human-readable description
        error: String,
    },
    /// Partial LLM content text
    Message {
        /// Content chunk
        text: String,
    },
    /// Partial LLM reasoning text
    Reasoning {
        /// Reasoning chunk
        text: String,
    },
    /// One side of a tool invocation
    ToolCall {
        /// Tool name
        tool_name: String,
        /// Start or end
        phase: ToolCallPhase,
        /// Arguments (start phase)
        #[serde(skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
        /// Result or error description (end phase)
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// Coarse progress from composite vertices
    Progress {
        /// Fraction complete, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        percent: Option<f32>,
        /// Named stage, e.g. `iteration 2`
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
    },
    /// Events were dropped for this subscriber while its buffer was full
    SubscriberLagged {
        /// How many events were dropped
        count: u64,
    },
    /// The run finished; the stream ends after this event
    Done,
}

/// A timestamped, tagged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The run that produced this event
    pub run_id: Uuid,
    /// Producing vertex, absent for run-level events
    pub vertex_id: Option<VertexId>,
    /// Payload
    pub kind: EventKind,
    /// Publication time
    pub ts: DateTime<Utc>,
}

impl Event {
    /// Build an event stamped with the current time.
    pub fn new(run_id: Uuid, vertex_id: Option<VertexId>, kind: EventKind) -> Self {
        Self {
            run_id,
            vertex_id,
            kind,
            ts: Utc::now(),
        }
    }
}

struct SubscriberSlot {
    tx: mpsc::Sender<Event>,
    lagged: AtomicU64,
}

struct BusInner {
    subscribers: RwLock<Vec<Arc<SubscriberSlot>>>,
    capacity: usize,
    closed: AtomicBool,
}

/// Fan-out hub for run events.
///
/// Cheap to clone; all clones publish into the same subscriber set. A bus
/// outlives the run it observes: nested subgraph runs publish into the
/// parent's bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus whose subscribers buffer `capacity` events each.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                capacity: capacity.max(2),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a new subscriber.
    ///
    /// Subscribers added after [`close`](Self::close) see an immediately
    /// ended stream.
    pub fn subscribe(&self) -> EventSubscriber {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        if !self.inner.closed.load(Ordering::Acquire) {
            self.inner.subscribers.write().push(Arc::new(SubscriberSlot {
                tx,
                lagged: AtomicU64::new(0),
            }));
        }
        EventSubscriber { rx }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Publish an event to every subscriber without blocking.
    ///
    /// A subscriber whose buffer is full loses this event; the loss is
    /// signalled with `SubscriberLagged` once its buffer drains.
    pub fn publish(&self, event: Event) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        let subscribers = self.inner.subscribers.read();
        for slot in subscribers.iter() {
            self.send_to(slot, event.clone());
        }
    }

    fn send_to(&self, slot: &SubscriberSlot, event: Event) {
        let pending_lag = slot.lagged.load(Ordering::Acquire);
        if pending_lag > 0 {
            let lag_event = Event::new(
                event.run_id,
                None,
                EventKind::SubscriberLagged { count: pending_lag },
            );
            match slot.tx.try_send(lag_event) {
                Ok(()) => {
                    slot.lagged.fetch_sub(pending_lag, Ordering::AcqRel);
                }
                Err(_) => {
                    // Still saturated; this event is dropped too.
                    slot.lagged.fetch_add(1, Ordering::AcqRel);
                    return;
                }
            }
        }
        if slot.tx.try_send(event).is_err() {
            slot.lagged.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Publish `Done` and end every subscriber stream.
    ///
    /// Outstanding buffered events are still delivered; the streams
    /// complete once drained. Publishing after close is a no-op.
    pub fn close(&self, run_id: Uuid) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let done = Event::new(run_id, None, EventKind::Done);
        let mut subscribers = self.inner.subscribers.write();
        for slot in subscribers.iter() {
            self.send_to(slot, done.clone());
        }
        // Dropping the senders lets receivers observe end-of-stream.
        subscribers.clear();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.capacity)
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving half of a subscription.
pub struct EventSubscriber {
    rx: mpsc::Receiver<Event>,
}

impl EventSubscriber {
    /// Receive the next event, or `None` once the bus is closed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Adapt into a `futures::Stream` of events.
    pub fn into_stream(self) -> ReceiverStream<Event> {
        ReceiverStream::new(self.rx)
    }

    /// Drain everything currently buffered plus the rest of the stream.
    pub async fn collect_all(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}

impl std::fmt::Debug for EventSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriber").finish_non_exhaustive()
    }
}
