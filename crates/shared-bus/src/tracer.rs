//! # Message Tracer
//!
//! Records one `MessageTrace` per emit and reconstructs cascades.
//!
//! ## Storage
//!
//! Records live in a bounded ring: insertion order in a `VecDeque`, lookup
//! by message id in a `HashMap`. Once `max_trace_size` is exceeded the oldest
//! record is evicted, O(1) per insert.
//!
//! ## Trace Trees
//!
//! A cascaded emit finishes (and is recorded) before the emit that caused it,
//! so children routinely precede their parents in the buffer. Tree
//! reconstruction therefore indexes every record of a trace first and links
//! parents to children in a second pass.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DEFAULT_MAX_TRACE_SIZE;

/// Fixed prefix of every generated message id.
pub const MESSAGE_ID_PREFIX: &str = "msg_";

/// Identifier of a single emitted message. Trace ids reuse the root's id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap an existing id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Outcome of delivering one message to one subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberResult {
    /// Optional subscriber id supplied at registration.
    pub subscriber_id: Option<String>,
    /// Whether the handler returned without error or panic.
    pub success: bool,
    /// Synchronous execution time of the handler.
    pub duration_ms: f64,
    /// Error or panic message when `success` is false.
    pub error: Option<String>,
}

/// Bookkeeping entry for one emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTrace {
    /// Recording sequence, assigned by the tracer.
    pub sequence: u64,
    pub message_id: MessageId,
    /// Root correlation id shared by a whole cascade.
    pub trace_id: MessageId,
    pub event: String,
    /// Actor that published the message.
    pub publisher_id: Option<String>,
    /// Per-subscriber outcomes in delivery order.
    pub subscribers: Vec<SubscriberResult>,
    pub total_execution_ms: f64,
    pub parent_message_id: Option<MessageId>,
    pub parent_trace_id: Option<MessageId>,
    /// Unix timestamp in milliseconds at emit time.
    pub timestamp_ms: u64,
}

impl MessageTrace {
    /// Number of subscribers that failed.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.subscribers.iter().filter(|r| !r.success).count()
    }

    /// Whether this message started its trace.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_message_id.is_none()
    }
}

/// A message and the messages it caused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceNode {
    pub trace: MessageTrace,
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    /// Total number of messages in this subtree.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(TraceNode::len).sum::<usize>()
    }

    /// Always false: a node contains at least itself.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Depth of the subtree (a leaf has depth 1).
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(TraceNode::depth).max().unwrap_or(0)
    }

    /// Find a message anywhere in this subtree.
    #[must_use]
    pub fn find(&self, message_id: &MessageId) -> Option<&TraceNode> {
        if &self.trace.message_id == message_id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(message_id))
    }
}

/// Aggregate statistics for one event name over the buffered records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventStats {
    pub event: String,
    pub count: usize,
    /// Messages with at least one failed subscriber.
    pub failures: usize,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Default)]
struct TraceBuffer {
    order: VecDeque<MessageId>,
    records: HashMap<MessageId, MessageTrace>,
}

/// Bounded recorder of message traces.
pub struct MessageTracer {
    buffer: Mutex<TraceBuffer>,
    max_trace_size: usize,
    next_sequence: AtomicU64,
}

impl MessageTracer {
    /// Create a tracer with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TRACE_SIZE)
    }

    /// Create a tracer holding at most `max_trace_size` records.
    #[must_use]
    pub fn with_capacity(max_trace_size: usize) -> Self {
        let max_trace_size = max_trace_size.max(1);
        Self {
            buffer: Mutex::new(TraceBuffer {
                order: VecDeque::with_capacity(max_trace_size.min(4096)),
                records: HashMap::new(),
            }),
            max_trace_size,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Generate a process-unique message id (`msg_<uuid>`).
    #[must_use]
    pub fn generate_message_id(&self) -> MessageId {
        MessageId(format!("{}{}", MESSAGE_ID_PREFIX, Uuid::new_v4().simple()))
    }

    /// Store a trace, evicting the oldest records beyond capacity.
    ///
    /// The tracer assigns `sequence`; any value set by the caller is replaced.
    /// Recording an id that is already buffered replaces that record in place.
    pub fn record_message(&self, mut trace: MessageTrace) {
        trace.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);

        let mut buffer = self.buffer();
        let id = trace.message_id.clone();
        if buffer.records.insert(id.clone(), trace).is_some() {
            return;
        }
        buffer.order.push_back(id);

        while buffer.order.len() > self.max_trace_size {
            if let Some(evicted) = buffer.order.pop_front() {
                buffer.records.remove(&evicted);
            }
        }
    }

    /// Look up one record.
    #[must_use]
    pub fn get_trace(&self, message_id: &MessageId) -> Option<MessageTrace> {
        self.buffer().records.get(message_id).cloned()
    }

    /// Rebuild the cascade rooted at `trace_id`.
    ///
    /// Returns the roots of the trace: normally exactly one, but records whose
    /// parent was evicted are returned as additional roots.
    #[must_use]
    pub fn get_trace_tree(&self, trace_id: &MessageId) -> Vec<TraceNode> {
        // Pass 1: index every record of this trace.
        let mut index: HashMap<MessageId, MessageTrace> = self
            .buffer()
            .records
            .values()
            .filter(|trace| &trace.trace_id == trace_id)
            .map(|trace| (trace.message_id.clone(), trace.clone()))
            .collect();

        // Pass 2: link children to parents.
        let mut children: HashMap<MessageId, Vec<(u64, MessageId)>> = HashMap::new();
        let mut roots: Vec<(u64, MessageId)> = Vec::new();
        for trace in index.values() {
            let entry = (trace.sequence, trace.message_id.clone());
            match &trace.parent_message_id {
                Some(parent) if index.contains_key(parent) && parent != &trace.message_id => {
                    children.entry(parent.clone()).or_default().push(entry);
                }
                _ => roots.push(entry),
            }
        }
        for siblings in children.values_mut() {
            siblings.sort();
        }
        roots.sort();

        roots
            .into_iter()
            .filter_map(|(_, id)| build_node(&id, &mut index, &children))
            .collect()
    }

    /// Aggregate count and duration for one event name.
    #[must_use]
    pub fn get_stats(&self, event: &str) -> EventStats {
        let buffer = self.buffer();
        let mut stats = EventStats {
            event: event.to_string(),
            ..EventStats::default()
        };
        let mut total = 0.0;

        for trace in buffer.records.values().filter(|t| t.event == event) {
            stats.count += 1;
            if trace.failure_count() > 0 {
                stats.failures += 1;
            }
            total += trace.total_execution_ms;
            stats.max_duration_ms = stats.max_duration_ms.max(trace.total_execution_ms);
        }

        if stats.count > 0 {
            stats.avg_duration_ms = total / stats.count as f64;
        }
        stats
    }

    /// Most recent records, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<MessageTrace> {
        let buffer = self.buffer();
        buffer
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| buffer.records.get(id).cloned())
            .collect()
    }

    /// Dump every buffered record, oldest first, as pretty JSON.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        let buffer = self.buffer();
        let traces: Vec<&MessageTrace> = buffer
            .order
            .iter()
            .filter_map(|id| buffer.records.get(id))
            .collect();
        serde_json::to_string_pretty(&traces)
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer().order.len()
    }

    /// Check if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ring capacity.
    #[must_use]
    pub fn max_trace_size(&self) -> usize {
        self.max_trace_size
    }

    /// Drop all records.
    pub fn clear(&self) {
        let mut buffer = self.buffer();
        buffer.order.clear();
        buffer.records.clear();
    }

    /// Current Unix time in milliseconds.
    pub(crate) fn current_timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn buffer(&self) -> MutexGuard<'_, TraceBuffer> {
        // Records are plain data; a panic mid-update cannot leave them torn.
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MessageTracer {
    fn default() -> Self {
        Self::new()
    }
}

fn build_node(
    id: &MessageId,
    index: &mut HashMap<MessageId, MessageTrace>,
    children: &HashMap<MessageId, Vec<(u64, MessageId)>>,
) -> Option<TraceNode> {
    let trace = index.remove(id)?;
    let kids = children
        .get(id)
        .map(|ids| {
            ids.iter()
                .filter_map(|(_, child)| build_node(child, index, children))
                .collect()
        })
        .unwrap_or_default();
    Some(TraceNode {
        trace,
        children: kids,
    })
}
