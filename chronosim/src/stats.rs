//! Per-actor statistics and the trace stream (`spec.md` §3 "Per-actor
//! stats", §6 "Trace stream").

use std::sync::Mutex;

use crate::message::{BoxMessage, MessageKind};
use crate::name::ActorName;
use crate::time::VirtualTime;

/// `spec.md` §3: `{ sent_count, received_count, sent_log, received_log }`.
/// Logging is opt-in (`ActorOpts::stats_enabled`, default `false`) to keep
/// the unstatted path allocation-free, per §4.3 "Statistics contract".
#[derive(Debug, Default)]
pub struct ActorStats {
    pub sent_count: u64,
    pub received_count: u64,
    pub failed_count: u64,
    pub sent_log: Vec<BoxMessage>,
    pub received_log: Vec<BoxMessage>,
    enabled: bool,
}

impl ActorStats {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    pub fn record_sent(&mut self, payload: &BoxMessage) {
        self.sent_count += 1;
        if self.enabled {
            self.sent_log.push(payload.clone());
        }
    }

    pub fn record_received(&mut self, payload: &BoxMessage) {
        self.received_count += 1;
        if self.enabled {
            self.received_log.push(payload.clone());
        }
    }

    pub fn record_failure(&mut self) {
        self.failed_count += 1;
    }
}

/// A snapshot suitable for `spec.md` §6's coordinator results schema.
/// `sent_log`/`received_log` mirror `ActorStats`' own logs (`spec.md` §3)
/// verbatim; they are empty unless `ActorOpts::stats_enabled` was set.
#[derive(Debug, Clone, Default)]
pub struct ActorStatsSnapshot {
    pub sent: u64,
    pub received: u64,
    pub failed: u64,
    pub sent_rate: f64,
    pub received_rate: f64,
    pub sent_log: Vec<BoxMessage>,
    pub received_log: Vec<BoxMessage>,
}

/// One entry of the optional trace stream (`spec.md` §3, §6).
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub timestamp: VirtualTime,
    pub from: Option<ActorName>,
    pub to: ActorName,
    pub payload: BoxMessage,
    pub kind: MessageKind,
}

/// A sink that trace events are appended to. `spec.md` explicitly scopes
/// report renderers out of the core; this trait is the interface boundary
/// they (or a test) would consume, per §6's "no wire protocol" note: the
/// stream is plain structured data, not a serialized format.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: TraceEvent);
}

/// A trace sink that discards everything; the default when tracing to a
/// collector is not configured.
#[derive(Debug, Default)]
pub struct NullTraceSink;

impl TraceSink for NullTraceSink {
    fn record(&self, _event: TraceEvent) {}
}

/// An in-memory trace sink, handed out by `chronosim-util`'s
/// `TraceRecorder` but defined here since the coordinator needs a concrete
/// default it can hand back from `get_trace()`.
#[derive(Debug, Default)]
pub struct VecTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl VecTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn snapshot(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl TraceSink for VecTraceSink {
    fn record(&self, event: TraceEvent) {
        self.events.lock().unwrap().push(event);
    }
}
