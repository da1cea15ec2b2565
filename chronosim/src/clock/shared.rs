//! State shared between whichever dispatch strategy (`spec.md` §4.2.2) is
//! driving a running [`VirtualClock`](super::VirtualClock): the event queue,
//! the published clock reading, the actor registry, and simulation-wide
//! counters. Kept in its own module so `actor::context` can borrow it without
//! creating a module cycle with `clock::mod`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};

use crate::error::{ChronosimError, Result};
use crate::message::BoxMessage;
use crate::message::MessageKind;
use crate::name::ActorName;
use crate::queue::EventQueue;
use crate::stats::{ActorStats, TraceSink};
use crate::time::{TearableVirtualTime, VirtualTime};
use crate::util::sync_cell::{SyncCell, SyncCellReader};

use super::feedback::FeedbackHandle;
use crate::actor::host::ActorHost;

/// `spec.md` §4.2.2: the two interchangeable dispatch models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Cooperative,
    Feedback,
}

/// A registered actor's dispatch handle, one variant per [`DispatchMode`].
#[derive(Clone)]
pub(crate) enum ActorRef {
    Cooperative(Arc<Mutex<ActorHost>>),
    Feedback(FeedbackHandle),
}

/// A registry entry: the dispatch handle plus a stats cell kept outside
/// `ActorHost` so the clock can record a "sent" event on the sender at
/// dispatch time without needing to touch the sender's own (possibly
/// thread-owned, under `Feedback`) `ActorHost`.
#[derive(Clone)]
pub(crate) struct RegisteredActor {
    pub actor_ref: ActorRef,
    pub stats: Arc<Mutex<ActorStats>>,
}

/// One scheduled, not-yet-dispatched send: the payload plus everything the
/// dispatcher needs to deliver it and record it (`spec.md` §4.3 send shapes,
/// §6 trace stream).
pub(crate) struct ScheduledDispatch {
    pub destination: ActorName,
    pub from: Option<ActorName>,
    pub kind: MessageKind,
    pub payload: BoxMessage,
    /// Set only for the internal wake-up marker [`super::sleep_until`]
    /// schedules for a sleeping actor (`spec.md` §6 "sleep"); never set for
    /// an ordinary send. Keyed into `ClockShared::sleep_waiters` rather than
    /// by `EventHandle`, since the handle is only known to the caller of
    /// `EventQueue::insert`, not to the item being inserted.
    pub sleep_wake: Option<u64>,
}

/// Fields every dispatch strategy needs. Lock order when more than one is
/// held: `queue` before `registry`.
pub(crate) struct ClockShared {
    pub time_reader: SyncCellReader<TearableVirtualTime>,
    /// The write half of the published clock reading. Held behind a lock
    /// (rather than requiring unique ownership, as a plain `&mut` would) so
    /// that both `VirtualClock::advance_to` and a sleeping actor's own
    /// recursive cooperative drain (`spec.md` §6 "sleep") can publish a new
    /// time without needing to route back through `VirtualClock` itself.
    pub time_writer: Mutex<SyncCell<TearableVirtualTime>>,
    pub queue: Mutex<EventQueue<ScheduledDispatch>>,
    pub registry: RwLock<HashMap<ActorName, RegisteredActor>>,
    pub mode: DispatchMode,
    pub dropped_to_unknown_target: AtomicU64,
    pub trace_sink: Arc<dyn TraceSink>,
    /// Pending `sleep(..)` wake-ups under `DispatchMode::Feedback`, keyed by
    /// a monotonic id independent of `EventHandle`. `DispatchMode::Cooperative`
    /// never populates this: its `sleep` recurses directly instead of
    /// scheduling a marker event (see `super::sleep_until`).
    pub sleep_waiters: Mutex<HashMap<u64, Sender<()>>>,
    pub next_sleep_id: AtomicU64,
    /// The same channel `VirtualClock::advance_feedback` counts
    /// acknowledgements on. Exposed here so a sleeping actor's own thread can
    /// hand itself a fresh [`super::feedback::EnvelopeAck`] to fire once its
    /// resumed reaction actually finishes, rather than when it merely wakes
    /// (`spec.md` §6 "sleep"). Unused under `DispatchMode::Cooperative`.
    pub ack_tx: Sender<()>,
}

impl ClockShared {
    pub fn now(&self) -> VirtualTime {
        self.time_reader.read()
    }

    /// Publishes a new current time. Called by whichever dispatch strategy
    /// (or a sleeping actor's recursive drain) just advanced the clock to a
    /// due deadline.
    pub fn publish(&self, time: VirtualTime) {
        self.time_writer.lock().write(time);
    }

    pub fn resolve(&self, name: &ActorName) -> Result<()> {
        if self.registry.read().contains_key(name) {
            Ok(())
        } else {
            Err(ChronosimError::UnknownTarget(name.clone()))
        }
    }

    /// Records a send whose target does not resolve to a registered actor.
    /// `spec.md` §4.4/§7: silently dropped, no stat increment on any actor,
    /// but counted simulation-wide for diagnostics.
    pub fn record_dropped(&self) {
        self.dropped_to_unknown_target.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_to_unknown_target.load(Ordering::Relaxed)
    }
}
