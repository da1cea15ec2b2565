//! The virtual clock: the event queue, the published time, and the two
//! interchangeable dispatch strategies (`spec.md` §4.2).

pub(crate) mod feedback;
pub(crate) mod shared;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::actor::host::{ActorHost, ActorOpts, Behavior};
use crate::error::{ChronosimError, Result};
use crate::message::{message, BoxMessage, MessageKind};
use crate::name::ActorName;
use crate::queue::{EventHandle, EventQueue};
use crate::stats::{ActorStats, ActorStatsSnapshot, TraceSink};
use crate::time::{TearableVirtualTime, TickDuration, VirtualTime};
use crate::util::sync_cell::SyncCell;

pub(crate) use feedback::EnvelopeAck;
use feedback::{spawn_feedback_actor, FeedbackEnvelope};
pub use shared::DispatchMode;
pub(crate) use shared::{ActorRef, ClockShared, RegisteredActor, ScheduledDispatch};

/// The number of same-timestamp re-passes `advance` will take under
/// `DispatchMode::Cooperative` before concluding the simulation has reached
/// quiescence at that instant (`spec.md` §4.2.3, §9 open question). A
/// well-behaved actor graph converges in a handful of passes; this bound
/// exists only to turn a genuinely divergent zero-delay feedback loop into a
/// diagnosable error instead of a hang.
const COOPERATIVE_PATIENCE_CYCLES: usize = 10_000;

/// The outcome of [`ActorContext::call`](crate::actor::ActorContext::call).
#[derive(Debug, Clone)]
pub enum CallReply {
    /// The callee replied.
    Reply(BoxMessage),
    /// The callee processed the call but produced no reply.
    NoReply,
    /// No actor is registered under the target name.
    UnknownTarget,
    /// No reply arrived within the wall-clock timeout. This also covers a
    /// `DispatchMode::Cooperative` call that loops back to an actor already
    /// being dispatched on the same stack, which cannot be serviced
    /// in-line.
    Timeout,
}

/// The virtual clock: owns the event queue, the actor registry, and whichever
/// dispatch strategy is configured. `spec.md` §4.2's single point of
/// authority over "now".
pub struct VirtualClock {
    shared: Arc<ClockShared>,
    stopped: std::sync::atomic::AtomicBool,
    advancing: std::sync::atomic::AtomicBool,
    ack_tx: crossbeam_channel::Sender<()>,
    ack_rx: crossbeam_channel::Receiver<()>,
    default_mailbox_capacity: usize,
}

impl VirtualClock {
    pub fn new(mode: DispatchMode, trace_sink: Arc<dyn TraceSink>, default_mailbox_capacity: usize) -> Self {
        let time = SyncCell::<TearableVirtualTime>::new(VirtualTime::EPOCH);
        let time_reader = time.reader();
        let (ack_tx, ack_rx) = bounded(0);

        let shared = Arc::new(ClockShared {
            time_reader,
            time_writer: Mutex::new(time),
            queue: Mutex::new(EventQueue::new()),
            registry: RwLock::new(HashMap::new()),
            mode,
            dropped_to_unknown_target: AtomicU64::new(0),
            trace_sink,
            sleep_waiters: Mutex::new(HashMap::new()),
            next_sleep_id: AtomicU64::new(0),
            ack_tx: ack_tx.clone(),
        });

        Self {
            shared,
            stopped: std::sync::atomic::AtomicBool::new(false),
            advancing: std::sync::atomic::AtomicBool::new(false),
            ack_tx,
            ack_rx,
            default_mailbox_capacity,
        }
    }

    pub fn now(&self) -> VirtualTime {
        self.shared.now()
    }

    pub fn mode(&self) -> DispatchMode {
        self.shared.mode
    }

    pub fn dropped_to_unknown_target(&self) -> u64 {
        self.shared.dropped_count()
    }

    /// Registers a new actor under `name`. `spec.md` §4.4/§7:
    /// [`ChronosimError::DuplicateActor`] if the name is already taken.
    pub fn register(
        &self,
        name: impl Into<ActorName>,
        behavior: Box<dyn Behavior>,
        opts: ActorOpts,
    ) -> Result<()> {
        let name = name.into();
        let mut registry = self.shared.registry.write();
        if registry.contains_key(&name) {
            return Err(ChronosimError::DuplicateActor(name));
        }

        let stats = Arc::new(Mutex::new(ActorStats::new(opts.stats_enabled)));
        let host = ActorHost::new(
            name.clone(),
            behavior,
            &opts,
            Arc::clone(&stats),
            Arc::clone(&self.shared.trace_sink),
        );

        let actor_ref = match self.shared.mode {
            DispatchMode::Cooperative => ActorRef::Cooperative(Arc::new(Mutex::new(host))),
            DispatchMode::Feedback => {
                let capacity = if opts.mailbox_capacity == ActorOpts::default().mailbox_capacity {
                    self.default_mailbox_capacity
                } else {
                    opts.mailbox_capacity
                };
                let handle = spawn_feedback_actor(
                    Arc::clone(&self.shared),
                    name.clone(),
                    host,
                    self.ack_tx.clone(),
                    capacity,
                );
                ActorRef::Feedback(handle)
            }
        };

        registry.insert(name, RegisteredActor { actor_ref, stats });
        Ok(())
    }

    /// Runs `on_start` for every registered actor. Called once by
    /// [`SimulationBuilder::build`] after every pending actor has been
    /// registered, so a pattern-driven actor's first self-scheduled tick
    /// (`spec.md` §4.4) is seeded before `advance` is ever called, rather
    /// than waiting on a first inbound message that may never come, and so
    /// that no actor's `on_start` can race the registration loop that may
    /// still be spawning later actors under `DispatchMode::Feedback`.
    pub(crate) fn start_all(&self) {
        let (cooperative, feedback): (Vec<_>, Vec<_>) = {
            let registry = self.shared.registry.read();
            let mut cooperative = Vec::new();
            let mut feedback = Vec::new();
            for (name, entry) in registry.iter() {
                match &entry.actor_ref {
                    ActorRef::Cooperative(host) => cooperative.push((name.clone(), Arc::clone(host))),
                    ActorRef::Feedback(handle) => feedback.push(handle.clone()),
                }
            }
            (cooperative, feedback)
        };

        for (name, host) in cooperative {
            let ctx = crate::actor::ActorContext::new(Arc::clone(&self.shared), name);
            host.lock().start(&ctx);
        }
        for handle in feedback {
            handle.start();
        }
    }

    pub fn actor_status(&self, name: &ActorName) -> Option<crate::actor::ActorStatus> {
        let registry = self.shared.registry.read();
        match &registry.get(name)?.actor_ref {
            ActorRef::Cooperative(host) => Some(host.lock().status()),
            ActorRef::Feedback(_) => None, // status lives on the dedicated thread; see Open Questions.
        }
    }

    pub fn actor_stats(&self, name: &ActorName) -> Option<ActorStatsSnapshot> {
        let registry = self.shared.registry.read();
        let entry = registry.get(name)?;
        let stats = entry.stats.lock();
        Some(ActorStatsSnapshot {
            sent: stats.sent_count,
            received: stats.received_count,
            failed: stats.failed_count,
            sent_rate: 0.0,
            received_rate: 0.0,
            sent_log: stats.sent_log.clone(),
            received_log: stats.received_log.clone(),
        })
    }

    /// Schedules a send for `now() + delay`, from outside any actor (e.g. the
    /// coordinator seeding a `SendPattern`, or a test driver). `spec.md`
    /// §4.1/§4.4.
    pub fn schedule(
        &self,
        target: impl Into<ActorName>,
        payload: BoxMessage,
        delay: TickDuration,
        kind: MessageKind,
    ) -> Result<EventHandle> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(ChronosimError::Stopped);
        }
        let deadline = self.now() + delay;
        let mut queue = self.shared.queue.lock();
        Ok(queue.insert(
            deadline,
            ScheduledDispatch {
                destination: target.into(),
                from: None,
                kind,
                payload,
                sleep_wake: None,
            },
        ))
    }

    pub fn cancel(&self, handle: EventHandle) -> bool {
        self.shared.queue.lock().cancel(handle)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Advances the clock to the earliest deadline at or before `limit`,
    /// dispatching every event encountered along the way, and returns the
    /// new current time. `spec.md` §4.2.1.
    ///
    /// A second, concurrent call to `advance` while one is already in
    /// progress is a logic error (`spec.md` §4.2: "the second caller
    /// blocks") rather than a hard error on this single-threaded driver; it
    /// is logged and treated as a no-op return of the current time.
    pub fn advance_to(&self, limit: VirtualTime) -> VirtualTime {
        if self
            .advancing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("advance() called while another advance is already in progress");
            return self.now();
        }

        let result = match self.shared.mode {
            DispatchMode::Cooperative => self.advance_cooperative(limit),
            DispatchMode::Feedback => self.advance_feedback(limit),
        };

        self.advancing.store(false, Ordering::Release);
        result
    }

    /// Advances directly to the next scheduled deadline, if any, else leaves
    /// time unchanged and returns it.
    pub fn advance_to_next(&self) -> VirtualTime {
        match self.shared.queue.lock().next_deadline() {
            Some(deadline) => self.advance_to(deadline),
            None => self.now(),
        }
    }

    pub fn pending_until(&self, cutoff: VirtualTime) -> usize {
        self.shared.queue.lock().count_until(cutoff)
    }

    fn publish_time(&self, time: VirtualTime) {
        self.shared.publish(time);
    }

    fn advance_cooperative(&self, limit: VirtualTime) -> VirtualTime {
        drain_cooperative(&self.shared, limit, Some(COOPERATIVE_PATIENCE_CYCLES));
        self.now()
    }

    fn advance_feedback(&self, limit: VirtualTime) -> VirtualTime {
        loop {
            let due = {
                let mut queue = self.shared.queue.lock();
                queue.pop_due(limit)
            };
            let Some((deadline, items)) = due else {
                break;
            };
            self.publish_time(deadline);
            debug!(time = %deadline, count = items.len(), "dispatching batch (feedback)");

            let mut outstanding = 0usize;
            for item in items {
                if dispatch_feedback_shared(&self.shared, deadline, item) {
                    outstanding += 1;
                }
            }
            for _ in 0..outstanding {
                let _ = self.ack_rx.recv();
            }
        }

        if self.now() < limit {
            self.publish_time(limit);
        }
        self.now()
    }
}

/// Records a "sent" stat on `from`, if it names a registered actor.
/// Centralized here (rather than at the point `ActorContext::send*`
/// enqueues) since this is the one place every dispatch path passes through
/// with the sender's name, payload, and registry access at hand.
fn record_sent_shared(shared: &ClockShared, from: &ActorName, payload: &BoxMessage) {
    let registry = shared.registry.read();
    if let Some(entry) = registry.get(from) {
        entry.stats.lock().record_sent(payload);
    }
}

fn dispatch_cooperative_shared(shared: &Arc<ClockShared>, item: ScheduledDispatch) {
    if let Some(id) = item.sleep_wake {
        if let Some(tx) = shared.sleep_waiters.lock().remove(&id) {
            let _ = tx.send(());
        }
        return;
    }

    if item.kind != MessageKind::Internal {
        if let Some(from) = &item.from {
            record_sent_shared(shared, from, &item.payload);
        }
    }

    let registry = shared.registry.read();
    let Some(entry) = registry.get(&item.destination) else {
        drop(registry);
        shared.record_dropped();
        return;
    };
    let ActorRef::Cooperative(host) = &entry.actor_ref else {
        unreachable!("cooperative clock only ever registers Cooperative actor refs")
    };
    let host = Arc::clone(host);
    drop(registry);

    let ctx = crate::actor::ActorContext::new(Arc::clone(shared), item.destination.clone());
    let mut guard = host.lock();
    let _ = guard.dispatch_envelope(&ctx, item.from, item.kind, item.payload);
}

/// Returns whether this batch owes the clock an acknowledgement for `item`.
/// A sleep-wake marker wakes the parked actor thread but is not itself the
/// obligation: the *resumed* reaction may still have work left to do (e.g.
/// a `send` right after the `sleep` call returns), so the ack this marker's
/// batch is waiting on is fired by that thread once the resumed reaction
/// truly finishes, not the instant it wakes (`spec.md` §6 "sleep"). If the
/// waiter already vanished (the actor terminated mid-sleep), nothing is
/// owed.
fn dispatch_feedback_shared(shared: &Arc<ClockShared>, deadline: VirtualTime, item: ScheduledDispatch) -> bool {
    if let Some(id) = item.sleep_wake {
        return if let Some(tx) = shared.sleep_waiters.lock().remove(&id) {
            let _ = tx.send(());
            true
        } else {
            false
        };
    }

    if item.kind != MessageKind::Internal {
        if let Some(from) = &item.from {
            record_sent_shared(shared, from, &item.payload);
        }
    }

    let registry = shared.registry.read();
    let Some(entry) = registry.get(&item.destination) else {
        drop(registry);
        shared.record_dropped();
        return false;
    };
    let ActorRef::Feedback(handle) = &entry.actor_ref else {
        unreachable!("feedback clock only ever registers Feedback actor refs")
    };
    let handle = handle.clone();
    drop(registry);

    handle.deliver(FeedbackEnvelope {
        from: item.from,
        kind: item.kind,
        payload: item.payload,
        deadline,
        reply: None,
    });
    true
}

/// Drains due events up to and including `until`, dispatching each through
/// `dispatch_cooperative_shared` and publishing time as it goes. Used both
/// by `VirtualClock::advance_cooperative` (with a patience bound on
/// same-timestamp passes, `spec.md` §4.2.3) and, with no such bound, by a
/// sleeping actor's own recursive drain under `DispatchMode::Cooperative`
/// (`spec.md` §6 "sleep": bounded by `until` itself, not by quiescence, so
/// no patience cap is needed there; see `sleep_until`).
fn drain_cooperative(shared: &Arc<ClockShared>, until: VirtualTime, patience: Option<usize>) {
    let mut cycles = 0usize;
    loop {
        let due = {
            let mut queue = shared.queue.lock();
            queue.pop_due(until)
        };
        let Some((deadline, items)) = due else {
            break;
        };
        shared.publish(deadline);
        debug!(time = %deadline, count = items.len(), "dispatching batch (cooperative)");

        for item in items {
            dispatch_cooperative_shared(shared, item);
        }

        if let Some(limit) = patience {
            cycles += 1;
            if cycles >= limit {
                warn!(
                    time = %deadline,
                    "cooperative dispatch did not quiesce within the patience bound; likely a zero-delay feedback loop"
                );
                break;
            }
        }
    }

    if shared.now() < until {
        shared.publish(until);
    }
}

/// Suspends the calling actor's reaction until `now() + duration`
/// (`spec.md` §6 "sleep"). Dispatched here rather than in `ActorContext`
/// itself since both dispatch strategies need shared-state access the
/// context only holds a reference to.
///
/// - `DispatchMode::Cooperative`: recurses directly into
///   [`drain_cooperative`] with no patience bound, the same trick `call`
///   uses to run synchronously on the same call stack, since this mode has
///   no per-actor thread to park.
/// - `DispatchMode::Feedback`: fires the envelope's *current* acknowledgement
///   early (the reaction is about to suspend for longer than the batch it
///   arrived in, so the clock must not wait for it before moving on), hands
///   the envelope a fresh acknowledgement to fire once it actually finishes
///   resuming, schedules a wake-up marker at `until`, and parks this actor's
///   own dedicated thread on a private channel until that marker is
///   dispatched. Chained `sleep` calls within one reaction repeat this
///   hand-off, so whichever ack is current when the reaction truly returns
///   is the one the last marker's batch is waiting on.
pub(crate) fn sleep_until(
    shared: &Arc<ClockShared>,
    actor: &ActorName,
    ack: Option<&std::cell::RefCell<Arc<EnvelopeAck>>>,
    until: VirtualTime,
) {
    match shared.mode {
        DispatchMode::Cooperative => drain_cooperative(shared, until, None),
        DispatchMode::Feedback => {
            if until <= shared.now() {
                return;
            }
            if let Some(cell) = ack {
                cell.borrow().fire();
                *cell.borrow_mut() = Arc::new(EnvelopeAck::new(shared.ack_tx.clone()));
            }

            let (wake_tx, wake_rx) = bounded(1);
            let id = shared.next_sleep_id.fetch_add(1, Ordering::Relaxed);
            shared.sleep_waiters.lock().insert(id, wake_tx);
            {
                let mut queue = shared.queue.lock();
                queue.insert(
                    until,
                    ScheduledDispatch {
                        destination: actor.clone(),
                        from: None,
                        kind: MessageKind::Plain,
                        payload: message(()),
                        sleep_wake: Some(id),
                    },
                );
            }
            let _ = wake_rx.recv();
        }
    }
}

/// Resolves `target` and performs an immediate `call`/reply, bypassing the
/// event queue entirely (`spec.md` §5: virtual time does not advance while a
/// call is outstanding).
pub(crate) fn dispatch_call(
    shared: &Arc<ClockShared>,
    from: Option<ActorName>,
    target: ActorName,
    payload: BoxMessage,
    timeout: Duration,
) -> CallReply {
    let entry = {
        let registry = shared.registry.read();
        registry.get(&target).cloned()
    };

    let Some(entry) = entry else {
        shared.record_dropped();
        return CallReply::UnknownTarget;
    };

    if let Some(from) = &from {
        let registry = shared.registry.read();
        if let Some(caller) = registry.get(from) {
            caller.stats.lock().record_sent(&payload);
        }
    }

    match entry.actor_ref {
        ActorRef::Cooperative(host) => {
            // Under `DispatchMode::Cooperative`, dispatch runs in-line on the
            // caller's own stack, so a call that loops back to an actor
            // already being dispatched further up this same stack (most
            // directly: an actor calling itself) would re-enter this
            // non-reentrant lock and hang. `try_lock` turns that into a
            // timeout instead of a deadlock.
            let Some(mut guard) = host.try_lock() else {
                warn!(
                    target = %target,
                    "call target is already being dispatched on this stack (reentrant or self-call); treating as a timeout"
                );
                return CallReply::Timeout;
            };
            let ctx = crate::actor::ActorContext::new(Arc::clone(shared), target);
            match guard.dispatch_envelope(&ctx, from, MessageKind::Call, payload) {
                Some(reply) => CallReply::Reply(reply),
                None => CallReply::NoReply,
            }
        }
        ActorRef::Feedback(handle) => {
            let (reply_tx, reply_rx) = bounded(1);
            handle.deliver(FeedbackEnvelope {
                from,
                kind: MessageKind::Call,
                payload,
                deadline: shared.now(),
                reply: Some(reply_tx),
            });
            match reply_rx.recv_timeout(timeout) {
                Ok(reply) => CallReply::Reply(reply),
                Err(_) => CallReply::Timeout,
            }
        }
    }
}
