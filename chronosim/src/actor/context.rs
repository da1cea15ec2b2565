//! The handle a running actor's own code uses to read the clock, schedule
//! new events, and issue synchronous calls (`spec.md` §4.3 "Clock-facing
//! primitives").

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use crate::message::{BoxMessage, Emission, MessageKind, SendTarget};
use crate::name::ActorName;
use crate::queue::EventHandle;
use crate::time::{TickDuration, VirtualTime};

use crate::clock::feedback::{EnvelopeAck, DEFAULT_CALL_TIMEOUT};
use crate::clock::shared::{ClockShared, ScheduledDispatch};
use crate::clock::{dispatch_call, sleep_until, CallReply};

/// Passed by reference into every `Behavior`/`EventLoop` hook. Cheap to
/// construct (one `Arc` clone and one `ActorName` clone) since a fresh
/// context is built per dispatched envelope rather than held across calls.
pub struct ActorContext {
    pub(crate) shared: Arc<ClockShared>,
    self_name: ActorName,
    /// `Some` only under `DispatchMode::Feedback`: the acknowledgement owed
    /// for whichever envelope is currently being dispatched. `sleep` fires
    /// the current one early and replaces it with a fresh one owed by the
    /// reaction's eventual resumption (`spec.md` §6 "sleep"); the dispatch
    /// loop reads back whatever is current once the reaction truly returns.
    ack: Option<RefCell<Arc<EnvelopeAck>>>,
}

impl ActorContext {
    pub(crate) fn new(shared: Arc<ClockShared>, self_name: ActorName) -> Self {
        Self { shared, self_name, ack: None }
    }

    pub(crate) fn new_with_ack(
        shared: Arc<ClockShared>,
        self_name: ActorName,
        ack: Arc<EnvelopeAck>,
    ) -> Self {
        Self { shared, self_name, ack: Some(RefCell::new(ack)) }
    }

    /// The acknowledgement currently owed for this dispatch, after any
    /// `sleep`-driven hand-offs. Read by the feedback dispatch loop once the
    /// reaction returns.
    pub(crate) fn current_ack(&self) -> Option<Arc<EnvelopeAck>> {
        self.ack.as_ref().map(|cell| cell.borrow().clone())
    }

    /// The current virtual time (`spec.md` §4.3 "Clock propagation").
    pub fn now(&self) -> VirtualTime {
        self.shared.now()
    }

    /// This actor's own registered name.
    pub fn self_name(&self) -> &ActorName {
        &self.self_name
    }

    /// Schedules a fire-and-forget send for delivery at `now() + delay`
    /// (`spec.md` §4.3 "send"/"send_after"; `delay == 0` is legal and is
    /// dispatched on a later pass of the `advance` already in progress, if
    /// any). An unknown target is not an error here: it is silently dropped
    /// at dispatch time per §4.4/§7.
    pub fn send_after(
        &self,
        target: impl Into<ActorName>,
        payload: BoxMessage,
        delay: TickDuration,
    ) -> EventHandle {
        self.enqueue(target.into(), payload, delay, MessageKind::Cast)
    }

    /// `send_after(.., TickDuration::ZERO)`.
    pub fn send(&self, target: impl Into<ActorName>, payload: BoxMessage) -> EventHandle {
        self.send_after(target, payload, TickDuration::ZERO)
    }

    /// Schedules one emission a reaction produced (`spec.md` §4.3
    /// `send(messages, new_state)`: a reaction calls this once per message
    /// in the list it would otherwise have returned). Each emission carries
    /// its own delay and target, set up via [`Emission::after`].
    pub fn emit(&self, emission: Emission) -> Vec<EventHandle> {
        match emission.target {
            SendTarget::Named(target) => vec![self.enqueue(
                target,
                emission.payload,
                emission.delay,
                emission.kind,
            )],
            SendTarget::AllTargets => {
                let names: Vec<ActorName> = self.shared.registry.read().keys().cloned().collect();
                names
                    .into_iter()
                    .map(|name| {
                        self.enqueue(
                            name,
                            emission.payload.clone(),
                            emission.delay,
                            emission.kind,
                        )
                    })
                    .collect()
            }
        }
    }

    fn enqueue(
        &self,
        destination: ActorName,
        payload: BoxMessage,
        delay: TickDuration,
        kind: MessageKind,
    ) -> EventHandle {
        self.enqueue_from(Some(self.self_name.clone()), destination, payload, delay, kind)
    }

    fn enqueue_from(
        &self,
        from: Option<ActorName>,
        destination: ActorName,
        payload: BoxMessage,
        delay: TickDuration,
        kind: MessageKind,
    ) -> EventHandle {
        let deadline = self.now() + delay;
        let mut queue = self.shared.queue.lock();
        queue.insert(
            deadline,
            ScheduledDispatch {
                destination,
                from,
                kind,
                payload,
                sleep_wake: None,
            },
        )
    }

    /// Schedules a send attributed to `owner` rather than this context's own
    /// `self_name`. Used by [`PatternDriver`](crate::coordinator::PatternDriver)
    /// so a declarative actor's pattern-driven emissions count against its
    /// own `sent_count` rather than the hidden driver's (`spec.md` §4.3, §8
    /// scenario 1).
    pub(crate) fn send_on_behalf_of(
        &self,
        owner: ActorName,
        target: impl Into<ActorName>,
        payload: BoxMessage,
    ) -> EventHandle {
        self.enqueue_from(Some(owner), target.into(), payload, TickDuration::ZERO, MessageKind::Cast)
    }

    /// Schedules an internal pump message to `target`, delivered at
    /// `now() + delay`, that bypasses stats and trace emission entirely
    /// (`spec.md` §4.3: "internal bookkeeping payloads ... MUST NOT be
    /// counted").
    pub(crate) fn send_internal_after(
        &self,
        target: impl Into<ActorName>,
        payload: BoxMessage,
        delay: TickDuration,
    ) -> EventHandle {
        self.enqueue_from(
            Some(self.self_name.clone()),
            target.into(),
            payload,
            delay,
            MessageKind::Internal,
        )
    }

    /// Suspends this reaction until `now() + duration`, without blocking
    /// wall-clock time (`spec.md` §6 "sleep"). Under `DispatchMode::Feedback`
    /// this parks the actor's own dedicated thread; under
    /// `DispatchMode::Cooperative` it recurses into the shared drain, the
    /// same way `call` does.
    pub fn sleep(&self, duration: TickDuration) {
        let until = self.now() + duration;
        sleep_until(&self.shared, &self.self_name, self.ack.as_ref(), until);
    }

    /// Cancels a previously scheduled send. Returns `false` if it was
    /// already dispatched or cancelled, or never existed.
    pub fn cancel(&self, handle: EventHandle) -> bool {
        self.shared.queue.lock().cancel(handle)
    }

    /// A synchronous request/reply send (`spec.md` §4.3 "call"). Unlike
    /// `send`/`send_after`, this does not go through the shared event queue:
    /// virtual time does not advance while a call is outstanding (§5), so it
    /// is dispatched immediately (recursively under `DispatchMode::Cooperative`,
    /// or over the target's dedicated channel under `DispatchMode::Feedback`)
    /// and bounded by a real wall-clock timeout rather than a scheduled one.
    pub fn call(&self, target: impl Into<ActorName>, payload: BoxMessage) -> CallReply {
        self.call_with_timeout(target, payload, DEFAULT_CALL_TIMEOUT)
    }

    pub fn call_with_timeout(
        &self,
        target: impl Into<ActorName>,
        payload: BoxMessage,
        timeout: Duration,
    ) -> CallReply {
        dispatch_call(
            &self.shared,
            Some(self.self_name.clone()),
            target.into(),
            payload,
            timeout,
        )
    }
}
