//! The `DispatchMode::Feedback` dispatch strategy: each actor owns a
//! dedicated OS thread and a bounded mailbox; `advance` dispatches a due
//! batch by sending one envelope per event and then blocks on an
//! acknowledgement channel until every dispatched envelope has been fully
//! processed (`spec.md` §4.2.2/§5 "Feedback concurrency").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::actor::context::ActorContext;
use crate::actor::host::ActorHost;
use crate::message::{BoxMessage, MessageKind};
use crate::name::ActorName;
use crate::time::VirtualTime;

use super::shared::ClockShared;

/// A reply channel for a synchronous `call` (`spec.md` §4.3 "call"). Bounded
/// to one slot: exactly one reply is ever sent.
pub type ReplySender = Sender<BoxMessage>;
pub type ReplyReceiver = Receiver<BoxMessage>;

/// One unit of work delivered to an actor's dedicated thread. Both
/// queue-driven dispatch (from `advance`) and immediate `call`s funnel
/// through the same mailbox, since a single actor's state must never be
/// touched by two threads at once.
pub(crate) struct FeedbackEnvelope {
    pub from: Option<ActorName>,
    pub kind: MessageKind,
    pub payload: BoxMessage,
    pub deadline: VirtualTime,
    /// `Some` only for `call`: the actor thread sends its reply here instead
    /// of (or never, if omitted: immediate sends have no reply) reporting
    /// through the shared ack channel.
    pub reply: Option<ReplySender>,
}

/// An exactly-once guard around one batch's worth of acknowledgement.
/// Normally fired once, after the envelope's reaction returns. A reaction
/// that calls `ActorContext::sleep` (`spec.md` §6) may suspend for longer
/// than the batch it arrived in, so `sleep_until` fires the current guard
/// early, before parking the thread, and hands the envelope a fresh one
/// to fire once it actually finishes resuming. The idempotent `fire` is
/// what lets the normal post-dispatch call at the end of
/// `run_feedback_actor` and `sleep_until`'s early call share the same guard
/// safely, whichever one runs first.
pub(crate) struct EnvelopeAck {
    tx: Sender<()>,
    fired: AtomicBool,
}

impl EnvelopeAck {
    pub(crate) fn new(tx: Sender<()>) -> Self {
        Self {
            tx,
            fired: AtomicBool::new(false),
        }
    }

    pub(crate) fn fire(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(());
        }
    }
}

/// The clock-facing half of a feedback actor: where to send it work, and
/// whether queue-driven dispatch owes an acknowledgement.
#[derive(Clone)]
pub(crate) struct FeedbackHandle {
    sender: Sender<FeedbackEnvelope>,
    start_tx: Sender<()>,
}

impl FeedbackHandle {
    /// Delivers an envelope to this actor's dedicated thread. Blocks the
    /// caller if the mailbox (bounded per `ActorOpts::mailbox_capacity`) is
    /// full, per `spec.md`'s silent backpressure requirement.
    pub fn deliver(&self, envelope: FeedbackEnvelope) {
        // A closed receiver only happens once the actor thread has exited
        // after `Stopped`/`Failed`; dropping the envelope is the correct
        // behavior symmetric with the cooperative engine's dead-actor path.
        let _ = self.sender.send(envelope);
    }

    /// Releases this actor's dedicated thread to run `on_start` and begin
    /// accepting envelopes. Sent once, by `VirtualClock::start_all`, only
    /// after every actor in the simulation has finished registering, so an
    /// actor's `on_start` (which may `call`/`send` a sibling actor) never
    /// races the registration loop that is still spawning later actors.
    pub fn start(&self) {
        let _ = self.start_tx.send(());
    }
}

/// Spawns the dedicated OS thread backing one feedback-mode actor and
/// returns the handle the clock and other actors use to reach it.
///
/// `ack_tx` is shared by every feedback actor in the simulation; the thread
/// sends one acknowledgement per queue-driven (non-`call`) envelope it
/// finishes processing, which is what lets `advance` know when a dispatched
/// batch has been fully absorbed.
pub(crate) fn spawn_feedback_actor(
    shared: Arc<ClockShared>,
    name: ActorName,
    mut host: ActorHost,
    ack_tx: Sender<()>,
    mailbox_capacity: usize,
) -> FeedbackHandle {
    let (tx, rx) = bounded::<FeedbackEnvelope>(mailbox_capacity.max(1));
    let (start_tx, start_rx) = bounded::<()>(1);

    std::thread::Builder::new()
        .name(format!("chronosim-actor-{name}"))
        .spawn(move || run_feedback_actor(shared, name, &mut host, rx, start_rx, ack_tx))
        .expect("failed to spawn actor thread");

    FeedbackHandle { sender: tx, start_tx }
}

fn run_feedback_actor(
    shared: Arc<ClockShared>,
    name: ActorName,
    host: &mut ActorHost,
    rx: Receiver<FeedbackEnvelope>,
    start_rx: Receiver<()>,
    ack_tx: Sender<()>,
) {
    // Block until `VirtualClock::start_all` releases every actor at once,
    // then run `on_start` before waiting on the first envelope: a
    // pattern-driven actor's first self-scheduled tick happens in
    // `on_start`, and nothing would ever send it an envelope to trigger that
    // lazily (`spec.md` §4.4).
    if start_rx.recv().is_err() {
        return;
    }
    let start_ctx = ActorContext::new(shared.clone(), name.clone());
    host.start(&start_ctx);

    while let Ok(envelope) = rx.recv() {
        if envelope.reply.is_none() {
            // Queue-driven envelope: build an ack guard so `ctx.sleep(..)`
            // can fire it early if the reaction suspends, handing itself a
            // fresh ack to cover the resumption (`spec.md` §6). Whichever
            // ack is current once the reaction truly returns is the one
            // that is owed, not necessarily the one this envelope started
            // with, if it slept in between.
            let ack = Arc::new(EnvelopeAck::new(ack_tx.clone()));
            let ctx = ActorContext::new_with_ack(shared.clone(), name.clone(), ack);
            host.dispatch_envelope(&ctx, envelope.from.clone(), envelope.kind, envelope.payload);
            if let Some(final_ack) = ctx.current_ack() {
                final_ack.fire();
            }
        } else {
            let ctx = ActorContext::new(shared.clone(), name.clone());
            let outcome = host.dispatch_envelope(
                &ctx,
                envelope.from.clone(),
                envelope.kind,
                envelope.payload,
            );
            if let Some(reply_tx) = envelope.reply {
                if let Some(reply) = outcome {
                    let _ = reply_tx.send(reply);
                }
                // No reply produced: the caller's `recv_timeout` ceiling is
                // what bounds the wait; nothing further to do here.
            }
        }

        if host.is_terminal() {
            break;
        }
    }
}

/// The real wall-clock ceiling a `call`-ing thread waits on a reply for.
/// Virtual time never advances while a call is outstanding (`spec.md` §5),
/// so this bound exists purely to keep a misbehaving or deadlocked callee
/// from hanging the caller forever; it has no bearing on simulated ticks.
pub(crate) const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
