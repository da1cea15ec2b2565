//! Opaque, dynamically-typed message payloads.
//!
//! `spec.md` §3 describes a payload as "opaque message delivered verbatim";
//! because a target is resolved *by name at send time* rather than through a
//! statically-typed port wired up at construction (`spec.md` §4.4 "Target
//! resolution"), the payload type cannot be pinned down at the type level the
//! way the teacher's `InputFn`/`Output<T>` ports do. `Message` is the
//! dynamic-dispatch escape hatch: any `Clone + Debug + PartialEq + Send +
//! Sync + 'static` type can be sent, and `on_match` literal patterns compare
//! payloads by downcasting.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::name::ActorName;

/// A message payload. Blanket-implemented for any ordinary, clonable,
/// comparable, debuggable value; user code essentially never implements
/// this by hand.
pub trait Message: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_dyn(&self, other: &dyn Message) -> bool;
    fn clone_dyn(&self) -> BoxMessage;
}

impl<T> Message for T
where
    T: Any + Send + Sync + fmt::Debug + Clone + PartialEq,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn Message) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn clone_dyn(&self) -> BoxMessage {
        Arc::new(self.clone())
    }
}

/// A shared, type-erased message payload. `Arc` rather than `Box` because
/// the same payload is both delivered to its destination and retained
/// verbatim in `sent_log`/`received_log` (`spec.md` §3 "Per-actor stats").
pub type BoxMessage = Arc<dyn Message>;

/// Convenience constructor and downcast helpers for [`BoxMessage`].
pub fn message<T>(value: T) -> BoxMessage
where
    T: Message,
{
    Arc::new(value)
}

pub fn downcast_ref<T: 'static>(msg: &BoxMessage) -> Option<&T> {
    msg.as_any().downcast_ref::<T>()
}

/// The three send shapes of `spec.md` §4.3/§6: a synchronous call awaiting a
/// reply, a fire-and-forget cast, or a bare/plain message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Call,
    Cast,
    /// A bare payload, wrapped in neither `call(..)` nor `cast(..)`.
    Plain,
    /// Internal bookkeeping: pump ticks and similar plumbing a host sends
    /// itself that user code never sees. `spec.md` §4.3: "internal
    /// bookkeeping payloads ... MUST NOT be counted". `ActorHost` skips
    /// stats and trace emission for this kind entirely.
    Internal,
}

impl MessageKind {
    /// The trace stream's `kind` field (`spec.md` §6): `call`, `cast`, or
    /// `send`. The wire-facing name for [`MessageKind::Plain`] is `send`, not
    /// `plain`; the Rust-side name is chosen to not collide with
    /// `std::marker::Send`. `Internal` never reaches the trace stream, so
    /// its label is only ever seen in diagnostic `tracing` output.
    pub fn trace_label(self) -> &'static str {
        match self {
            MessageKind::Call => "call",
            MessageKind::Cast => "cast",
            MessageKind::Plain => "send",
            MessageKind::Internal => "internal",
        }
    }
}

/// Where a declarative `send(..)`/`send_after(..)` emission goes:
/// `spec.md` §4.3 "A reaction MUST return ... send(messages, new_state) —
/// emit a list of (target, payload) or payload (to all targets)".
#[derive(Debug, Clone)]
pub enum SendTarget {
    Named(ActorName),
    /// Broadcasts to every actor currently registered with the simulation.
    /// `spec.md` §4.3's declarative actors resolve "all targets" against
    /// their own configured `targets` list rather than the whole registry;
    /// callers that need that narrower scope should `emit` once per named
    /// target instead of reaching for this variant.
    AllTargets,
}

/// One outgoing message as described by a reaction.
#[derive(Debug, Clone)]
pub struct Emission {
    pub target: SendTarget,
    pub kind: MessageKind,
    pub payload: BoxMessage,
    pub delay: crate::time::TickDuration,
}

impl Emission {
    pub fn to(target: impl Into<ActorName>, payload: BoxMessage) -> Self {
        Self {
            target: SendTarget::Named(target.into()),
            kind: MessageKind::Plain,
            payload,
            delay: crate::time::TickDuration::ZERO,
        }
    }

    pub fn broadcast(payload: BoxMessage) -> Self {
        Self {
            target: SendTarget::AllTargets,
            kind: MessageKind::Plain,
            payload,
            delay: crate::time::TickDuration::ZERO,
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Marks this emission as a `send_after(delay, ..)` (`spec.md` §4.3).
    pub fn after(mut self, delay: crate::time::TickDuration) -> Self {
        self.delay = delay;
        self
    }
}
