//! Declarative actors (`spec.md` §4.3 "Declarative behavior"): state plus a
//! data-described set of outgoing send patterns and incoming-message
//! reactions, as opposed to the imperative [`EventLoop`](super::eventloop)
//! style.

use std::fmt;
use std::sync::Arc;

use crate::error::{ChronosimError, Result};
use crate::message::BoxMessage;
use crate::name::ActorName;
use crate::time::TickDuration;

use super::context::ActorContext;

/// What a reaction (or an `EventLoop` hook) hands back to the host.
///
/// `spec.md` §4.3 also names `send(messages, new_state)` and
/// `send_after(delay, messages, new_state)` as reaction results; there is no
/// corresponding variant here because, unlike `ok`/`reply`, those two carry
/// no information the host needs to act on after the fact. A reaction
/// performs them immediately via `ctx.send`/`ctx.send_after`/`ctx.emit`
/// (`spec.md` §6 "Clock-facing primitives") and returns `Ok`, the same way a
/// function call evaluates its side effects before returning rather than
/// returning a description of them.
pub enum Outcome {
    /// Processed, nothing to reply with.
    Ok,
    /// Processed; only meaningful in response to a `call`. Replies sent in
    /// response to a `cast`/plain send are discarded with a `trace`-level
    /// note (`spec.md` §4.3 "reply(..) outside of a call").
    Reply(BoxMessage),
    /// The actor requests its own clean shutdown (`spec.md` §4.3 "stop").
    Stop,
    /// The reaction failed; the host transitions the actor to `Failed`
    /// (`spec.md` §7).
    Fail(String),
}

/// A generator invoked each time a send pattern fires, producing the
/// payload for that occurrence. `index` counts firings from zero, letting a
/// `burst`/`rate` pattern vary its payload per occurrence.
pub type PayloadFn = Arc<dyn Fn(u64) -> BoxMessage + Send + Sync>;

/// `spec.md` §4.3's four declarative send shapes: a behavior emits these at
/// the coordinator's instruction, independent of any inbound message.
pub enum SendPattern {
    /// Fires every `interval` ticks, forever, starting at `interval`.
    Periodic {
        target: ActorName,
        interval: TickDuration,
        payload: PayloadFn,
    },
    /// `spec.md` §4.3: "Equivalent to `periodic(1000 / per_second, msg)`".
    /// Carries the already-divided `interval` rather than `per_second`
    /// itself; the driver has no further use for the original rate once
    /// the equivalence has been applied at construction (see
    /// [`SendPattern::rate`]).
    Rate {
        target: ActorName,
        interval: TickDuration,
        payload: PayloadFn,
    },
    /// Every `interval` ticks, forever, emits `count` copies of the payload
    /// back to back (commonly with `interval` much larger than the time it
    /// takes to emit `count` copies, so they land at the same instant).
    Burst {
        target: ActorName,
        interval: TickDuration,
        count: u64,
        payload: PayloadFn,
    },
    /// A single, one-shot send to the actor's own name after `delay` ticks.
    SelfMessage {
        delay: TickDuration,
        payload: PayloadFn,
    },
}

impl SendPattern {
    pub fn periodic(target: impl Into<ActorName>, interval: TickDuration, payload: PayloadFn) -> Self {
        SendPattern::Periodic {
            target: target.into(),
            interval,
            payload,
        }
    }

    /// `spec.md` §4.3: "integer division; MUST reject `per_second = 0`".
    pub fn rate(target: impl Into<ActorName>, per_second: u64, payload: PayloadFn) -> Result<Self> {
        if per_second == 0 {
            return Err(ChronosimError::InvalidArgument(
                "rate(..) per_second must be non-zero".to_string(),
            ));
        }
        Ok(SendPattern::Rate {
            target: target.into(),
            interval: TickDuration::from_ticks(1000 / per_second),
            payload,
        })
    }

    pub fn burst(
        target: impl Into<ActorName>,
        count: u64,
        interval: TickDuration,
        payload: PayloadFn,
    ) -> Self {
        SendPattern::Burst {
            target: target.into(),
            interval,
            count,
            payload,
        }
    }

    pub fn self_message(delay: TickDuration, payload: PayloadFn) -> Self {
        SendPattern::SelfMessage { delay, payload }
    }
}

/// What an inbound payload must look like to trigger a reaction.
pub enum MatchPattern {
    /// Matches any payload; typically the last reaction in a list, as a
    /// catch-all.
    Any,
    /// Matches payloads `eq_dyn`-equal to this literal (`spec.md` §4.3
    /// "on_match").
    Literal(BoxMessage),
    /// Matches payloads satisfying an arbitrary predicate (`spec.md` §4.3
    /// "on_receive").
    Predicate(Arc<dyn Fn(&BoxMessage) -> bool + Send + Sync>),
}

impl fmt::Debug for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPattern::Any => f.write_str("MatchPattern::Any"),
            MatchPattern::Literal(payload) => f.debug_tuple("MatchPattern::Literal").field(payload).finish(),
            MatchPattern::Predicate(_) => f.write_str("MatchPattern::Predicate(..)"),
        }
    }
}

type ReactionFn<S> =
    Arc<dyn Fn(&mut S, &ActorContext, Option<&ActorName>, &BoxMessage) -> Outcome + Send + Sync>;

/// A declarative actor's state plus its ordered list of reactions. Reactions
/// are tried in registration order; the first whose [`MatchPattern`] matches
/// the inbound payload runs. No match is not an error (`spec.md` §4.3: an
/// unmatched message is a no-op, not a failure).
pub struct DeclarativeActor<S> {
    state: S,
    reactions: Vec<(MatchPattern, ReactionFn<S>)>,
}

impl<S: Send + 'static> DeclarativeActor<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            reactions: Vec::new(),
        }
    }

    /// Registers a reaction to payloads literally equal to `literal`.
    pub fn on_match<F>(mut self, literal: BoxMessage, handler: F) -> Self
    where
        F: Fn(&mut S, &ActorContext, Option<&ActorName>, &BoxMessage) -> Outcome + Send + Sync + 'static,
    {
        self.reactions
            .push((MatchPattern::Literal(literal), Arc::new(handler)));
        self
    }

    /// Registers a reaction to payloads satisfying `predicate`.
    pub fn on_receive<P, F>(mut self, predicate: P, handler: F) -> Self
    where
        P: Fn(&BoxMessage) -> bool + Send + Sync + 'static,
        F: Fn(&mut S, &ActorContext, Option<&ActorName>, &BoxMessage) -> Outcome + Send + Sync + 'static,
    {
        self.reactions.push((
            MatchPattern::Predicate(Arc::new(predicate)),
            Arc::new(handler),
        ));
        self
    }

    /// Registers a catch-all reaction. Conventionally the last one added.
    pub fn on_any<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut S, &ActorContext, Option<&ActorName>, &BoxMessage) -> Outcome + Send + Sync + 'static,
    {
        self.reactions.push((MatchPattern::Any, Arc::new(handler)));
        self
    }

    pub(crate) fn dispatch(
        &mut self,
        ctx: &ActorContext,
        from: Option<&ActorName>,
        payload: &BoxMessage,
    ) -> Outcome {
        for (pattern, handler) in &self.reactions {
            let matched = match pattern {
                MatchPattern::Any => true,
                MatchPattern::Literal(literal) => literal.eq_dyn(payload.as_ref()),
                MatchPattern::Predicate(predicate) => predicate(payload),
            };
            if matched {
                let handler = handler.clone();
                return handler(&mut self.state, ctx, from, payload);
            }
        }
        Outcome::Ok
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}

impl<S: Send + 'static> super::host::Behavior for DeclarativeActor<S> {
    fn on_message(
        &mut self,
        ctx: &ActorContext,
        from: Option<&ActorName>,
        _kind: crate::message::MessageKind,
        payload: &BoxMessage,
    ) -> Outcome {
        self.dispatch(ctx, from, payload)
    }
}

/// A declarative actor's complete description: its reactions plus the
/// outgoing send patterns the coordinator seeds at simulation start
/// (`spec.md` §4.4 "declarative actors register their send patterns at
/// construction").
pub struct BehaviorSpec<S> {
    pub actor: DeclarativeActor<S>,
    pub send_patterns: Vec<SendPattern>,
}

impl<S: Send + 'static> BehaviorSpec<S> {
    pub fn new(state: S) -> Self {
        Self {
            actor: DeclarativeActor::new(state),
            send_patterns: Vec::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: SendPattern) -> Self {
        self.send_patterns.push(pattern);
        self
    }
}
