//! Event-loop actors (`spec.md` §4.3 "Event-loop behavior"): the imperative
//! counterpart to [`DeclarativeActor`](super::behavior::DeclarativeActor),
//! modeled on the classic `init`/`handle_call`/`handle_cast`/`handle_info`
//! shape.

use crate::message::{BoxMessage, MessageKind};
use crate::name::ActorName;

use super::behavior::Outcome;
use super::context::ActorContext;
use super::host::Behavior;

/// What `handle_call` hands back: a reply is the common case, but a call
/// handler may also choose not to reply yet, stop the actor, or fail.
pub enum CallOutcome<S> {
    Reply(BoxMessage, S),
    NoReply(S),
    Stop,
    Fail(String),
}

/// What `handle_cast`/`handle_info` hand back: no reply is possible for
/// these (`spec.md` §4.3: a `reply(..)` from a cast handler is a no-op).
pub enum CastOutcome<S> {
    Ok(S),
    Stop,
    Fail(String),
}

/// Implemented by user code; `spec.md` §4.3's four lifecycle/reaction hooks.
pub trait EventLoop: Send {
    type State: Send;

    /// Runs once, before the actor processes its first message.
    fn init(&mut self, ctx: &ActorContext) -> Self::State;

    /// Handles a synchronous `call`.
    fn handle_call(
        &mut self,
        state: Self::State,
        ctx: &ActorContext,
        from: Option<&ActorName>,
        payload: &BoxMessage,
    ) -> CallOutcome<Self::State>;

    /// Handles a fire-and-forget `cast`.
    fn handle_cast(
        &mut self,
        state: Self::State,
        ctx: &ActorContext,
        from: Option<&ActorName>,
        payload: &BoxMessage,
    ) -> CastOutcome<Self::State>;

    /// Handles a bare/plain send. `spec.md` distinguishes this from `cast`
    /// only at the trace-stream label; logic-wise both are fire-and-forget.
    fn handle_info(
        &mut self,
        state: Self::State,
        ctx: &ActorContext,
        payload: &BoxMessage,
    ) -> CastOutcome<Self::State> {
        self.handle_cast(state, ctx, None, payload)
    }

    /// Runs once, when the actor stops (cleanly or on failure).
    fn terminate(&mut self, _state: Self::State, _ctx: &ActorContext) {}
}

/// Adapts an [`EventLoop`] implementation to the object-safe [`Behavior`]
/// trait the host dispatches through, the same way `DeclarativeActor`
/// adapts a data-described reaction list.
pub struct EventLoopHost<E: EventLoop> {
    logic: E,
    state: Option<E::State>,
}

impl<E: EventLoop> EventLoopHost<E> {
    pub fn new(logic: E) -> Self {
        Self { logic, state: None }
    }
}

impl<E: EventLoop> Behavior for EventLoopHost<E> {
    fn on_start(&mut self, ctx: &ActorContext) {
        self.state = Some(self.logic.init(ctx));
    }

    fn on_message(
        &mut self,
        ctx: &ActorContext,
        from: Option<&ActorName>,
        kind: MessageKind,
        payload: &BoxMessage,
    ) -> Outcome {
        let state = self
            .state
            .take()
            .expect("on_start runs before any message is dispatched");

        match kind {
            MessageKind::Call => match self.logic.handle_call(state, ctx, from, payload) {
                CallOutcome::Reply(reply, next) => {
                    self.state = Some(next);
                    Outcome::Reply(reply)
                }
                CallOutcome::NoReply(next) => {
                    self.state = Some(next);
                    Outcome::Ok
                }
                CallOutcome::Stop => Outcome::Stop,
                CallOutcome::Fail(reason) => Outcome::Fail(reason),
            },
            MessageKind::Cast => match self.logic.handle_cast(state, ctx, from, payload) {
                CastOutcome::Ok(next) => {
                    self.state = Some(next);
                    Outcome::Ok
                }
                CastOutcome::Stop => Outcome::Stop,
                CastOutcome::Fail(reason) => Outcome::Fail(reason),
            },
            MessageKind::Plain => match self.logic.handle_info(state, ctx, payload) {
                CastOutcome::Ok(next) => {
                    self.state = Some(next);
                    Outcome::Ok
                }
                CastOutcome::Stop => Outcome::Stop,
                CastOutcome::Fail(reason) => Outcome::Fail(reason),
            },
            // Only `PatternDriver` ever sends/receives `Internal` messages,
            // and it is never built as an `EventLoopHost`; kept here only to
            // make this match exhaustive.
            MessageKind::Internal => {
                self.state = Some(state);
                Outcome::Ok
            }
        }
    }

    fn on_stop(&mut self, ctx: &ActorContext) {
        if let Some(state) = self.state.take() {
            self.logic.terminate(state, ctx);
        }
    }
}
