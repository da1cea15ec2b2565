//! `chronosim`: a virtual-time discrete-event simulation kernel for
//! actor-style programs.
//!
//! A [`Simulation`] advances a logical clock rather than wall-clock time:
//! actors exchange messages with deadlines expressed in abstract ticks, and
//! the clock only ever moves forward to the next interesting instant. Two
//! interchangeable dispatch strategies (`DispatchMode::Cooperative` and
//! `DispatchMode::Feedback`) drive the same actor graph with identical
//! observable behavior, differing only in their internal concurrency.
//!
//! Actors are written in one of two styles: [`actor::DeclarativeActor`]
//! (state plus a data-described set of send patterns and reactions) or
//! [`actor::EventLoop`] (the imperative `init`/`handle_call`/`handle_cast`
//! shape). Both are adapted to the single object-safe [`actor::Behavior`]
//! seam the host dispatches through.

pub mod actor;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod name;
pub mod queue;
pub mod stats;
pub mod time;
pub(crate) mod util;

pub use actor::{
    ActorContext, ActorHost, ActorName, ActorOpts, ActorStatus, Behavior, BehaviorSpec, CallOutcome,
    CastOutcome, DeclarativeActor, EventLoop, EventLoopHost, MatchPattern, Outcome, RestartPolicy,
    SendPattern,
};
pub use clock::{CallReply, DispatchMode, VirtualClock};
pub use coordinator::{CoordinatorResults, SimulationBuilder, Simulation};
pub use error::{ChronosimError, Result};
pub use message::{downcast_ref, message, BoxMessage, Emission, Message, MessageKind, SendTarget};
pub use queue::EventHandle;
pub use stats::{ActorStats, ActorStatsSnapshot, NullTraceSink, TraceEvent, TraceSink, VecTraceSink};
pub use time::{TickDuration, VirtualTime};
