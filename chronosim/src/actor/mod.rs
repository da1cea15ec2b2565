//! Actors: identity, the declarative/event-loop behavior duality, the
//! per-dispatch context, and the host that runs either style uniformly
//! (`spec.md` §4.3).

pub mod behavior;
pub mod context;
pub mod eventloop;
pub mod host;

pub use crate::name::ActorName;
pub use behavior::{BehaviorSpec, DeclarativeActor, MatchPattern, Outcome, PayloadFn, SendPattern};
pub use context::ActorContext;
pub use eventloop::{CallOutcome, CastOutcome, EventLoop, EventLoopHost};
pub use host::{ActorHost, ActorOpts, ActorStatus, Behavior, RestartPolicy};
