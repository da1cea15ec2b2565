//! Error kinds, modeled on the teacher's small `Display + Error` structs
//! (`ScheduledTimeError`, `CancellationError`, `QueryError`) but unified into
//! one enum since `spec.md` §7 defines the error surface as a single flat
//! table of kinds and policies rather than one type per call site.

use thiserror::Error;

use crate::actor::ActorName;

pub type Result<T> = std::result::Result<T, ChronosimError>;

/// The error kinds and policies of `spec.md` §7.
///
/// `UnknownTarget` is deliberately *not* surfaced through this type for
/// `cast`/plain sends: per §7 those are dropped silently with no stat
/// increment. It is surfaced here only for APIs that need to report it, such
/// as `chronosim-util`'s `Echo` actor reporting a misconfigured target at
/// registration time.
#[derive(Debug, Error)]
pub enum ChronosimError {
    /// A negative delay/amount, or a zero `rate(..)` send-pattern argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A send addressed to a name with no registered actor.
    #[error("no actor is registered under the name '{0}'")]
    UnknownTarget(ActorName),

    /// A scheduled event's handle was already dispatched, cancelled, or never
    /// existed.
    #[error("no scheduled event is associated with this handle")]
    UnknownHandle,

    /// A `run`/`schedule`/`cancel` call made after `stop()`.
    #[error("the simulation has already been stopped")]
    Stopped,

    /// An actor name was registered twice.
    #[error("an actor named '{0}' is already registered")]
    DuplicateActor(ActorName),
}
