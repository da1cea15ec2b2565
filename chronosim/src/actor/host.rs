//! The actor host: lifecycle state, statistics, trace emission, and the
//! object-safe [`Behavior`] seam both actor styles implement
//! (`spec.md` §4.3).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, trace, warn};

use crate::message::{BoxMessage, MessageKind};
use crate::name::ActorName;
use crate::stats::{ActorStats, ActorStatsSnapshot, TraceEvent, TraceSink};

use super::behavior::Outcome;
use super::context::ActorContext;

/// Implemented by both [`DeclarativeActor`](super::behavior::DeclarativeActor)
/// and [`EventLoopHost`](super::eventloop::EventLoopHost); the one interface
/// `ActorHost` dispatches through regardless of which style an actor was
/// written in.
pub trait Behavior: Send {
    /// Runs once, before the first message is dispatched.
    fn on_start(&mut self, _ctx: &ActorContext) {}

    /// Runs once per dispatched message.
    fn on_message(
        &mut self,
        ctx: &ActorContext,
        from: Option<&ActorName>,
        kind: MessageKind,
        payload: &BoxMessage,
    ) -> Outcome;

    /// Runs once, when the actor stops for any reason.
    fn on_stop(&mut self, _ctx: &ActorContext) {}
}

/// `spec.md` §7's lifecycle: a `Failed` state exists, which implies the
/// fuller state machine named here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStatus {
    Starting,
    Running,
    Stopped,
    Failed,
}

/// What happens after a handler failure (`spec.md` §7, scenario 6's "if the
/// actor policy allows"). `Never` is the default so out-of-the-box behavior
/// matches a host with no configured restart option at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    #[default]
    Never,
    OnFailure {
        max_restarts: u32,
    },
}

/// Per-actor construction-time configuration.
#[derive(Debug, Clone)]
pub struct ActorOpts {
    pub restart_policy: RestartPolicy,
    pub stats_enabled: bool,
    /// Bounded inbox capacity under `DispatchMode::Feedback`; unused under
    /// `DispatchMode::Cooperative`, which has no standalone mailbox to bound
    /// (dispatch runs in-line on the caller's stack).
    pub mailbox_capacity: usize,
}

impl Default for ActorOpts {
    fn default() -> Self {
        Self {
            restart_policy: RestartPolicy::Never,
            stats_enabled: false,
            mailbox_capacity: 1024,
        }
    }
}

/// One registered actor: its behavior, lifecycle state, statistics, and
/// restart bookkeeping. Owned exclusively by whichever dispatch strategy is
/// running it (a `Mutex<ActorHost>` under `Cooperative`, moved onto its
/// dedicated thread under `Feedback`).
pub struct ActorHost {
    name: ActorName,
    behavior: Box<dyn Behavior>,
    status: ActorStatus,
    stats: Arc<Mutex<ActorStats>>,
    trace_sink: std::sync::Arc<dyn TraceSink>,
    restart_policy: RestartPolicy,
    restarts_used: u32,
    started: bool,
}

impl ActorHost {
    pub fn new(
        name: ActorName,
        behavior: Box<dyn Behavior>,
        opts: &ActorOpts,
        stats: Arc<Mutex<ActorStats>>,
        trace_sink: std::sync::Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            name,
            behavior,
            status: ActorStatus::Starting,
            stats,
            trace_sink,
            restart_policy: opts.restart_policy,
            restarts_used: 0,
            started: false,
        }
    }

    pub fn status(&self) -> ActorStatus {
        self.status
    }

    pub fn stats_snapshot(&self) -> ActorStatsSnapshot {
        let stats = self.stats.lock();
        ActorStatsSnapshot {
            sent: stats.sent_count,
            received: stats.received_count,
            failed: stats.failed_count,
            sent_rate: 0.0,
            received_rate: 0.0,
            sent_log: stats.sent_log.clone(),
            received_log: stats.received_log.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ActorStatus::Stopped | ActorStatus::Failed)
    }

    fn ensure_started(&mut self, ctx: &ActorContext) {
        if !self.started {
            self.started = true;
            self.behavior.on_start(ctx);
            self.status = ActorStatus::Running;
        }
    }

    /// Runs `on_start` up front, before any message has been dispatched.
    /// `spec.md` §4.4 "`run(duration)` ... starts pattern-driven senders for
    /// all registered actors": a [`PatternDriver`](crate::coordinator)'s
    /// first self-scheduled tick happens in its `on_start`, so without an
    /// explicit kick at build time it would never receive the first envelope
    /// needed to trigger `on_start` lazily; nothing would ever send it one.
    pub fn start(&mut self, ctx: &ActorContext) {
        self.ensure_started(ctx);
    }

    /// Delivers one envelope to this actor. Returns the reply payload when
    /// the behavior produced one (meaningful only for `MessageKind::Call`).
    ///
    /// A panic inside user code is caught (`spec.md` §7: a handler failure
    /// transitions the actor to `Failed` rather than unwinding through the
    /// host) and treated identically to an explicit `Outcome::Fail`.
    pub fn dispatch_envelope(
        &mut self,
        ctx: &ActorContext,
        from: Option<ActorName>,
        kind: MessageKind,
        payload: BoxMessage,
    ) -> Option<BoxMessage> {
        if self.is_terminal() {
            return None;
        }

        self.ensure_started(ctx);

        // Internal bookkeeping (pump ticks and the like) is never counted or
        // traced (`spec.md` §4.3).
        if kind != MessageKind::Internal {
            self.stats.lock().record_received(&payload);
            self.trace_sink.record(TraceEvent {
                timestamp: ctx.now(),
                from: from.clone(),
                to: self.name.clone(),
                payload: payload.clone(),
                kind,
            });
        }
        trace!(actor = %self.name, kind = kind_label(kind), "dispatching");

        let behavior = &mut self.behavior;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            behavior.on_message(ctx, from.as_ref(), kind, &payload)
        }));

        match outcome {
            Ok(Outcome::Ok) => None,
            Ok(Outcome::Reply(reply)) => {
                if kind != MessageKind::Call {
                    warn!(actor = %self.name, "reply(..) produced outside of a call; discarding");
                    None
                } else {
                    Some(reply)
                }
            }
            Ok(Outcome::Stop) => {
                self.stop(ctx);
                None
            }
            Ok(Outcome::Fail(reason)) => {
                self.fail(ctx, &reason);
                None
            }
            Err(panic) => {
                let reason = panic_message(&panic);
                self.fail(ctx, &reason);
                None
            }
        }
    }

    fn stop(&mut self, ctx: &ActorContext) {
        self.behavior.on_stop(ctx);
        self.status = ActorStatus::Stopped;
    }

    fn fail(&mut self, ctx: &ActorContext, reason: &str) {
        error!(actor = %self.name, reason, "actor handler failed");
        self.stats.lock().record_failure();
        self.behavior.on_stop(ctx);
        self.status = ActorStatus::Failed;

        if let RestartPolicy::OnFailure { max_restarts } = self.restart_policy {
            if self.restarts_used < max_restarts {
                self.restarts_used += 1;
                self.started = false;
                self.status = ActorStatus::Starting;
            }
        }
    }

}

fn kind_label(kind: MessageKind) -> &'static str {
    kind.trace_label()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "actor panicked with a non-string payload".to_string()
    }
}
