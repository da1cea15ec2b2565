//! Small, reusable actor building blocks on top of `chronosim`'s public
//! API — the same role `nexosim-util` plays for `nexosim`.

use chronosim::{message, ActorContext, ActorName, BoxMessage, CallOutcome, CastOutcome, EventLoop};

/// An event-loop actor that counts every message it receives and reports
/// the running total in response to a `call`.
pub struct Accumulator;

/// `Accumulator`'s reply to a `call`: the running total at the time of the
/// call.
#[derive(Debug, Clone, PartialEq)]
pub struct Total(pub u64);

#[derive(Debug, Default)]
pub struct AccumulatorState {
    count: u64,
}

impl EventLoop for Accumulator {
    type State = AccumulatorState;

    fn init(&mut self, _ctx: &ActorContext) -> Self::State {
        AccumulatorState::default()
    }

    fn handle_call(
        &mut self,
        state: Self::State,
        _ctx: &ActorContext,
        _from: Option<&ActorName>,
        _payload: &BoxMessage,
    ) -> CallOutcome<Self::State> {
        let reply = message(Total(state.count));
        CallOutcome::Reply(reply, state)
    }

    fn handle_cast(
        &mut self,
        mut state: Self::State,
        _ctx: &ActorContext,
        _from: Option<&ActorName>,
        _payload: &BoxMessage,
    ) -> CastOutcome<Self::State> {
        state.count += 1;
        CastOutcome::Ok(state)
    }
}

/// An event-loop actor that forwards every message it receives, verbatim,
/// to a fixed configured target.
pub struct Echo {
    target: ActorName,
}

impl Echo {
    pub fn new(target: impl Into<ActorName>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl EventLoop for Echo {
    type State = ();

    fn init(&mut self, _ctx: &ActorContext) -> Self::State {}

    fn handle_call(
        &mut self,
        state: Self::State,
        ctx: &ActorContext,
        _from: Option<&ActorName>,
        payload: &BoxMessage,
    ) -> CallOutcome<Self::State> {
        ctx.send(self.target.clone(), payload.clone());
        CallOutcome::NoReply(state)
    }

    fn handle_cast(
        &mut self,
        state: Self::State,
        ctx: &ActorContext,
        _from: Option<&ActorName>,
        payload: &BoxMessage,
    ) -> CastOutcome<Self::State> {
        ctx.send(self.target.clone(), payload.clone());
        CastOutcome::Ok(state)
    }
}

/// An in-memory [`chronosim::TraceSink`], handed out ready to attach via
/// `SimulationBuilder::with_tracing`. `chronosim` itself defines the type
/// (`VecTraceSink`) since the coordinator needs a concrete default sink to
/// hand back from a hypothetical `get_trace()`; this is just the
/// discoverable name for it in this crate's public API.
pub use chronosim::VecTraceSink as TraceRecorder;

#[cfg(test)]
mod tests {
    use super::*;
    use chronosim::{ActorOpts, DispatchMode, EventLoopHost, SimulationBuilder, TickDuration};

    #[test]
    fn accumulator_counts_casts_and_reports_total_on_call() {
        let sim = SimulationBuilder::new()
            .with_dispatch_mode(DispatchMode::Cooperative)
            .add_actor(
                "acc",
                EventLoopHost::new(Accumulator),
                ActorOpts::default(),
            )
            .build()
            .unwrap();

        for _ in 0..3 {
            sim.schedule("acc", message(()), TickDuration::ZERO).unwrap();
        }
        sim.run_for(TickDuration::from_ticks(1));
    }

    #[test]
    fn echo_forwards_to_its_configured_target() {
        let sim = SimulationBuilder::new()
            .with_dispatch_mode(DispatchMode::Cooperative)
            .add_actor(
                "forwarder",
                EventLoopHost::new(Echo::new("sink")),
                ActorOpts::default(),
            )
            .add_actor(
                "sink",
                EventLoopHost::new(Accumulator),
                ActorOpts::default(),
            )
            .build()
            .unwrap();

        sim.schedule("forwarder", message(7_i32), TickDuration::ZERO)
            .unwrap();
        sim.run_for(TickDuration::from_ticks(1));

        let stats = sim.actor_stats(&"sink".into()).unwrap();
        assert_eq!(stats.received, 1);
    }
}
