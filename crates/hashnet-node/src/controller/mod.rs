//! Order lifecycle controller
//!
//! Polls the machine record on a fixed interval and walks each assigned
//! order through `WAITING → FETCHING_ASSETS → RUNNING → TERMINAL`:
//!
//! - **WAITING**: Idle and ForRent do nothing. Renting with a Preparing
//!   order starts fulfillment inside the same tick.
//! - **FETCHING_ASSETS**: decode the order metadata, issue a session token,
//!   pull assets (best effort), start the workload and report the start.
//! - **RUNNING**: re-read the order each tick until its duration elapses
//!   (stop, benchmark, Completed report) or the buyer is refunded (stop
//!   only).
//! - **TERMINAL**: one outcome is recorded and the controller is back in
//!   WAITING for the next tick.
//!
//! A Completed or Failed report is only ever submitted for an order whose
//! start this controller reported itself.

mod fulfillment;
mod outcome;
mod supervision;

pub use outcome::{LifecycleState, SkipReason, TickOutcome};

use crate::context::NodeContext;
use crate::runtime::WorkloadHandle;
use hashnet_types::{AccountRef, EventSource, Intent, NodeEvent, OrderRef, Termination};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// The order this host started and is supervising
#[derive(Debug, Clone)]
struct ActiveOrder {
    order: OrderRef,
    buyer: AccountRef,
    intent: Intent,
    handle: WorkloadHandle,
}

#[derive(Debug)]
enum Phase {
    Waiting,
    Running(ActiveOrder),
}

/// Drives order fulfillment for this host
pub struct OrderLifecycleController {
    ctx: NodeContext,
    phase: Phase,
}

impl OrderLifecycleController {
    pub fn new(ctx: NodeContext) -> Self {
        Self {
            ctx,
            phase: Phase::Waiting,
        }
    }

    /// Current persistent state
    pub fn state(&self) -> LifecycleState {
        match self.phase {
            Phase::Waiting => LifecycleState::Waiting,
            Phase::Running(_) => LifecycleState::Running,
        }
    }

    /// Order under supervision, if any
    pub fn active_order(&self) -> Option<&OrderRef> {
        match &self.phase {
            Phase::Waiting => None,
            Phase::Running(active) => Some(&active.order),
        }
    }

    /// Evaluate the state machine once.
    #[instrument(skip_all, fields(state = ?self.state()))]
    pub async fn tick(&mut self) -> TickOutcome {
        match std::mem::replace(&mut self.phase, Phase::Waiting) {
            Phase::Waiting => self.poll_machine().await,
            Phase::Running(active) => self.supervise(active).await,
        }
    }

    /// Tick every poll interval until `cancel` fires. The first tick comes
    /// one interval after start.
    pub async fn run(mut self, cancel: CancellationToken) {
        let period = self.ctx.config.scheduler.poll_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = period.as_secs(), "Order controller started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    tracing::debug!(?outcome, "Controller tick finished");
                }
            }
        }

        if let Some(order) = self.active_order() {
            warn!(order = %order, "Controller stopped while supervising an order");
        }
        info!("Order controller stopped");
    }

    /// Record the end of supervision. The phase is already `Waiting`.
    fn terminate(&mut self, order: OrderRef, termination: Termination) -> TickOutcome {
        match &termination {
            Termination::Completed | Termination::Refunded => {
                info!(order = %order, state = ?LifecycleState::Terminal, ?termination, "Order supervision ended");
            }
            Termination::StartFailed { .. } => {
                warn!(order = %order, state = ?LifecycleState::Terminal, ?termination, "Order supervision ended");
            }
            _ => {
                error!(order = %order, state = ?LifecycleState::Terminal, ?termination, "Order supervision ended");
            }
        }

        self.ctx.emit(
            EventSource::Controller,
            NodeEvent::OrderTerminated {
                order: order.clone(),
                termination: termination.clone(),
            },
        );
        TickOutcome::Terminated { order, termination }
    }
}
