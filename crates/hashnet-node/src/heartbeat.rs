//! Liveness heartbeat
//!
//! Submits a liveness task on a fixed interval regardless of order
//! activity. A failed submission is logged and the next beat goes ahead as
//! scheduled.

use crate::context::NodeContext;
use crate::error::LedgerResult;
use crate::ledger::TaskSubmission;
use hashnet_types::{EventSource, NodeEvent, Receipt, SettlementPeriod, TaskId, TaskMetadata};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Periodic liveness submissions for this host
pub struct HeartbeatScheduler {
    ctx: NodeContext,
}

impl HeartbeatScheduler {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx }
    }

    /// Submit one liveness task with a fresh id for the current period.
    pub async fn beat(&self) -> LedgerResult<Receipt> {
        let task = TaskSubmission {
            task_id: TaskId::generate(),
            machine_uuid: self.ctx.machine_uuid,
            period: SettlementPeriod::at(self.ctx.clock.now()),
            metadata: TaskMetadata::default(),
        };

        match self.ctx.ledger.submit_task(&task).await {
            Ok(receipt) => {
                info!(
                    task = %task.task_id,
                    period = %task.period,
                    signature = %receipt,
                    confirmed = true,
                    "Heartbeat submitted"
                );
                self.ctx.emit(
                    EventSource::Heartbeat,
                    NodeEvent::HeartbeatConfirmed {
                        task_id: task.task_id,
                        period: task.period,
                        receipt: receipt.clone(),
                    },
                );
                Ok(receipt)
            }
            Err(e) => {
                error!(task = %task.task_id, period = %task.period, error = %e, "Heartbeat submission failed");
                self.ctx.emit(
                    EventSource::Heartbeat,
                    NodeEvent::HeartbeatFailed {
                        task_id: task.task_id,
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Beat every heartbeat interval until `cancel` fires. The first beat
    /// comes one interval after start.
    pub async fn run(self, cancel: CancellationToken) {
        let period = self.ctx.config.scheduler.heartbeat_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = period.as_secs(), "Heartbeat started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // Already logged and emitted.
                    let _ = self.beat().await;
                }
            }
        }

        info!("Heartbeat stopped");
    }
}
