//! RUNNING: supervising a started order until it ends

use super::{ActiveOrder, OrderLifecycleController, Phase, TickOutcome};
use crate::error::LedgerError;
use crate::runtime::score_to_u8;
use hashnet_types::{
    EventSource, NodeEvent, OrderRecord, OrderStatus, SessionKey, SessionState, Termination,
};
use tracing::{debug, error, info, warn};

impl OrderLifecycleController {
    pub(super) async fn supervise(&mut self, active: ActiveOrder) -> TickOutcome {
        let record = match self.ctx.ledger.fetch_order(&active.order).await {
            Ok(record) => record,
            Err(LedgerError::UnrecognizedStatus { value, .. }) => {
                return self.terminate(active.order, Termination::UnrecognizedStatus { value })
            }
            Err(e) => {
                return self.terminate(
                    active.order,
                    Termination::SupervisionLost {
                        reason: e.to_string(),
                    },
                )
            }
        };

        match record.status {
            OrderStatus::Training => self.supervise_training(active, record).await,
            OrderStatus::Refunded => {
                info!(order = %active.order, workload = %active.handle, "Order refunded, stopping workload");
                if let Err(e) = self.ctx.runtime.stop(&active.handle).await {
                    error!(order = %active.order, workload = %active.handle, error = %e, "Failed to stop workload");
                }
                self.terminate(active.order, Termination::Refunded)
            }
            // None of these can follow an accepted start report. The
            // workload is left as is.
            status @ (OrderStatus::Preparing | OrderStatus::Completed | OrderStatus::Failed) => {
                error!(
                    order = %active.order,
                    workload = %active.handle,
                    %status,
                    "Unexpected order status while running; workload left running"
                );
                self.terminate(active.order, Termination::Anomaly { status })
            }
        }
    }

    async fn supervise_training(&mut self, active: ActiveOrder, record: OrderRecord) -> TickOutcome {
        let end = match record.end_time() {
            Ok(end) => end,
            Err(e) => {
                error!(
                    order = %active.order,
                    workload = %active.handle,
                    error = %e,
                    "Order duration is out of range; workload left running"
                );
                return self.terminate(
                    active.order,
                    Termination::InvalidDuration {
                        hours: record.duration_hours,
                    },
                );
            }
        };
        if let Err(e) = self
            .ctx
            .session
            .put(SessionKey::OrderEndTime, &SessionState::format_end_time(end))
            .await
        {
            warn!(order = %active.order, error = %e, "Failed to record order end time");
        }

        let now = self.ctx.clock.now();
        if now < end {
            let remaining = end - now;
            debug!(
                order = %active.order,
                remaining_mins = remaining.num_minutes(),
                "Order still running"
            );
            let order = active.order.clone();
            self.phase = Phase::Running(active);
            return TickOutcome::Supervising { order, remaining };
        }

        info!(order = %active.order, intent = %active.intent, "Order duration elapsed, completing");
        self.complete(active, record).await
    }

    /// Stop, benchmark, report. Any failure abandons the order without a
    /// report.
    async fn complete(&mut self, active: ActiveOrder, record: OrderRecord) -> TickOutcome {
        if let Err(e) = self.ctx.runtime.stop(&active.handle).await {
            return self.completion_aborted(active, format!("stopping workload: {}", e));
        }

        let metadata = match record.decode_metadata() {
            Ok(metadata) => metadata,
            Err(e) => return self.completion_aborted(active, e.to_string()),
        };

        let score = match self.ctx.runtime.run_score(self.ctx.gpu_present()).await {
            Ok(score) => score_to_u8(score),
            Err(e) => return self.completion_aborted(active, format!("benchmark: {}", e)),
        };

        let metadata = metadata.with_machine_account(self.ctx.ledger.machine_account().as_str());
        match self
            .ctx
            .ledger
            .submit_order_completed(&active.order, &metadata, score)
            .await
        {
            Ok(receipt) => {
                info!(
                    order = %active.order,
                    buyer = %active.buyer,
                    score,
                    signature = %receipt,
                    confirmed = true,
                    "Order completion reported"
                );
                self.ctx.emit(
                    EventSource::Controller,
                    NodeEvent::OrderCompleted {
                        order: active.order.clone(),
                        score,
                        receipt,
                    },
                );
                self.terminate(active.order, Termination::Completed)
            }
            Err(e) => self.completion_aborted(active, format!("completion report: {}", e)),
        }
    }

    fn completion_aborted(&mut self, active: ActiveOrder, reason: String) -> TickOutcome {
        self.terminate(active.order, Termination::CompletionAborted { reason })
    }
}
