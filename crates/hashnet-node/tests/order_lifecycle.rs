//! Order lifecycle controller against the simulated ledger

mod common;

use chrono::Duration;
use common::*;
use hashnet_node::ledger::{LedgerCall, LedgerOp};
use hashnet_node::{LedgerError, LifecycleState, SkipReason, TickOutcome};
use hashnet_node::session::SessionStore;
use hashnet_types::{
    AccountRef, DownloadItem, MachineRecord, MachineStatus, NodeEvent, OrderRecord, OrderRef,
    OrderStatus, SessionKey, Termination,
};

fn order() -> OrderRef {
    OrderRef::new("order-1")
}

/// Place a train order and run the tick that starts it.
async fn started(h: &Harness, hours: u32) -> hashnet_node::OrderLifecycleController {
    h.place_order(&order(), hours, &metadata("train", &[])).await;
    let mut controller = h.controller();
    let outcome = controller.tick().await;
    assert!(matches!(outcome, TickOutcome::Started { .. }), "{:?}", outcome);
    assert_eq!(controller.state(), LifecycleState::Running);
    controller
}

#[tokio::test]
async fn test_idle_and_for_rent_do_nothing() {
    let h = Harness::new();
    let mut controller = h.controller();

    for status in [MachineStatus::Idle, MachineStatus::ForRent] {
        h.ledger
            .seed_machine(MachineRecord {
                status,
                order: None,
                metadata: "{}".into(),
            })
            .await;

        assert_eq!(controller.tick().await, TickOutcome::Idle { status });
        assert_eq!(controller.state(), LifecycleState::Waiting);
    }

    assert!(h.journal.calls().is_empty());
    assert!(h.ledger.submissions().await.is_empty());
}

#[tokio::test]
async fn test_renting_without_order_reference() {
    let h = Harness::new();
    let mut rx = h.subscribe();
    h.ledger
        .seed_machine(MachineRecord {
            status: MachineStatus::Renting,
            order: None,
            metadata: "{}".into(),
        })
        .await;

    let outcome = h.controller().tick().await;

    assert_eq!(outcome, TickOutcome::Skipped(SkipReason::OrderReferenceMissing));
    assert!(h.journal.calls().is_empty());
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [NodeEvent::OrderReferenceMissing]
    ));
}

#[tokio::test]
async fn test_ledger_outage_skips_tick() {
    let h = Harness::new();
    h.ledger
        .inject_failure(LedgerOp::FetchMachine, LedgerError::Transport("timeout".into()))
        .await;

    let mut controller = h.controller();
    let outcome = controller.tick().await;
    assert!(matches!(
        outcome,
        TickOutcome::Skipped(SkipReason::LedgerUnavailable(_))
    ));
    assert_eq!(controller.state(), LifecycleState::Waiting);

    // Retried on the next tick.
    h.place_order(&order(), 1, &metadata("train", &[])).await;
    assert!(matches!(controller.tick().await, TickOutcome::Started { .. }));
}

#[tokio::test]
async fn test_train_order_runs_to_completion() {
    let h = Harness::new();
    let mut rx = h.subscribe();
    let mut controller = started(&h, 1).await;

    let record = h.ledger.order(&order()).await.unwrap();
    assert_eq!(record.status, OrderStatus::Training);
    assert_eq!(record.start_time, t0());

    // Session carries the buyer and a fresh token.
    let state = h.session.load_state().await.unwrap();
    assert_eq!(state.buyer, Some(AccountRef::new(BUYER)));
    assert_eq!(state.token.unwrap().as_str().len(), 32);

    // Scenario: poll at T+61min.
    h.clock.advance(Duration::minutes(61));
    let outcome = controller.tick().await;
    assert_eq!(
        outcome,
        TickOutcome::Terminated {
            order: order(),
            termination: Termination::Completed,
        }
    );
    assert_eq!(controller.state(), LifecycleState::Waiting);

    assert_eq!(h.journal.count(|c| matches!(c, Call::Stop { .. })), 1);
    assert_eq!(h.journal.count(|c| matches!(c, Call::Score)), 1);
    assert_eq!(h.journal.count(|c| matches!(c, Call::OrderCompleted { .. })), 1);
    let stop = h.journal.position(|c| matches!(c, Call::Stop { .. })).unwrap();
    let report = h
        .journal
        .position(|c| matches!(c, Call::OrderCompleted { .. }))
        .unwrap();
    assert!(stop < report);

    match h.ledger.submissions().await.last().unwrap() {
        LedgerCall::OrderCompleted { metadata, score, .. } => {
            assert_eq!(*score, 91);
            assert_eq!(metadata.machine_accounts, MACHINE_ACCOUNT);
        }
        other => panic!("unexpected submission: {:?}", other),
    }
    assert_eq!(
        h.ledger.order(&order()).await.unwrap().status,
        OrderStatus::Completed
    );

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, NodeEvent::OrderCompleted { score: 91, .. })));
}

#[tokio::test]
async fn test_no_completion_before_duration_elapses() {
    let h = Harness::new();
    let mut controller = started(&h, 2).await;

    for minutes in [1, 30, 119] {
        h.clock.set(t0() + Duration::minutes(minutes));
        match controller.tick().await {
            TickOutcome::Supervising { order: o, remaining } => {
                assert_eq!(o, order());
                assert_eq!(remaining, Duration::minutes(120 - minutes));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    assert_eq!(h.journal.count(|c| matches!(c, Call::Stop { .. })), 0);
    assert_eq!(h.journal.count(|c| matches!(c, Call::OrderCompleted { .. })), 0);
    assert_eq!(controller.active_order(), Some(&order()));

    let end = h.session.get(SessionKey::OrderEndTime).await.unwrap();
    assert_eq!(end.as_deref(), Some("2024-03-01T14:00:00Z"));

    // Exactly at the end time the order completes.
    h.clock.set(t0() + Duration::hours(2));
    assert_eq!(
        controller.tick().await.termination(),
        Some(&Termination::Completed)
    );
}

#[tokio::test]
async fn test_repeated_polls_submit_nothing_extra() {
    let h = Harness::new();
    let mut controller = started(&h, 1).await;
    h.clock.advance(Duration::minutes(61));
    controller.tick().await;
    let submitted = h.journal.submissions();

    // Machine is back on offer.
    for _ in 0..3 {
        assert_eq!(
            controller.tick().await,
            TickOutcome::Idle {
                status: MachineStatus::ForRent
            }
        );
    }
    assert_eq!(h.journal.submissions(), submitted);
}

#[tokio::test]
async fn test_lagging_machine_record_does_not_restart_order() {
    let h = Harness::new();
    h.ledger
        .seed_machine(MachineRecord {
            status: MachineStatus::Renting,
            order: Some(order()),
            metadata: "{}".into(),
        })
        .await;
    h.ledger
        .seed_order(
            order(),
            OrderRecord {
                status: OrderStatus::Completed,
                buyer: AccountRef::new(BUYER),
                start_time: t0(),
                duration_hours: 1,
                metadata: metadata("train", &[]),
            },
        )
        .await;

    let mut controller = h.controller();
    for _ in 0..2 {
        assert_eq!(
            controller.tick().await,
            TickOutcome::Skipped(SkipReason::OrderNotPreparing {
                order: order(),
                status: OrderStatus::Completed,
            })
        );
    }
    assert!(h.journal.calls().is_empty());
}

#[tokio::test]
async fn test_refund_stops_workload_without_report() {
    let h = Harness::new();
    let mut controller = started(&h, 4).await;

    h.ledger.refund(&order()).await.unwrap();
    let outcome = controller.tick().await;

    assert_eq!(outcome.termination(), Some(&Termination::Refunded));
    assert_eq!(
        h.journal.calls().last(),
        Some(&Call::Stop {
            id: "ctr-1".into()
        })
    );
    assert_eq!(
        h.journal
            .count(|c| matches!(c, Call::OrderCompleted { .. } | Call::OrderFailed { .. })),
        0
    );
    assert_eq!(controller.state(), LifecycleState::Waiting);
}

#[tokio::test]
async fn test_unknown_intent_is_terminal_without_workload() {
    let h = Harness::new();
    let mut rx = h.subscribe();
    h.place_order(&order(), 1, &metadata("unknown", &[])).await;

    let mut controller = h.controller();
    let outcome = controller.tick().await;

    assert_eq!(
        outcome.termination(),
        Some(&Termination::UnsupportedIntent {
            intent: "unknown".into()
        })
    );
    assert_eq!(controller.state(), LifecycleState::Waiting);
    assert_eq!(h.journal.workload_actions(), 0);
    assert_eq!(h.journal.submissions(), 0);
    assert!(h.session.get(SessionKey::Token).await.unwrap().is_none());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], NodeEvent::OrderTerminated { .. }));
}

#[tokio::test]
async fn test_malformed_metadata_is_terminal_without_report() {
    let h = Harness::new();
    h.place_order(&order(), 1, "{not json").await;

    let outcome = h.controller().tick().await;

    assert!(matches!(
        outcome.termination(),
        Some(Termination::MalformedMetadata { .. })
    ));
    assert!(h.journal.calls().is_empty());
}

#[tokio::test]
async fn test_asset_failure_does_not_block_start() {
    let h = Harness::new();
    let mut rx = h.subscribe();
    h.place_order(&order(), 1, &metadata("train", &["QmMissing"])).await;

    let outcome = h.controller().tick().await;

    assert!(matches!(outcome, TickOutcome::Started { .. }));
    assert_eq!(h.journal.count(|c| matches!(c, Call::StartWorkspace)), 1);
    assert_eq!(h.journal.count(|c| matches!(c, Call::OrderStart)), 1);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, NodeEvent::AssetFetchFailed { .. })));
}

#[tokio::test]
async fn test_train_assets_land_in_workspace() {
    let h = Harness::new();
    h.assets.serve(
        format!("{}/ipfs/QmManifest", IPFS),
        r#"[{"name":"model.safetensors","cid":"QmWeights"}]"#,
    );
    h.assets
        .serve(format!("{}/ipfs/QmWeights", IPFS), "weights");
    h.place_order(&order(), 1, &metadata("train", &["QmManifest"])).await;

    h.controller().tick().await;

    let workspace = h.work_dir.path().join("ml-workspace");
    let weights = std::fs::read_to_string(workspace.join("model.safetensors")).unwrap();
    assert_eq!(weights, "weights");

    let fetches: Vec<_> = h
        .journal
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Fetch { dir, names } => Some((dir, names)),
            _ => None,
        })
        .collect();
    assert_eq!(
        fetches,
        vec![
            (workspace.clone(), vec!["CID.json".to_string()]),
            (workspace, vec!["model.safetensors".to_string()]),
        ]
    );
    let last_fetch = h
        .journal
        .position(|c| matches!(c, Call::Fetch { names, .. } if names[0] == "model.safetensors"))
        .unwrap();
    let start = h.journal.position(|c| matches!(c, Call::StartWorkspace)).unwrap();
    assert!(last_fetch < start);
}

#[tokio::test]
async fn test_deploy_resolves_refs_and_removes_manifest() {
    let h = Harness::new();
    h.assets.serve(
        format!("{}/ipfs/QmDeploy", IPFS),
        r#"[{"name":"model.bin","cid":"QmModel"},{"name":"config.json","cid":"QmConfig"}]"#,
    );
    h.place_order(&order(), 1, &metadata("deploy", &["QmDeploy", "QmIgnored"]))
        .await;

    let outcome = h.controller().tick().await;

    assert!(matches!(outcome, TickOutcome::Started { .. }));
    assert_eq!(
        h.journal.count(|c| matches!(c, Call::StartDeploy { .. })),
        1
    );
    let refs = h
        .journal
        .calls()
        .into_iter()
        .find_map(|c| match c {
            Call::StartDeploy { refs } => Some(refs),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        refs,
        vec![
            DownloadItem::new(format!("{}/QmModel", IPFS), "model.bin"),
            DownloadItem::new(format!("{}/QmConfig", IPFS), "config.json"),
        ]
    );
    assert!(!h.work_dir.path().join("CID.json").exists());
    assert!(h.session.get(SessionKey::Buyer).await.unwrap().is_some());
}

#[tokio::test]
async fn test_start_failure_reports_failed_once() {
    let h = Harness::new();
    h.runtime.fail_start_with("no space left on device");
    h.place_order(&order(), 1, &metadata("train", &[])).await;

    let mut controller = h.controller();
    let outcome = controller.tick().await;

    assert!(matches!(
        outcome.termination(),
        Some(Termination::StartFailed { .. })
    ));
    assert_eq!(controller.state(), LifecycleState::Waiting);
    assert_eq!(h.journal.count(|c| matches!(c, Call::OrderStart)), 0);
    assert_eq!(h.journal.count(|c| matches!(c, Call::OrderFailed { .. })), 1);

    match h.ledger.submissions().await.last() {
        Some(LedgerCall::OrderFailed {
            buyer, metadata, ..
        }) => {
            assert_eq!(buyer.as_str(), BUYER);
            assert_eq!(metadata.machine_accounts, MACHINE_ACCOUNT);
            assert!(metadata.order_info.message.contains("no space left on device"));
        }
        other => panic!("unexpected submission: {:?}", other),
    }
    assert_eq!(
        h.ledger.order(&order()).await.unwrap().status,
        OrderStatus::Failed
    );
    assert_eq!(
        h.ledger.machine().await.unwrap().status,
        MachineStatus::ForRent
    );
}

#[tokio::test]
async fn test_rejected_start_report_stops_workload() {
    let h = Harness::new();
    h.ledger
        .inject_failure(
            LedgerOp::OrderStart,
            LedgerError::Rejected {
                status: 409,
                body: "stale order".into(),
            },
        )
        .await;
    h.place_order(&order(), 1, &metadata("train", &[])).await;

    let mut controller = h.controller();
    let outcome = controller.tick().await;

    assert!(matches!(
        outcome.termination(),
        Some(Termination::StartRejected { .. })
    ));
    assert_eq!(controller.state(), LifecycleState::Waiting);

    let start = h.journal.position(|c| matches!(c, Call::OrderStart)).unwrap();
    let stop = h.journal.position(|c| matches!(c, Call::Stop { .. })).unwrap();
    assert!(start < stop);
    assert_eq!(
        h.journal
            .count(|c| matches!(c, Call::OrderCompleted { .. } | Call::OrderFailed { .. })),
        0
    );
}

#[tokio::test]
async fn test_unexpected_status_while_running_leaves_workload() {
    for status in [
        OrderStatus::Preparing,
        OrderStatus::Completed,
        OrderStatus::Failed,
    ] {
        let h = Harness::new();
        let mut controller = started(&h, 1).await;

        h.ledger.force_order_status(&order(), status).await.unwrap();
        let outcome = controller.tick().await;

        assert_eq!(
            outcome.termination(),
            Some(&Termination::Anomaly { status })
        );
        assert_eq!(controller.state(), LifecycleState::Waiting);
        assert_eq!(h.journal.count(|c| matches!(c, Call::Stop { .. })), 0);
        assert_eq!(
            h.journal
                .count(|c| matches!(c, Call::OrderCompleted { .. } | Call::OrderFailed { .. })),
            0
        );
    }
}

#[tokio::test]
async fn test_unrecognized_status_while_running() {
    let h = Harness::new();
    let mut controller = started(&h, 1).await;

    h.ledger
        .inject_failure(
            LedgerOp::FetchOrder,
            LedgerError::UnrecognizedStatus {
                kind: "order",
                value: "Disputed".into(),
            },
        )
        .await;

    assert_eq!(
        controller.tick().await.termination(),
        Some(&Termination::UnrecognizedStatus {
            value: "Disputed".into()
        })
    );
    assert_eq!(h.journal.count(|c| matches!(c, Call::Stop { .. })), 0);
}

#[tokio::test]
async fn test_benchmark_failure_abandons_completion() {
    let h = Harness::new();
    let mut controller = started(&h, 1).await;
    h.runtime.fail_score();
    h.clock.advance(Duration::hours(2));

    let outcome = controller.tick().await;

    assert!(matches!(
        outcome.termination(),
        Some(Termination::CompletionAborted { .. })
    ));
    assert_eq!(h.journal.count(|c| matches!(c, Call::Stop { .. })), 1);
    assert_eq!(h.journal.count(|c| matches!(c, Call::OrderCompleted { .. })), 0);
}

#[tokio::test]
async fn test_score_saturates_into_report() {
    let h = Harness::new();
    let mut controller = started(&h, 1).await;
    h.runtime.set_score(412.0);
    h.clock.advance(Duration::hours(1));

    controller.tick().await;

    assert_eq!(
        h.journal.count(|c| matches!(c, Call::OrderCompleted { score: 255 })),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_polls_after_first_interval() {
    let h = Harness::new();
    h.place_order(&order(), 1, &metadata("train", &[])).await;

    let cancel = tokio_util::sync::CancellationToken::new();
    let task = tokio::spawn(h.controller().run(cancel.clone()));

    tokio::time::sleep(std::time::Duration::from_secs(59)).await;
    assert_eq!(h.journal.count(|c| matches!(c, Call::StartWorkspace)), 0);

    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    assert_eq!(h.journal.count(|c| matches!(c, Call::StartWorkspace)), 1);
    assert_eq!(h.journal.count(|c| matches!(c, Call::OrderStart)), 1);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_out_of_range_duration_ends_supervision() {
    let h = Harness::new();
    let mut rx = h.subscribe();
    let mut controller = started(&h, u32::MAX).await;

    let outcome = controller.tick().await;

    assert_eq!(
        outcome.termination(),
        Some(&Termination::InvalidDuration { hours: u32::MAX })
    );
    assert_eq!(controller.state(), LifecycleState::Waiting);
    assert_eq!(h.journal.count(|c| matches!(c, Call::Stop { .. })), 0);
    assert_eq!(
        h.journal
            .count(|c| matches!(c, Call::OrderCompleted { .. } | Call::OrderFailed { .. })),
        0
    );
    assert!(h.session.get(SessionKey::OrderEndTime).await.unwrap().is_none());
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        NodeEvent::OrderTerminated {
            termination: Termination::InvalidDuration { .. },
            ..
        }
    )));
}

#[tokio::test]
async fn test_train_item_failure_does_not_block_start() {
    let h = Harness::new();
    let mut rx = h.subscribe();
    h.assets.serve(
        format!("{}/ipfs/QmManifest", IPFS),
        r#"[{"name":"model.safetensors","cid":"QmGone"}]"#,
    );
    h.place_order(&order(), 1, &metadata("train", &["QmManifest"])).await;

    let outcome = h.controller().tick().await;

    assert!(matches!(outcome, TickOutcome::Started { .. }));
    assert_eq!(h.journal.count(|c| matches!(c, Call::Fetch { .. })), 2);
    assert_eq!(h.journal.count(|c| matches!(c, Call::StartWorkspace)), 1);
    assert_eq!(h.journal.count(|c| matches!(c, Call::OrderStart)), 1);
    assert!(!h
        .work_dir
        .path()
        .join("ml-workspace")
        .join("model.safetensors")
        .exists());
    assert_eq!(
        drain(&mut rx)
            .iter()
            .filter(|e| matches!(e, NodeEvent::AssetFetchFailed { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_deploy_manifest_failure_starts_without_refs() {
    let h = Harness::new();
    let mut rx = h.subscribe();
    h.place_order(&order(), 1, &metadata("deploy", &["QmMissing"])).await;

    let outcome = h.controller().tick().await;

    assert!(matches!(outcome, TickOutcome::Started { .. }));
    assert_eq!(
        h.journal.count(|c| matches!(c, Call::StartDeploy { refs } if refs.is_empty())),
        1
    );
    assert_eq!(h.journal.count(|c| matches!(c, Call::OrderStart)), 1);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, NodeEvent::AssetFetchFailed { .. })));
}

#[tokio::test]
async fn test_session_failure_is_terminal_without_workload() {
    let h = Harness::new();
    h.place_order(&order(), 1, &metadata("train", &[])).await;
    h.session.close().await.unwrap();

    let mut controller = h.controller();
    let outcome = controller.tick().await;

    assert!(matches!(
        outcome.termination(),
        Some(Termination::SessionUnavailable { .. })
    ));
    assert_eq!(controller.state(), LifecycleState::Waiting);
    assert_eq!(h.journal.workload_actions(), 0);
    assert_eq!(h.journal.submissions(), 0);
}

#[tokio::test]
async fn test_rejected_failure_report_still_terminates() {
    let h = Harness::new();
    h.runtime.fail_start_with("image not found");
    h.ledger
        .inject_failure(
            LedgerOp::OrderFailed,
            LedgerError::Rejected {
                status: 409,
                body: "buyer mismatch".into(),
            },
        )
        .await;
    h.place_order(&order(), 1, &metadata("deploy", &[])).await;

    let mut controller = h.controller();
    let outcome = controller.tick().await;

    assert!(matches!(
        outcome.termination(),
        Some(Termination::StartFailed { .. })
    ));
    assert_eq!(controller.state(), LifecycleState::Waiting);
    assert_eq!(h.journal.count(|c| matches!(c, Call::OrderFailed { .. })), 1);
    assert_eq!(
        h.ledger.order(&order()).await.unwrap().status,
        OrderStatus::Preparing
    );
}

#[tokio::test]
async fn test_lost_order_read_while_running() {
    let h = Harness::new();
    let mut controller = started(&h, 1).await;
    h.ledger
        .inject_failure(LedgerOp::FetchOrder, LedgerError::Transport("timeout".into()))
        .await;

    let outcome = controller.tick().await;

    assert!(matches!(
        outcome.termination(),
        Some(Termination::SupervisionLost { .. })
    ));
    assert_eq!(controller.state(), LifecycleState::Waiting);
    assert_eq!(h.journal.count(|c| matches!(c, Call::Stop { .. })), 0);
    assert_eq!(
        h.journal
            .count(|c| matches!(c, Call::OrderCompleted { .. } | Call::OrderFailed { .. })),
        0
    );
}

#[tokio::test]
async fn test_unrecognized_machine_status_skips_tick() {
    let h = Harness::new();
    h.ledger
        .inject_failure(
            LedgerOp::FetchMachine,
            LedgerError::UnrecognizedStatus {
                kind: "machine",
                value: "Frozen".into(),
            },
        )
        .await;

    let mut controller = h.controller();
    assert_eq!(
        controller.tick().await,
        TickOutcome::Skipped(SkipReason::UnrecognizedStatus("Frozen".into()))
    );
    assert_eq!(controller.state(), LifecycleState::Waiting);
    assert!(h.journal.calls().is_empty());
}
