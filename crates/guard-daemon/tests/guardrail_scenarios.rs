//! Guardrail and kill switch scenarios against the assembled service.

mod integration;
use integration::common::harness::{alice, bob, buy, eventually, Harness};

use guard_persistence::AuditEvent;
use guard_risk::{CloseAllStatus, KillSwitchStatus, RejectCode, TriggerOutcome};
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_oversized_intent_rejected_for_position_size() {
    let h = Harness::new();
    let decision = h.engine().validate_trade(&buy(alice(), dec!(150000))).await;
    assert_eq!(decision.code(), Some(RejectCode::PositionSize));

    // Size wins even when other checks would also fail.
    let mut intent = buy(alice(), dec!(150000));
    intent.stop_loss = None;
    intent.take_profit = None;
    let decision = h.engine().validate_trade(&intent).await;
    assert_eq!(decision.code(), Some(RejectCode::PositionSize));
}

#[tokio::test]
async fn test_daily_loss_limit_scenario() {
    let h = Harness::new();
    let engine = h.engine();

    // -1800 on 100000 equity leaves the day at -1.8%.
    let stats = engine.record_trade_closed(&alice(), dec!(-1800)).await.unwrap();
    assert_eq!(stats.cumulative_pl_pct, dec!(-1.8));

    // 50000 units with a 0.0100 stop risk 500, about 0.5% of equity.
    let decision = engine.validate_trade(&buy(alice(), dec!(50000))).await;
    assert_eq!(decision.code(), Some(RejectCode::DailyLoss));

    // A tenth of the size stays inside the limit.
    let decision = engine.validate_trade(&buy(alice(), dec!(5000))).await;
    assert!(decision.is_allow());
}

#[tokio::test]
async fn test_every_validation_is_audited_in_order() {
    let h = Harness::new();
    let engine = h.engine();
    engine.validate_trade(&buy(alice(), dec!(1000))).await;
    engine.validate_trade(&buy(alice(), dec!(150000))).await;
    engine.validate_trade(&buy(bob(), dec!(1000))).await;

    let entries = engine.audit_since(&alice(), 0);
    let events: Vec<_> = entries.iter().map(|e| e.event.clone()).collect();
    assert_eq!(events, vec![AuditEvent::TradeAllowed, AuditEvent::TradeRejected]);
    assert!(entries[0].seq < entries[1].seq);
    assert!(entries[1].reasons[0].starts_with("POSITION_SIZE"));
    assert_eq!(engine.audit_since(&bob(), 0).len(), 1);
}

#[tokio::test]
async fn test_kill_switch_halts_until_reset() {
    let h = Harness::new();
    let engine = h.engine();

    for _ in 0..3 {
        assert!(engine.execute_trade(&buy(alice(), dec!(1000))).await.is_filled());
    }
    assert_eq!(h.broker.positions(&alice()).len(), 3);

    assert_eq!(
        engine.trigger_kill_switch(&alice(), "runaway losses"),
        TriggerOutcome::Transitioned
    );
    // Visible immediately, before any cleanup completes.
    for size in [dec!(1), dec!(1000), dec!(150000)] {
        let decision = engine.validate_trade(&buy(alice(), size)).await;
        assert_eq!(decision.code(), Some(RejectCode::Halted));
    }
    let report = engine.execute_trade(&buy(alice(), dec!(1000))).await;
    assert_eq!(report.decision.code(), Some(RejectCode::Halted));
    assert!(report.execution.is_none());

    // Other users keep trading.
    assert!(engine.validate_trade(&buy(bob(), dec!(1000))).await.is_allow());

    assert!(
        eventually(|| matches!(
            engine.kill_switch_status(&alice()).close_all,
            CloseAllStatus::Completed { closed: 3 }
        ))
        .await
    );
    assert!(h.broker.positions(&alice()).is_empty());

    assert_eq!(
        engine.trigger_kill_switch(&alice(), "again"),
        TriggerOutcome::AlreadyTriggered
    );

    assert_err!(engine.reset_kill_switch(&alice(), "wrong"));
    assert_eq!(
        engine.kill_switch_status(&alice()).status,
        KillSwitchStatus::Triggered
    );
    assert!(assert_ok!(engine.reset_kill_switch(&alice(), "op")));
    assert!(engine.validate_trade(&buy(alice(), dec!(1000))).await.is_allow());

    // Cleanup freed the slots taken by the closed positions.
    let mut freed = false;
    for _ in 0..200 {
        if engine.risk_assessment(&alice()).await.unwrap().open_positions == 0 {
            freed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(freed);
}

#[tokio::test]
async fn test_partial_close_reports_failures() {
    let h = Harness::new();
    let engine = h.engine();
    engine.execute_trade(&buy(alice(), dec!(1000))).await;
    engine.execute_trade(&buy(alice(), dec!(1000))).await;

    let stuck = h.broker.positions(&alice())[0].position_id.clone();
    h.broker.fail_close(&stuck, 10);

    engine.trigger_kill_switch(&alice(), "broker flaky");
    assert!(
        eventually(|| matches!(
            engine.kill_switch_status(&alice()).close_all,
            CloseAllStatus::Partial { closed: 1, failed: 1 }
        ))
        .await
    );
    assert_eq!(
        engine.kill_switch_status(&alice()).status,
        KillSwitchStatus::Triggered
    );

    let failures = engine
        .audit_since(&alice(), 0)
        .into_iter()
        .filter(|e| matches!(e.event, AuditEvent::PositionCloseFailed { .. }))
        .count();
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_concurrent_submissions_respect_position_limit() {
    let h = Harness::new();
    let engine = h.engine().clone();

    // bob has the default limit of five open positions.
    let mut handles = Vec::new();
    for _ in 0..12 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.execute_trade(&buy(bob(), dec!(100))).await
        }));
    }
    let mut filled = 0;
    for handle in handles {
        if handle.await.unwrap().is_filled() {
            filled += 1;
        }
    }
    assert_eq!(filled, 5);
    assert_eq!(h.broker.positions(&bob()).len(), 5);
    let assessment = engine.risk_assessment(&bob()).await.unwrap();
    assert_eq!(assessment.open_positions, 5);
}
