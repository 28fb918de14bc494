//! Trader adapter lifecycle: query phase, accounting, risk gate,
//! self-match lockout.

use kestrel_core::policy::{ActionPolicy, ActionRule, ActionType};
use kestrel_core::testing::{MockBroker, RecordingSink, SinkEvent};
use kestrel_core::trader::{RiskMonitor, RiskParams, TraderAdapter};
use kestrel_core::AdapterState;
use std::sync::Arc;

fn default_policy() -> Arc<ActionPolicy> {
    let mut policy = ActionPolicy::default();
    policy.insert_group(
        "default",
        vec![
            ActionRule {
                action: ActionType::CloseToday,
                limit: 100,
                limit_long: 0,
                limit_short: 0,
                pure: false,
            },
            ActionRule {
                action: ActionType::Close,
                limit: 100,
                limit_long: 0,
                limit_short: 0,
                pure: false,
            },
            ActionRule {
                action: ActionType::Open,
                limit: 100,
                limit_long: 0,
                limit_short: 0,
                pure: false,
            },
        ],
        &[],
    );
    Arc::new(policy)
}

fn ready_adapter(broker: &Arc<MockBroker>) -> Arc<TraderAdapter> {
    let adapter = TraderAdapter::new("t0", default_policy());
    adapter.set_broker(broker.clone());
    adapter.run();
    assert!(adapter.is_ready());
    adapter
}

#[test]
fn test_query_phase_reaches_all_ready() {
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", true, 50.0, 30.0);

    let adapter = TraderAdapter::new("t0", default_policy());
    let sink = RecordingSink::new();
    adapter.add_sink(sink.clone());
    adapter.set_broker(broker.clone());

    assert_eq!(adapter.state(), AdapterState::NotLoggedIn);
    adapter.run();

    assert_eq!(adapter.state(), AdapterState::AllReady);
    assert_eq!(adapter.trading_day(), 20240105);
    assert_eq!(adapter.get_position("SHFE.rb2501", false, 3), 80.0);

    let events = sink.take();
    assert!(events.contains(&SinkEvent::ChannelReady));
    assert!(events.iter().any(|e| matches!(
        e,
        SinkEvent::Position { code, is_long: true, total } if code == "SHFE.rb2501" && *total == 80.0
    )));
}

#[test]
fn test_login_failure_is_terminal_until_retry() {
    let broker = MockBroker::new(20240105);
    broker.set_reject_login(true);

    let adapter = TraderAdapter::new("t0", default_policy());
    adapter.set_broker(broker.clone());
    adapter.run();

    assert_eq!(adapter.state(), AdapterState::LoginFailed);
    assert!(adapter.open_long("SHFE.rb2501", 4000.0, 1.0).is_err());

    broker.set_reject_login(false);
    adapter.run();
    assert!(adapter.is_ready());
}

#[test]
fn test_orders_refused_before_ready() {
    let adapter = TraderAdapter::new("t0", default_policy());
    let err = adapter.open_long("SHFE.rb2501", 4000.0, 1.0).unwrap_err();
    assert_eq!(err.kind(), "order_rejected");
}

#[test]
fn test_open_fill_grows_position_and_clears_undone() {
    let broker = MockBroker::new(20240105);
    let adapter = ready_adapter(&broker);
    let sink = RecordingSink::new();
    adapter.add_sink(sink.clone());

    let id = adapter.open_long("SHFE.rb2501", 4000.0, 5.0).unwrap();
    assert_eq!(adapter.get_undone("SHFE.rb2501"), 5.0);

    broker.ack(id);
    broker.fill(id, 5.0, "T1");

    assert_eq!(adapter.get_position("SHFE.rb2501", false, 3), 5.0);
    assert_eq!(adapter.get_position("SHFE.rb2501", true, 3), 5.0);
    assert_eq!(adapter.get_undone("SHFE.rb2501"), 0.0);

    let events = sink.take();
    assert!(events.iter().any(|e| matches!(
        e,
        SinkEvent::Trade { local_id, qty, .. } if *local_id == id && *qty == 5.0
    )));
    // Exactly one terminal order event for the id.
    let terminal: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SinkEvent::Order { local_id, left, .. } if *local_id == id && *left == 0.0))
        .collect();
    assert_eq!(terminal.len(), 1);
}

#[test]
fn test_submit_then_cancel_restores_books() {
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", true, 50.0, 30.0);
    let adapter = ready_adapter(&broker);

    let before_total = adapter.get_position("SHFE.rb2501", false, 3);
    let before_avail = adapter.get_position("SHFE.rb2501", true, 3);

    let id = adapter.close_long("SHFE.rb2501", 4000.0, 20.0, false).unwrap();
    broker.ack(id);
    // Reservation holds while the order is alive.
    assert_eq!(adapter.get_position("SHFE.rb2501", true, 3), before_avail - 20.0);
    assert_eq!(adapter.get_undone("SHFE.rb2501"), -20.0);

    assert!(adapter.cancel(id));
    broker.cancel_ack(id, 20.0);

    // Book identical to the pre-submit state once the cancel ack lands.
    assert_eq!(adapter.get_position("SHFE.rb2501", false, 3), before_total);
    assert_eq!(adapter.get_position("SHFE.rb2501", true, 3), before_avail);
    assert_eq!(adapter.get_undone("SHFE.rb2501"), 0.0);
}

#[test]
fn test_entrust_reject_releases_reservation() {
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", true, 50.0, 0.0);
    let adapter = ready_adapter(&broker);

    let id = adapter.close_long("SHFE.rb2501", 4000.0, 10.0, false).unwrap();
    assert_eq!(adapter.get_position("SHFE.rb2501", true, 3), 40.0);

    broker.reject(id, "price out of band");

    assert_eq!(adapter.get_position("SHFE.rb2501", true, 3), 50.0);
    assert_eq!(adapter.get_undone("SHFE.rb2501"), 0.0);
    assert!(adapter.orders_for("SHFE.rb2501").is_empty());
}

#[test]
fn test_order_rate_boundary() {
    let broker = MockBroker::new(20240105);
    let risk = RiskMonitor::new(
        true,
        RiskParams {
            order_rate_bound: 3,
            order_window_s: 60,
            ..Default::default()
        },
    );
    let adapter = TraderAdapter::with_risk("t0", default_policy(), risk, false);
    adapter.set_broker(broker.clone());
    adapter.run();

    // The bound-th order is accepted, the bound+1-th refused.
    for _ in 0..3 {
        assert!(adapter.open_long("SHFE.rb2501", 4000.0, 1.0).is_ok());
    }
    let err = adapter.open_long("SHFE.rb2501", 4000.0, 1.0).unwrap_err();
    assert_eq!(err.kind(), "risk_violation");

    // The code stays excluded until an operator clears it; other codes
    // keep flowing.
    assert!(adapter.open_long("SHFE.rb2501", 4000.0, 1.0).is_err());
    assert!(adapter.open_long("SHFE.hc2501", 3000.0, 1.0).is_ok());
    assert_eq!(broker.submissions.lock().len(), 4);
}

#[test]
fn test_self_match_lockout_and_ignore_flag() {
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", true, 50.0, 0.0);
    let adapter = ready_adapter(&broker);

    let buy_id = adapter.open_long("SHFE.rb2501", 4000.0, 2.0).unwrap();
    let sell_id = adapter.close_long("SHFE.rb2501", 3999.0, 2.0, false).unwrap();
    broker.ack(buy_id);
    broker.ack(sell_id);

    // One exchange match consumes both own orders: same trade ref.
    broker.fill(buy_id, 2.0, "T-X");
    broker.fill(sell_id, 2.0, "T-X");

    assert!(adapter.is_self_matched("SHFE.rb2501"));
    let err = adapter.open_long("SHFE.rb2501", 4000.0, 1.0).unwrap_err();
    assert_eq!(err.kind(), "self_match");

    // Other codes keep trading.
    assert!(adapter.open_long("SHFE.hc2501", 3000.0, 1.0).is_ok());
}

#[test]
fn test_self_match_detection_without_enforcement() {
    let broker = MockBroker::new(20240105);
    let adapter = TraderAdapter::with_risk(
        "t0",
        default_policy(),
        RiskMonitor::new(false, RiskParams::default()),
        true,
    );
    adapter.set_broker(broker.clone());
    adapter.run();

    let buy_id = adapter.open_long("SHFE.rb2501", 4000.0, 1.0).unwrap();
    let sell_id = adapter.open_short("SHFE.rb2501", 3999.0, 1.0).unwrap();
    broker.ack(buy_id);
    broker.ack(sell_id);
    broker.fill(buy_id, 1.0, "T-Y");
    broker.fill(sell_id, 1.0, "T-Y");

    // Recorded but not enforced.
    assert!(!adapter.is_self_matched("SHFE.rb2501"));
    assert!(adapter.open_long("SHFE.rb2501", 4000.0, 1.0).is_ok());
}

#[test]
fn test_partial_fill_then_cancel() {
    let broker = MockBroker::new(20240105);
    let adapter = ready_adapter(&broker);

    let id = adapter.open_long("SHFE.rb2501", 4000.0, 10.0).unwrap();
    broker.ack(id);
    broker.fill(id, 4.0, "T1");

    assert_eq!(adapter.get_position("SHFE.rb2501", false, 3), 4.0);
    assert_eq!(adapter.get_undone("SHFE.rb2501"), 6.0);

    assert!(adapter.cancel(id));
    broker.cancel_ack(id, 6.0);

    assert_eq!(adapter.get_position("SHFE.rb2501", false, 3), 4.0);
    assert_eq!(adapter.get_undone("SHFE.rb2501"), 0.0);
    assert!(adapter.orders_for("SHFE.rb2501").is_empty());
}

#[test]
fn test_cancel_for_filters_by_side() {
    let broker = MockBroker::new(20240105);
    let adapter = ready_adapter(&broker);

    let b1 = adapter.open_long("SHFE.rb2501", 4000.0, 1.0).unwrap();
    let b2 = adapter.open_long("SHFE.rb2501", 3999.0, 1.0).unwrap();
    let s1 = adapter.open_short("SHFE.rb2501", 4005.0, 1.0).unwrap();
    for id in [b1, b2, s1] {
        broker.ack(id);
    }

    let canceled = adapter.cancel_for("SHFE.rb2501", true, 0.0);
    assert_eq!(canceled.len(), 2);
    assert!(canceled.contains(&b1) && canceled.contains(&b2));
    assert_eq!(broker.cancels.lock().len(), 2);
}

#[test]
fn test_disconnect_relogs_and_requeries() {
    let broker = MockBroker::new(20240105);
    let adapter = TraderAdapter::new("t0", default_policy());
    let sink = RecordingSink::new();
    adapter.add_sink(sink.clone());
    adapter.set_broker(broker.clone());
    adapter.run();
    assert!(adapter.is_ready());
    sink.take();

    broker.drop_connection();

    // The mock answers the re-login cycle synchronously, so the adapter is
    // ready again; the lost/ready pair must both have been observed.
    assert!(adapter.is_ready());
    let events = sink.take();
    let lost = events.iter().position(|e| *e == SinkEvent::ChannelLost);
    let ready = events.iter().position(|e| *e == SinkEvent::ChannelReady);
    assert!(lost.is_some() && ready.is_some());
    assert!(lost.unwrap() < ready.unwrap());
}

#[test]
fn test_unknown_order_push_creates_phantom() {
    let broker = MockBroker::new(20240105);
    let adapter = ready_adapter(&broker);

    broker.push_foreign_order(
        "EXT-1",
        "SHFE.rb2501",
        kestrel_core::Side::Buy,
        3.0,
        kestrel_core::OrderState::Submitted,
    );

    let alive = adapter.orders_for("SHFE.rb2501");
    assert_eq!(alive.len(), 1);
    assert_eq!(alive[0].total, 3.0);
    assert_eq!(adapter.get_undone("SHFE.rb2501"), 3.0);
}

#[test]
fn test_positions_stay_consistent_through_flow() {
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", true, 50.0, 30.0);
    let adapter = ready_adapter(&broker);

    let c1 = adapter.close_long("SHFE.rb2501", 4000.0, 60.0, false).unwrap();
    broker.ack(c1);
    broker.fill(c1, 60.0, "T1");
    // 50 yesterday drained first, 10 spilled into today.
    assert_eq!(adapter.get_position("SHFE.rb2501", false, 3), 20.0);
    assert_eq!(adapter.get_position("SHFE.rb2501", true, 3), 20.0);

    let o1 = adapter.open_long("SHFE.rb2501", 4001.0, 5.0).unwrap();
    broker.ack(o1);
    broker.fill(o1, 5.0, "T2");
    assert_eq!(adapter.get_position("SHFE.rb2501", false, 3), 25.0);
}
