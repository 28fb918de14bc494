//! Direction-only intents split into offset orders under rule groups.

use kestrel_core::core::Offset;
use kestrel_core::policy::{ActionPolicy, ActionRule, ActionType};
use kestrel_core::testing::MockBroker;
use kestrel_core::trader::TraderAdapter;
use std::sync::Arc;

fn rule(action: ActionType, limit: u32) -> ActionRule {
    ActionRule {
        action,
        limit,
        limit_long: 0,
        limit_short: 0,
        pure: false,
    }
}

fn policy_with(rules: Vec<ActionRule>) -> Arc<ActionPolicy> {
    let mut policy = ActionPolicy::default();
    policy.insert_group("default", rules, &[]);
    Arc::new(policy)
}

fn adapter_with(
    policy: Arc<ActionPolicy>,
    broker: &Arc<MockBroker>,
) -> Arc<TraderAdapter> {
    let adapter = TraderAdapter::new("t0", policy);
    adapter.set_broker(broker.clone());
    adapter.run();
    assert!(adapter.is_ready());
    adapter
}

#[test]
fn test_sell_splits_close_today_close_open() {
    // Group: closetoday(100), close(100), open(100). Long book 30 today +
    // 50 yesterday. A 70-lot sell becomes closetoday 30 + close 40; the
    // open rule has nothing left to contribute.
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", true, 50.0, 30.0);
    let adapter = adapter_with(
        policy_with(vec![
            rule(ActionType::CloseToday, 100),
            rule(ActionType::Close, 100),
            rule(ActionType::Open, 100),
        ]),
        &broker,
    );

    let ids = adapter.sell("SHFE.rb2501", 4000.0, 70.0, false);
    assert_eq!(ids.len(), 2);

    let subs = broker.submissions.lock();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0].offset, Offset::CloseToday);
    assert_eq!(subs[0].qty, 30.0);
    assert_eq!(subs[1].offset, Offset::Close);
    assert_eq!(subs[1].qty, 40.0);
    assert_eq!(subs.iter().map(|e| e.qty).sum::<f64>(), 70.0);
}

#[test]
fn test_sell_overflow_spills_into_open() {
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", true, 10.0, 0.0);
    let adapter = adapter_with(
        policy_with(vec![rule(ActionType::Close, 100), rule(ActionType::Open, 100)]),
        &broker,
    );

    let ids = adapter.sell("SHFE.rb2501", 4000.0, 25.0, false);
    assert_eq!(ids.len(), 2);
    let subs = broker.submissions.lock();
    assert_eq!(subs[0].offset, Offset::Close);
    assert_eq!(subs[0].qty, 10.0);
    // The remainder opens a short position.
    assert_eq!(subs[1].offset, Offset::Open);
    assert_eq!(subs[1].qty, 15.0);
    assert_eq!(subs[1].side, kestrel_core::Side::Sell);
}

#[test]
fn test_buy_closes_short_book() {
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", false, 8.0, 0.0);
    let adapter = adapter_with(
        policy_with(vec![rule(ActionType::Close, 100), rule(ActionType::Open, 100)]),
        &broker,
    );

    let ids = adapter.buy("SHFE.rb2501", 4000.0, 5.0, false);
    assert_eq!(ids.len(), 1);
    let subs = broker.submissions.lock();
    assert_eq!(subs[0].offset, Offset::Close);
    assert_eq!(subs[0].side, kestrel_core::Side::Buy);
    assert_eq!(subs[0].qty, 5.0);
}

#[test]
fn test_pure_close_today_requires_empty_yesterday() {
    let broker = MockBroker::new(20240105);
    // Yesterday volume present: the pure close-today rule must not fire.
    broker.seed_position("SHFE.rb2501", true, 20.0, 30.0);
    let mut pure_rule = rule(ActionType::CloseToday, 100);
    pure_rule.pure = true;
    let adapter = adapter_with(
        policy_with(vec![pure_rule, rule(ActionType::Close, 100)]),
        &broker,
    );

    adapter.sell("SHFE.rb2501", 4000.0, 10.0, false);
    let subs = broker.submissions.lock();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].offset, Offset::Close);
    drop(subs);

    // With no yesterday volume the pure rule applies.
    let broker2 = MockBroker::new(20240105);
    broker2.seed_position("SHFE.rb2501", true, 0.0, 30.0);
    let mut pure_rule = rule(ActionType::CloseToday, 100);
    pure_rule.pure = true;
    let adapter2 = adapter_with(
        policy_with(vec![pure_rule, rule(ActionType::Close, 100)]),
        &broker2,
    );
    adapter2.sell("SHFE.rb2501", 4000.0, 10.0, false);
    let subs2 = broker2.submissions.lock();
    assert_eq!(subs2.len(), 1);
    assert_eq!(subs2[0].offset, Offset::CloseToday);
}

#[test]
fn test_close_yesterday_rule_touches_only_pre() {
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", true, 12.0, 7.0);
    let adapter = adapter_with(
        policy_with(vec![rule(ActionType::CloseYesterday, 100)]),
        &broker,
    );

    adapter.sell("SHFE.rb2501", 4000.0, 20.0, false);
    let subs = broker.submissions.lock();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].offset, Offset::CloseYesterday);
    assert_eq!(subs[0].qty, 12.0);
}

#[test]
fn test_rule_limit_caps_contribution() {
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", true, 50.0, 0.0);
    let adapter = adapter_with(
        policy_with(vec![rule(ActionType::Close, 5), rule(ActionType::Open, 100)]),
        &broker,
    );

    adapter.sell("SHFE.rb2501", 4000.0, 20.0, false);
    let subs = broker.submissions.lock();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0].qty, 5.0);
    assert_eq!(subs[1].offset, Offset::Open);
    assert_eq!(subs[1].qty, 15.0);
}

#[test]
fn test_open_side_cap_is_flat_per_order() {
    let broker = MockBroker::new(20240105);
    // The existing book does not shrink an open rule's cap; limits bound
    // what a single order under the rule may carry.
    broker.seed_position("SHFE.rb2501", true, 0.0, 8.0);
    let mut open_rule = rule(ActionType::Open, 0);
    open_rule.limit_long = 3;
    let adapter = adapter_with(policy_with(vec![open_rule]), &broker);

    let ids = adapter.buy("SHFE.rb2501", 4000.0, 5.0, false);
    assert_eq!(ids.len(), 1);
    {
        let subs = broker.submissions.lock();
        assert_eq!(subs[0].qty, 3.0);
        assert_eq!(subs[0].offset, Offset::Open);
    }

    // The cap applies per order, so a later intent gets the same 3 again.
    let ids = adapter.buy("SHFE.rb2501", 4000.0, 5.0, false);
    assert_eq!(ids.len(), 1);
    let subs = broker.submissions.lock();
    assert_eq!(subs[1].qty, 3.0);
}

#[test]
fn test_force_close_prefers_close_rules() {
    let broker = MockBroker::new(20240105);
    broker.seed_position("SHFE.rb2501", true, 10.0, 0.0);
    // Open listed first: a plain sell would open short before closing.
    let adapter = adapter_with(
        policy_with(vec![rule(ActionType::Open, 100), rule(ActionType::Close, 100)]),
        &broker,
    );

    adapter.sell("SHFE.rb2501", 4000.0, 10.0, true);
    let subs = broker.submissions.lock();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].offset, Offset::Close);
    assert_eq!(subs[0].qty, 10.0);
}

#[test]
fn test_not_ready_returns_no_children() {
    let policy = policy_with(vec![rule(ActionType::Open, 100)]);
    let adapter = TraderAdapter::new("t0", policy);
    assert!(adapter.buy("SHFE.rb2501", 4000.0, 1.0, false).is_empty());
}
