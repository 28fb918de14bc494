//! Scripted broker channel
//!
//! Answers the login/query cycle immediately with seeded books and records
//! every entrust and cancel. Tests drive acknowledgments, fills and cancels
//! explicitly, from the test thread, so callback timing is fully
//! deterministic.

use crate::core::{OrderState, Side};
use crate::trader::{
    BrokerApi, BrokerOrder, BrokerPosition, BrokerSpi, BrokerTrade, CancelAction, ChannelEvent,
    Entrust,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct MockBroker {
    spi: Mutex<Option<Arc<dyn BrokerSpi>>>,
    trading_date: u32,
    seeded_positions: Mutex<Vec<BrokerPosition>>,
    pub submissions: Mutex<Vec<Entrust>>,
    pub cancels: Mutex<Vec<CancelAction>>,
    fail_submit: AtomicBool,
    reject_login: AtomicBool,
}

impl MockBroker {
    pub fn new(trading_date: u32) -> Arc<Self> {
        Arc::new(Self {
            trading_date,
            ..Default::default()
        })
    }

    /// Position returned by the query phase.
    pub fn seed_position(&self, code: &str, long: bool, pre: f64, new: f64) {
        self.seeded_positions.lock().push(BrokerPosition {
            code: code.to_string(),
            long,
            pre_vol: pre,
            pre_avail: pre,
            new_vol: new,
            new_avail: new,
        });
    }

    pub fn set_fail_submit(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub fn set_reject_login(&self, reject: bool) {
        self.reject_login.store(reject, Ordering::SeqCst);
    }

    fn spi(&self) -> Arc<dyn BrokerSpi> {
        self.spi.lock().clone().expect("broker not connected")
    }

    pub fn entrust_of(&self, local_id: u32) -> Entrust {
        self.submissions
            .lock()
            .iter()
            .find(|e| e.local_id == local_id)
            .cloned()
            .unwrap_or_else(|| panic!("no entrust #{} recorded", local_id))
    }

    fn order_ref(local_id: u32) -> String {
        format!("R{}", local_id)
    }

    // --------------------------------------------------------------
    // Scripted broker responses
    // --------------------------------------------------------------

    /// Acknowledge an entrust: submitted and fully resting.
    pub fn ack(&self, local_id: u32) {
        let entrust = self.entrust_of(local_id);
        self.spi()
            .on_entrust_result(local_id, &entrust.code, None);
        self.spi().on_push_order(&BrokerOrder {
            local_id,
            order_ref: Self::order_ref(local_id),
            code: entrust.code.clone(),
            side: entrust.side,
            offset: entrust.offset,
            price: entrust.price,
            total: entrust.qty,
            left: entrust.qty,
            state: OrderState::Submitted,
        });
    }

    /// Refuse an entrust at the broker.
    pub fn reject(&self, local_id: u32, reason: &str) {
        let entrust = self.entrust_of(local_id);
        self.spi()
            .on_entrust_result(local_id, &entrust.code, Some(reason));
    }

    /// Fill `qty` of an acknowledged order under exchange trade id
    /// `trade_ref`, then push the matching order state.
    pub fn fill(&self, local_id: u32, qty: f64, trade_ref: &str) {
        let entrust = self.entrust_of(local_id);
        self.spi().on_push_trade(&BrokerTrade {
            order_ref: Self::order_ref(local_id),
            trade_ref: trade_ref.to_string(),
            code: entrust.code.clone(),
            side: entrust.side,
            offset: entrust.offset,
            price: entrust.price,
            qty,
        });
        let left = (entrust.qty - qty).max(0.0);
        self.spi().on_push_order(&BrokerOrder {
            local_id,
            order_ref: Self::order_ref(local_id),
            code: entrust.code,
            side: entrust.side,
            offset: entrust.offset,
            price: entrust.price,
            total: entrust.qty,
            left,
            state: if left > 0.0 {
                OrderState::PartFilled
            } else {
                OrderState::Filled
            },
        });
    }

    /// Confirm a cancel with `left` still outstanding.
    pub fn cancel_ack(&self, local_id: u32, left: f64) {
        let entrust = self.entrust_of(local_id);
        self.spi().on_push_order(&BrokerOrder {
            local_id,
            order_ref: Self::order_ref(local_id),
            code: entrust.code,
            side: entrust.side,
            offset: entrust.offset,
            price: entrust.price,
            total: entrust.qty,
            left,
            state: OrderState::Canceled,
        });
    }

    /// Push an order this process never placed.
    pub fn push_foreign_order(
        &self,
        order_ref: &str,
        code: &str,
        side: Side,
        qty: f64,
        state: OrderState,
    ) {
        self.spi().on_push_order(&BrokerOrder {
            local_id: 0,
            order_ref: order_ref.to_string(),
            code: code.to_string(),
            side,
            offset: crate::core::Offset::Open,
            price: 0.0,
            total: qty,
            left: if state.is_terminal() { 0.0 } else { qty },
            state,
        });
    }

    pub fn drop_connection(&self) {
        self.spi().on_channel_event(ChannelEvent::Disconnected);
    }
}

impl BrokerApi for MockBroker {
    fn connect(&self, spi: Arc<dyn BrokerSpi>) {
        *self.spi.lock() = Some(spi.clone());
        spi.on_channel_event(ChannelEvent::Connected);
        if self.reject_login.load(Ordering::SeqCst) {
            spi.on_login_result(false, "scripted refusal", 0);
        } else {
            spi.on_login_result(true, "", self.trading_date);
        }
    }

    fn submit(&self, entrust: &Entrust) -> anyhow::Result<()> {
        if self.fail_submit.load(Ordering::SeqCst) {
            anyhow::bail!("scripted submit failure");
        }
        self.submissions.lock().push(entrust.clone());
        Ok(())
    }

    fn cancel(&self, action: &CancelAction) -> anyhow::Result<()> {
        self.cancels.lock().push(action.clone());
        Ok(())
    }

    fn query_account(&self) {
        self.spi().on_account(1_000_000.0, 1_000_000.0);
    }

    fn query_positions(&self) {
        let positions = self.seeded_positions.lock().clone();
        self.spi().on_positions(&positions);
    }

    fn query_orders(&self) {
        self.spi().on_orders(&[]);
    }

    fn query_trades(&self) {
        self.spi().on_trades(&[]);
    }
}
