//! Paper broker
//!
//! Accepts every entrust, acknowledges it immediately and fills it in full
//! at the limit price. Good enough to run strategies end-to-end without a
//! counterparty; every order path of the trader adapter is exercised for
//! real.

use chrono::Datelike;
use kestrel_core::core::OrderState;
use kestrel_core::trader::{
    BrokerApi, BrokerOrder, BrokerSpi, BrokerTrade, CancelAction, ChannelEvent, Entrust,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct SimBroker {
    spi: Mutex<Option<Arc<dyn BrokerSpi>>>,
    live: Mutex<HashMap<String, Entrust>>,
    next_trade: AtomicU64,
}

impl SimBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn spi(&self) -> Option<Arc<dyn BrokerSpi>> {
        self.spi.lock().clone()
    }

    fn order_ref(entrust: &Entrust) -> String {
        format!("SIM-{}", entrust.local_id)
    }
}

impl BrokerApi for SimBroker {
    fn connect(&self, spi: Arc<dyn BrokerSpi>) {
        eprintln!("DBG connect: locking spi");
        *self.spi.lock() = Some(spi.clone());
        eprintln!("DBG connect: calling Local::now");
        let now = chrono::Local::now();
        eprintln!("DBG connect: got now {:?}", now);
        let trading_date = now.year() as u32 * 10000 + now.month() * 100 + now.day();
        eprintln!("DBG connect: on_channel_event");
        spi.on_channel_event(ChannelEvent::Connected);
        eprintln!("DBG connect: on_login_result");
        spi.on_login_result(true, "paper channel", trading_date);
        eprintln!("DBG connect: done");
    }

    fn submit(&self, entrust: &Entrust) -> anyhow::Result<()> {
        let Some(spi) = self.spi() else {
            anyhow::bail!("paper channel not connected");
        };
        let order_ref = Self::order_ref(entrust);
        self.live.lock().insert(order_ref.clone(), entrust.clone());

        spi.on_entrust_result(entrust.local_id, &entrust.code, None);
        spi.on_push_order(&BrokerOrder {
            local_id: entrust.local_id,
            order_ref: order_ref.clone(),
            code: entrust.code.clone(),
            side: entrust.side,
            offset: entrust.offset,
            price: entrust.price,
            total: entrust.qty,
            left: entrust.qty,
            state: OrderState::Submitted,
        });

        // Instant full fill at the limit price.
        let trade_id = self.next_trade.fetch_add(1, Ordering::AcqRel);
        spi.on_push_trade(&BrokerTrade {
            order_ref: order_ref.clone(),
            trade_ref: format!("SIMT-{}", trade_id),
            code: entrust.code.clone(),
            side: entrust.side,
            offset: entrust.offset,
            price: entrust.price,
            qty: entrust.qty,
        });
        spi.on_push_order(&BrokerOrder {
            local_id: entrust.local_id,
            order_ref: order_ref.clone(),
            code: entrust.code.clone(),
            side: entrust.side,
            offset: entrust.offset,
            price: entrust.price,
            total: entrust.qty,
            left: 0.0,
            state: OrderState::Filled,
        });
        self.live.lock().remove(&order_ref);
        Ok(())
    }

    fn cancel(&self, action: &CancelAction) -> anyhow::Result<()> {
        let Some(spi) = self.spi() else {
            anyhow::bail!("paper channel not connected");
        };
        // Orders fill instantly, so a cancel can only find nothing.
        if let Some(entrust) = self.live.lock().remove(&action.order_ref) {
            spi.on_push_order(&BrokerOrder {
                local_id: entrust.local_id,
                order_ref: action.order_ref.clone(),
                code: entrust.code.clone(),
                side: entrust.side,
                offset: entrust.offset,
                price: entrust.price,
                total: entrust.qty,
                left: entrust.qty,
                state: OrderState::Canceled,
            });
        }
        Ok(())
    }

    fn query_account(&self) {
        eprintln!("DBG query_account: calling self.spi()");
        let s = self.spi();
        eprintln!("DBG query_account: got spi, is_some={}", s.is_some());
        if let Some(spi) = s {
            eprintln!("DBG query_account: calling on_account");
            spi.on_account(1_000_000.0, 1_000_000.0);
            eprintln!("DBG query_account: done on_account");
        }
    }

    fn query_positions(&self) {
        if let Some(spi) = self.spi() {
            spi.on_positions(&[]);
        }
    }

    fn query_orders(&self) {
        if let Some(spi) = self.spi() {
            spi.on_orders(&[]);
        }
    }

    fn query_trades(&self) {
        if let Some(spi) = self.spi() {
            spi.on_trades(&[]);
        }
    }
}
