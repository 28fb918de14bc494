//! Per-instrument position bookkeeping
//!
//! Eight numbers per code: today/yesterday volume and available, on each of
//! the long and short books. Invariants held between events:
//! `0 <= new_avail <= new_vol` and `0 <= pre_avail <= pre_vol` per side.
//! Available is reserved when a close order goes out and credited back on
//! reject/cancel; volume moves only on fills.

use crate::core::{Offset, Side};

/// One side of the book (long or short).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SidePosition {
    /// Today's total volume.
    pub new_vol: f64,
    /// Today's volume not locked by outstanding close orders.
    pub new_avail: f64,
    /// Yesterday's total volume.
    pub pre_vol: f64,
    /// Yesterday's volume not locked by outstanding close orders.
    pub pre_avail: f64,
}

impl SidePosition {
    #[inline]
    pub fn total(&self) -> f64 {
        self.new_vol + self.pre_vol
    }

    #[inline]
    pub fn available(&self) -> f64 {
        self.new_avail + self.pre_avail
    }

    /// Quantity a close order with `offset` could still lock.
    pub fn closable(&self, offset: Offset) -> f64 {
        match offset {
            Offset::Open => 0.0,
            Offset::Close => self.available(),
            Offset::CloseToday => self.new_avail,
            Offset::CloseYesterday => self.pre_avail,
        }
    }

    /// Lock `qty` against an outgoing close order. Plain close drains the
    /// yesterday bucket first.
    pub fn reserve(&mut self, offset: Offset, qty: f64) {
        match offset {
            Offset::Open => {}
            Offset::Close => {
                let from_pre = qty.min(self.pre_avail);
                self.pre_avail -= from_pre;
                self.new_avail = (self.new_avail - (qty - from_pre)).max(0.0);
            }
            Offset::CloseToday => self.new_avail = (self.new_avail - qty).max(0.0),
            Offset::CloseYesterday => self.pre_avail = (self.pre_avail - qty).max(0.0),
        }
    }

    /// Unlock `qty` after a close order died without filling. The credit
    /// never lifts available above volume.
    pub fn release(&mut self, offset: Offset, qty: f64) {
        match offset {
            Offset::Open => {}
            Offset::Close => {
                let to_new = qty.min(self.new_vol - self.new_avail);
                self.new_avail += to_new;
                self.pre_avail = (self.pre_avail + qty - to_new).min(self.pre_vol);
            }
            Offset::CloseToday => self.new_avail = (self.new_avail + qty).min(self.new_vol),
            Offset::CloseYesterday => self.pre_avail = (self.pre_avail + qty).min(self.pre_vol),
        }
    }

    /// Apply a fill. Opens grow today's bucket; closes shrink volume in the
    /// bucket the offset names (plain close spills yesterday-first).
    pub fn on_fill(&mut self, offset: Offset, qty: f64) {
        match offset {
            Offset::Open => {
                self.new_vol += qty;
                self.new_avail += qty;
            }
            Offset::Close => {
                let from_pre = qty.min(self.pre_vol);
                self.pre_vol -= from_pre;
                self.new_vol = (self.new_vol - (qty - from_pre)).max(0.0);
            }
            Offset::CloseToday => self.new_vol = (self.new_vol - qty).max(0.0),
            Offset::CloseYesterday => self.pre_vol = (self.pre_vol - qty).max(0.0),
        }
        self.clamp();
    }

    fn clamp(&mut self) {
        self.new_avail = self.new_avail.clamp(0.0, self.new_vol);
        self.pre_avail = self.pre_avail.clamp(0.0, self.pre_vol);
    }

    /// Invariant probe used by tests and assertions.
    pub fn is_consistent(&self) -> bool {
        self.new_vol >= 0.0
            && self.pre_vol >= 0.0
            && (0.0..=self.new_vol + 1e-9).contains(&self.new_avail)
            && (0.0..=self.pre_vol + 1e-9).contains(&self.pre_avail)
    }
}

/// Long and short books of one instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionItem {
    pub long: SidePosition,
    pub short: SidePosition,
}

impl PositionItem {
    /// Book a fill touches: an opening buy grows the long book, a closing
    /// buy shrinks the short book.
    #[inline]
    pub fn book_for(&mut self, side: Side, offset: Offset) -> &mut SidePosition {
        let closes_opposite = offset.is_close();
        match (side, closes_opposite) {
            (Side::Buy, false) | (Side::Sell, true) => &mut self.long,
            (Side::Buy, true) | (Side::Sell, false) => &mut self.short,
        }
    }

    #[inline]
    pub fn side(&self, long: bool) -> &SidePosition {
        if long {
            &self.long
        } else {
            &self.short
        }
    }

    /// Total or available volume; `flag` selects sides (1 long, 2 short,
    /// 3 both) and the result is signed long-minus-short.
    pub fn net_position(&self, valid_only: bool, flag: i32) -> f64 {
        let pick = |p: &SidePosition| if valid_only { p.available() } else { p.total() };
        let mut qty = 0.0;
        if flag & 1 != 0 {
            qty += pick(&self.long);
        }
        if flag & 2 != 0 {
            qty -= pick(&self.short);
        }
        qty
    }

    pub fn is_consistent(&self) -> bool {
        self.long.is_consistent() && self.short.is_consistent()
    }
}
