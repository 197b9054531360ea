//! Trade execution records and the bounded trade history.

use crate::orderbook::order::Side;
use crate::utils::current_time_secs;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An immutable execution record.
///
/// `price` is always the resting maker's limit price; price improvement
/// favours the taker. `aggressor_side` is the side of the taker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Unique identifier, `TRD-<epoch_s>-<zero-padded sequence>`.
    pub trade_id: String,
    /// Execution timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Trading symbol.
    pub symbol: String,
    /// Execution price (the maker's limit price).
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Executed quantity.
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    /// Side of the incoming (taker) order.
    pub aggressor_side: Side,
    /// Id of the resting order that provided liquidity.
    pub maker_order_id: String,
    /// Id of the incoming order that consumed liquidity.
    pub taker_order_id: String,
    /// Fee billed to the maker.
    #[serde(with = "rust_decimal::serde::str")]
    pub maker_fee: Decimal,
    /// Fee billed to the taker.
    #[serde(with = "rust_decimal::serde::str")]
    pub taker_fee: Decimal,
    /// Currency the fees are denominated in.
    pub fee_currency: String,
}

impl Trade {
    /// Notional value of this trade (`price x quantity`).
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade({}: {} {}@{} {})",
            self.trade_id, self.symbol, self.quantity, self.price, self.aggressor_side
        )
    }
}

/// Generator for trade identifiers.
///
/// The sequence counter is process-local and not persisted; uniqueness
/// across restarts comes from the epoch-seconds component.
#[derive(Debug, Default)]
pub struct TradeIdGenerator {
    sequence: AtomicU64,
}

impl TradeIdGenerator {
    /// Create a generator starting at sequence 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next identifier: `TRD-<epoch_s>-<6-digit sequence>`.
    pub fn next_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("TRD-{}-{:06}", current_time_secs(), seq)
    }
}

/// Fixed-capacity ring of recent trades.
///
/// The engine appends every execution; once the capacity is reached the
/// oldest records are dropped so memory stays bounded regardless of uptime.
#[derive(Debug)]
pub struct TradeHistory {
    ring: RwLock<VecDeque<Trade>>,
    capacity: usize,
}

impl TradeHistory {
    /// Create a history bounded at `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Append a trade, evicting the oldest record when full.
    pub fn push(&self, trade: Trade) {
        let mut ring = self.ring.write();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(trade);
    }

    /// The newest `n` trades, most recent last.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<Trade> {
        let ring = self.ring.read();
        let skip = ring.len().saturating_sub(n);
        ring.iter().skip(skip).cloned().collect()
    }

    /// Number of trades currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.read().len()
    }

    /// Whether no trades are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.read().is_empty()
    }
}
