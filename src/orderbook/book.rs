//! Core order book: sorted price levels, FIFO queues, id index, BBO cache.
//!
//! The book owns its resting orders: the `orders` map is the arena keyed by
//! order id, and each price level holds a FIFO queue of ids into it. Both
//! structures live behind one `RwLock`; the matching thread takes the write
//! lock for mutations, market-data readers take short read locks.

use super::error::EngineError;
use super::order::{Order, OrderStatus, Side};
use crossbeam::atomic::AtomicCell;
use either::Either;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::trace;

/// Basis points multiplier for spread calculations: 1 bps = 0.01%.
const BASIS_POINTS_MULTIPLIER: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// A FIFO queue of resting order ids at one price.
///
/// Queue order is strictly by arrival sequence; the head is the oldest
/// order and fills first.
#[derive(Debug, Default)]
pub(super) struct PriceLevel {
    pub(super) queue: VecDeque<String>,
}

/// Best bid and offer with aggregate sizes at the touch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Bbo {
    /// Highest resting buy price, if any.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub best_bid: Option<Decimal>,
    /// Total remaining quantity at the best bid.
    #[serde(with = "rust_decimal::serde::str")]
    pub best_bid_qty: Decimal,
    /// Lowest resting sell price, if any.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub best_ask: Option<Decimal>,
    /// Total remaining quantity at the best ask.
    #[serde(with = "rust_decimal::serde::str")]
    pub best_ask_qty: Decimal,
    /// `best_ask - best_bid` when both sides are populated.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub spread: Option<Decimal>,
    /// Spread in basis points relative to the best bid.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub spread_bps: Option<Decimal>,
}

pub(super) struct BookInner {
    /// Bid price levels. `BTreeMap` iterates ascending, so the best bid is
    /// the last key.
    pub(super) bids: BTreeMap<Decimal, PriceLevel>,
    /// Ask price levels; the best ask is the first key.
    pub(super) asks: BTreeMap<Decimal, PriceLevel>,
    /// Arena of resting orders, keyed by order id. Every id in a level
    /// queue resolves here and vice versa.
    pub(super) orders: HashMap<String, Order>,
    pub(super) bbo_cache: Bbo,
    pub(super) bbo_dirty: bool,
}

impl BookInner {
    /// Sum of remaining quantity across the orders of one level.
    pub(super) fn level_remaining(&self, level: &PriceLevel) -> Decimal {
        level
            .queue
            .iter()
            .filter_map(|id| self.orders.get(id))
            .map(|o| o.remaining_quantity)
            .sum()
    }

    fn recompute_bbo(&mut self) {
        let best_bid = self.bids.iter().next_back();
        let best_ask = self.asks.iter().next();

        let (best_bid, best_bid_qty) = match best_bid {
            Some((price, level)) => (Some(*price), self.level_remaining(level)),
            None => (None, Decimal::ZERO),
        };
        let (best_ask, best_ask_qty) = match best_ask {
            Some((price, level)) => (Some(*price), self.level_remaining(level)),
            None => (None, Decimal::ZERO),
        };

        let (spread, spread_bps) = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => {
                let spread = ask - bid;
                (Some(spread), Some(spread / bid * BASIS_POINTS_MULTIPLIER))
            }
            _ => (None, None),
        };

        self.bbo_cache = Bbo {
            best_bid,
            best_bid_qty,
            best_ask,
            best_ask_qty,
            spread,
            spread_bps,
        };
        self.bbo_dirty = false;
    }
}

/// A two-sided order book for a single symbol.
pub struct OrderBook {
    symbol: String,
    pub(super) inner: RwLock<BookInner>,
    /// Price of the most recent execution in this symbol, used to evaluate
    /// conditional-order triggers.
    last_trade_price: AtomicCell<Option<Decimal>>,
}

impl OrderBook {
    /// Create an empty book for `symbol`.
    #[must_use]
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            inner: RwLock::new(BookInner {
                bids: BTreeMap::new(),
                asks: BTreeMap::new(),
                orders: HashMap::new(),
                bbo_cache: Bbo::default(),
                bbo_dirty: true,
            }),
            last_trade_price: AtomicCell::new(None),
        }
    }

    /// The symbol this book trades.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Rest a limit-priced order at the tail of its price level.
    ///
    /// Sets the status to [`OrderStatus::Partial`] when the order already
    /// has fills (a taker remainder), [`OrderStatus::Open`] otherwise.
    ///
    /// # Errors
    ///
    /// Fails when an order with the same id is already resting, or when
    /// the order carries no price.
    pub fn add_order(&self, mut order: Order) -> Result<(), EngineError> {
        let price = order.price.ok_or(EngineError::MissingPrice { kind: order.kind })?;
        let mut inner = self.inner.write();
        if inner.orders.contains_key(&order.order_id) {
            return Err(EngineError::DuplicateOrderId {
                order_id: order.order_id,
            });
        }

        order.status = if order.filled_quantity > Decimal::ZERO {
            OrderStatus::Partial
        } else {
            OrderStatus::Open
        };

        let book_side = match order.side {
            Side::Buy => &mut inner.bids,
            Side::Sell => &mut inner.asks,
        };
        book_side
            .entry(price)
            .or_default()
            .queue
            .push_back(order.order_id.clone());

        trace!(
            order_id = %order.order_id,
            symbol = %self.symbol,
            side = %order.side,
            %price,
            quantity = %order.remaining_quantity,
            "order added to book"
        );

        inner.orders.insert(order.order_id.clone(), order);
        inner.bbo_dirty = true;
        Ok(())
    }

    /// Remove a resting order by id, returning the owned record.
    ///
    /// O(1) to locate the order, O(k) to unlink it from its level queue.
    /// The level is dropped when its queue empties. Returns `None` for
    /// unknown ids.
    pub fn remove_order(&self, order_id: &str) -> Option<Order> {
        let mut inner = self.inner.write();
        let order = inner.orders.remove(order_id)?;
        let price = order.price?;

        let book_side = match order.side {
            Side::Buy => &mut inner.bids,
            Side::Sell => &mut inner.asks,
        };
        if let Some(level) = book_side.get_mut(&price) {
            level.queue.retain(|id| id != order_id);
            if level.queue.is_empty() {
                book_side.remove(&price);
            }
        }
        inner.bbo_dirty = true;

        trace!(order_id, symbol = %self.symbol, "order removed from book");
        Some(order)
    }

    /// Look up a resting order by id.
    #[must_use]
    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        self.inner.read().orders.get(order_id).cloned()
    }

    /// Whether an order with this id is resting on the book.
    #[must_use]
    pub fn contains_order(&self, order_id: &str) -> bool {
        self.inner.read().orders.contains_key(order_id)
    }

    /// Number of resting orders across both sides.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.inner.read().orders.len()
    }

    /// Best bid as `(price, aggregate remaining quantity)`.
    #[must_use]
    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        let inner = self.inner.read();
        inner
            .bids
            .iter()
            .next_back()
            .map(|(price, level)| (*price, inner.level_remaining(level)))
    }

    /// Best ask as `(price, aggregate remaining quantity)`.
    #[must_use]
    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        let inner = self.inner.read();
        inner
            .asks
            .iter()
            .next()
            .map(|(price, level)| (*price, inner.level_remaining(level)))
    }

    /// Best bid and offer, recomputed lazily after mutations.
    ///
    /// O(1) after the first call following any book change.
    #[must_use]
    pub fn bbo(&self) -> Bbo {
        let inner = self.inner.upgradable_read();
        if !inner.bbo_dirty {
            return inner.bbo_cache.clone();
        }
        let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
        inner.recompute_bbo();
        inner.bbo_cache.clone()
    }

    /// Top `levels` price levels per side as `(price, aggregate quantity)`.
    ///
    /// Bids come highest-first, asks lowest-first.
    #[must_use]
    pub fn depth(&self, levels: usize) -> (Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>) {
        let inner = self.inner.read();
        let bids = inner
            .bids
            .iter()
            .rev()
            .take(levels)
            .map(|(price, level)| (*price, inner.level_remaining(level)))
            .collect();
        let asks = inner
            .asks
            .iter()
            .take(levels)
            .map(|(price, level)| (*price, inner.level_remaining(level)))
            .collect();
        (bids, asks)
    }

    /// Total remaining quantity on one side.
    #[must_use]
    pub fn side_volume(&self, side: Side) -> Decimal {
        let inner = self.inner.read();
        let levels = match side {
            Side::Buy => &inner.bids,
            Side::Sell => &inner.asks,
        };
        levels
            .values()
            .map(|level| inner.level_remaining(level))
            .sum()
    }

    /// All resting orders of one side in price order (bids highest-first,
    /// asks lowest-first), each level's queue in arrival order.
    ///
    /// Used by the snapshot store.
    #[must_use]
    pub fn resting_orders(&self, side: Side) -> Vec<(Decimal, Vec<Order>)> {
        let inner = self.inner.read();
        let levels = match side {
            Side::Buy => Either::Left(inner.bids.iter().rev()),
            Side::Sell => Either::Right(inner.asks.iter()),
        };
        levels
            .map(|(price, level)| {
                let orders = level
                    .queue
                    .iter()
                    .filter_map(|id| inner.orders.get(id))
                    .cloned()
                    .collect();
                (*price, orders)
            })
            .collect()
    }

    /// Price of the most recent execution, if any.
    #[must_use]
    pub fn last_trade_price(&self) -> Option<Decimal> {
        self.last_trade_price.load()
    }

    /// Record the price of an execution.
    pub fn set_last_trade_price(&self, price: Decimal) {
        self.last_trade_price.store(Some(price));
    }

    /// Verify the book's internal invariants, returning the first breach.
    ///
    /// Checked: every level id resolves in the arena and vice versa, level
    /// queues are ordered by arrival sequence, resting orders are active
    /// with positive remainder, and the book is not crossed.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        let inner = self.inner.read();
        let mut seen = 0usize;
        for (side_name, side) in [("bid", &inner.bids), ("ask", &inner.asks)] {
            for (price, level) in side.iter() {
                if level.queue.is_empty() {
                    return Err(EngineError::InvariantViolation {
                        message: format!("empty {side_name} level at {price}"),
                    });
                }
                let mut last_seq = 0u64;
                for id in &level.queue {
                    seen += 1;
                    let order = inner.orders.get(id).ok_or_else(|| {
                        EngineError::InvariantViolation {
                            message: format!("level order {id} missing from id index"),
                        }
                    })?;
                    if !order.is_active() || order.remaining_quantity <= Decimal::ZERO {
                        return Err(EngineError::InvariantViolation {
                            message: format!(
                                "resting order {id} not active ({} remaining, {})",
                                order.remaining_quantity, order.status
                            ),
                        });
                    }
                    if order.arrival_seq <= last_seq && last_seq != 0 {
                        return Err(EngineError::InvariantViolation {
                            message: format!("level at {price} not in arrival order at {id}"),
                        });
                    }
                    last_seq = order.arrival_seq;
                }
            }
        }
        if seen != inner.orders.len() {
            return Err(EngineError::InvariantViolation {
                message: format!(
                    "id index holds {} orders but levels hold {seen}",
                    inner.orders.len()
                ),
            });
        }
        if let (Some((bid, _)), Some((ask, _))) =
            (inner.bids.iter().next_back(), inner.asks.iter().next())
        {
            if bid >= ask {
                return Err(EngineError::InvariantViolation {
                    message: format!("crossed book: best bid {bid} >= best ask {ask}"),
                });
            }
        }
        Ok(())
    }
}
