//! Price-time priority matching against a single book.
//!
//! The walk always consumes the current best opposing level before moving
//! to a worse price, and within a level fills strictly in arrival order.
//! Because prices are monotonically worsening from the taker's perspective,
//! a taker can never trade through a better available price.

use super::book::{BookInner, OrderBook};
use super::error::EngineError;
use super::order::{Order, Side};
use either::Either;
use rust_decimal::Decimal;
use tracing::trace;

/// One execution produced by the matching walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    /// Id of the resting maker order.
    pub maker_order_id: String,
    /// Execution price (the maker's limit price).
    pub price: Decimal,
    /// Executed quantity.
    pub quantity: Decimal,
    /// The maker's fee tier, captured at fill time because a fully filled
    /// maker leaves the book.
    pub maker_fee_tier: Option<String>,
}

/// Result of walking one incoming order against the book.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Fills in execution order.
    pub fills: Vec<Fill>,
    /// Makers that filled completely and were removed from the book, in
    /// removal order.
    pub removed_makers: Vec<Order>,
    /// Total quantity executed.
    pub executed_quantity: Decimal,
    /// Taker quantity left after the walk.
    pub remaining_quantity: Decimal,
}

impl MatchOutcome {
    /// Whether the taker was filled completely.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining_quantity.is_zero()
    }

    /// Volume-weighted average fill price, `None` when nothing executed.
    ///
    /// Rounded half-even to 18 fractional digits, trailing zeros stripped.
    #[must_use]
    pub fn avg_fill_price(&self) -> Option<Decimal> {
        if self.executed_quantity.is_zero() {
            return None;
        }
        let notional: Decimal = self.fills.iter().map(|f| f.price * f.quantity).sum();
        Some(
            (notional / self.executed_quantity)
                .round_dp_with_strategy(18, rust_decimal::RoundingStrategy::MidpointNearestEven)
                .normalize(),
        )
    }
}

impl OrderBook {
    /// Match an incoming order against resting liquidity.
    ///
    /// Walks opposing price levels best-first: asks ascending for a buy
    /// taker, bids descending for a sell taker. `limit_price` of `None`
    /// means a market taker that accepts any price. Fully filled makers are
    /// popped from their level and erased from the id index; emptied levels
    /// are dropped. The book is mutated in place; fill-or-kill feasibility
    /// must be checked beforehand with [`OrderBook::peek_fillable`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvariantViolation`] if a level queue
    /// references an id missing from the index. The incoming order itself
    /// is not mutated here; the engine applies the outcome to it.
    pub fn match_order(
        &self,
        taker_order_id: &str,
        side: Side,
        quantity: Decimal,
        limit_price: Option<Decimal>,
    ) -> Result<MatchOutcome, EngineError> {
        let mut guard = self.inner.write();
        let inner: &mut BookInner = &mut *guard;

        let opposing = match side {
            Side::Buy => &mut inner.asks,
            Side::Sell => &mut inner.bids,
        };
        let orders = &mut inner.orders;

        let mut fills = Vec::new();
        let mut removed_makers = Vec::new();
        let mut remaining = quantity;

        while remaining > Decimal::ZERO {
            // Best opposing price: lowest ask for a buy, highest bid for a sell.
            let best_price = match side {
                Side::Buy => opposing.keys().next().copied(),
                Side::Sell => opposing.keys().next_back().copied(),
            };
            let Some(best_price) = best_price else { break };

            if let Some(limit) = limit_price {
                let crosses = match side {
                    Side::Buy => limit >= best_price,
                    Side::Sell => limit <= best_price,
                };
                if !crosses {
                    break;
                }
            }

            let Some(level) = opposing.get_mut(&best_price) else {
                break;
            };

            // Walk the level FIFO from the head (oldest arrival).
            while remaining > Decimal::ZERO {
                let Some(maker_id) = level.queue.front().cloned() else {
                    break;
                };
                let maker = orders.get_mut(&maker_id).ok_or_else(|| {
                    EngineError::InvariantViolation {
                        message: format!("level order {maker_id} missing from id index"),
                    }
                })?;

                let fill_quantity = remaining.min(maker.remaining_quantity);
                maker.fill(fill_quantity, best_price)?;
                remaining -= fill_quantity;

                trace!(
                    taker = taker_order_id,
                    maker = %maker_id,
                    price = %best_price,
                    quantity = %fill_quantity,
                    "match"
                );

                let maker_done = maker.remaining_quantity.is_zero();
                fills.push(Fill {
                    maker_order_id: maker_id.clone(),
                    price: best_price,
                    quantity: fill_quantity,
                    maker_fee_tier: maker.fee_tier.clone(),
                });

                if maker_done {
                    level.queue.pop_front();
                    if let Some(removed) = orders.remove(&maker_id) {
                        removed_makers.push(removed);
                    }
                }
            }

            if level.queue.is_empty() {
                opposing.remove(&best_price);
            }
        }

        if !fills.is_empty() {
            inner.bbo_dirty = true;
        }

        Ok(MatchOutcome {
            executed_quantity: quantity - remaining,
            remaining_quantity: remaining,
            fills,
            removed_makers,
        })
    }

    /// Crossable opposing quantity for a hypothetical taker, without
    /// touching the book.
    ///
    /// This is the fill-or-kill pre-check: it accumulates resting
    /// remainders over levels the taker's limit crosses, best-first, and
    /// stops as soon as `quantity` is covered. Capped at `quantity`.
    #[must_use]
    pub fn peek_fillable(
        &self,
        side: Side,
        quantity: Decimal,
        limit_price: Option<Decimal>,
    ) -> Decimal {
        let inner = self.inner.read();
        let levels = match side {
            Side::Buy => Either::Left(inner.asks.iter()),
            Side::Sell => Either::Right(inner.bids.iter().rev()),
        };

        let mut matched = Decimal::ZERO;
        for (price, level) in levels {
            if matched >= quantity {
                break;
            }
            if let Some(limit) = limit_price {
                let crosses = match side {
                    Side::Buy => limit >= *price,
                    Side::Sell => limit <= *price,
                };
                if !crosses {
                    break;
                }
            }
            let available = inner.level_remaining(level);
            let needed = quantity - matched;
            matched += needed.min(available);
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::order::{Order, OrderKind, OrderStatus};
    use rust_decimal_macros::dec;

    fn resting(id: &str, side: Side, price: Decimal, quantity: Decimal, seq: u64) -> Order {
        let mut order = Order::new(Some(id.to_string()));
        order
            .initialize("BTC-USDT", side, OrderKind::Limit, quantity, Some(price), None)
            .unwrap();
        order.arrival_seq = seq;
        order
    }

    fn seeded_book() -> OrderBook {
        let book = OrderBook::new("BTC-USDT");
        book.add_order(resting("a1", Side::Sell, dec!(50000), dec!(1), 1))
            .unwrap();
        book.add_order(resting("a2", Side::Sell, dec!(50000), dec!(2), 2))
            .unwrap();
        book.add_order(resting("a3", Side::Sell, dec!(50100), dec!(3), 3))
            .unwrap();
        book
    }

    #[test]
    fn test_walk_fills_best_price_first() {
        let book = seeded_book();
        let outcome = book
            .match_order("taker", Side::Buy, dec!(4), Some(dec!(50100)))
            .unwrap();

        assert_eq!(outcome.executed_quantity, dec!(4));
        assert!(outcome.is_complete());
        assert_eq!(outcome.fills.len(), 3);
        assert_eq!(outcome.fills[0].maker_order_id, "a1");
        assert_eq!(outcome.fills[0].price, dec!(50000));
        assert_eq!(outcome.fills[1].maker_order_id, "a2");
        assert_eq!(outcome.fills[2].maker_order_id, "a3");
        assert_eq!(outcome.fills[2].price, dec!(50100));
        assert_eq!(outcome.fills[2].quantity, dec!(1));

        // a1 and a2 filled completely and left the book; a3 rests partially.
        let removed: Vec<&str> = outcome
            .removed_makers
            .iter()
            .map(|o| o.order_id.as_str())
            .collect();
        assert_eq!(removed, vec!["a1", "a2"]);
        assert_eq!(outcome.removed_makers[0].status, OrderStatus::Filled);
    }

    #[test]
    fn test_walk_stops_at_limit() {
        let book = seeded_book();
        let outcome = book
            .match_order("taker", Side::Buy, dec!(5), Some(dec!(50000)))
            .unwrap();
        assert_eq!(outcome.executed_quantity, dec!(3));
        assert_eq!(outcome.remaining_quantity, dec!(2));
        // 50100 level untouched
        assert!(book.contains_order("a3"));
        assert_eq!(book.best_ask(), Some((dec!(50100), dec!(3))));
    }

    #[test]
    fn test_fifo_within_level() {
        let book = seeded_book();
        let outcome = book
            .match_order("taker", Side::Buy, dec!(1.5), Some(dec!(50000)))
            .unwrap();
        assert_eq!(outcome.fills[0].maker_order_id, "a1");
        assert_eq!(outcome.fills[0].quantity, dec!(1));
        assert_eq!(outcome.fills[1].maker_order_id, "a2");
        assert_eq!(outcome.fills[1].quantity, dec!(0.5));

        // a1 fully filled and erased, a2 partially filled at the head
        assert!(!book.contains_order("a1"));
        let a2 = book.get_order("a2").unwrap();
        assert_eq!(a2.status, OrderStatus::Partial);
        assert_eq!(a2.remaining_quantity, dec!(1.5));
    }

    #[test]
    fn test_market_taker_ignores_price() {
        let book = seeded_book();
        let outcome = book.match_order("taker", Side::Buy, dec!(6), None).unwrap();
        assert_eq!(outcome.executed_quantity, dec!(6));
        assert_eq!(book.order_count(), 0);
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn test_sell_taker_walks_bids_descending() {
        let book = OrderBook::new("BTC-USDT");
        book.add_order(resting("b1", Side::Buy, dec!(49900), dec!(1), 1))
            .unwrap();
        book.add_order(resting("b2", Side::Buy, dec!(50000), dec!(1), 2))
            .unwrap();
        let outcome = book
            .match_order("taker", Side::Sell, dec!(2), Some(dec!(49900)))
            .unwrap();
        assert_eq!(outcome.fills[0].price, dec!(50000));
        assert_eq!(outcome.fills[1].price, dec!(49900));
        assert!(outcome.is_complete());
    }

    #[test]
    fn test_empty_book_returns_no_fills() {
        let book = OrderBook::new("BTC-USDT");
        let outcome = book.match_order("taker", Side::Buy, dec!(1), None).unwrap();
        assert!(outcome.fills.is_empty());
        assert_eq!(outcome.remaining_quantity, dec!(1));
    }

    #[test]
    fn test_avg_fill_price_weighted() {
        let book = seeded_book();
        let outcome = book
            .match_order("taker", Side::Buy, dec!(4), Some(dec!(50100)))
            .unwrap();
        // (3 * 50000 + 1 * 50100) / 4 = 50025
        assert_eq!(outcome.avg_fill_price(), Some(dec!(50025)));
    }

    #[test]
    fn test_avg_fill_price_absent_without_fills() {
        let outcome = MatchOutcome::default();
        assert_eq!(outcome.avg_fill_price(), None);
    }

    #[test]
    fn test_peek_fillable_respects_limit() {
        let book = seeded_book();
        assert_eq!(
            book.peek_fillable(Side::Buy, dec!(10), Some(dec!(50000))),
            dec!(3)
        );
        assert_eq!(
            book.peek_fillable(Side::Buy, dec!(10), Some(dec!(50100))),
            dec!(6)
        );
        assert_eq!(
            book.peek_fillable(Side::Buy, dec!(10), Some(dec!(49999))),
            dec!(0)
        );
        // capped at the requested quantity
        assert_eq!(book.peek_fillable(Side::Buy, dec!(2), None), dec!(2));
    }

    #[test]
    fn test_peek_fillable_leaves_book_untouched() {
        let book = seeded_book();
        let before = book.order_count();
        let _ = book.peek_fillable(Side::Buy, dec!(100), None);
        assert_eq!(book.order_count(), before);
        book.check_invariants().unwrap();
    }

    #[test]
    fn test_book_not_crossed_after_partial_walk() {
        let book = seeded_book();
        book.match_order("taker", Side::Buy, dec!(1.5), Some(dec!(50000)))
            .unwrap();
        book.check_invariants().unwrap();
    }
}
