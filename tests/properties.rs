//! Property tests for the matching laws: conservation, price priority,
//! time priority, and no trade-through.

use matchbook_rs::prelude::*;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn resting(id: &str, side: Side, price: Decimal, quantity: Decimal, seq: u64) -> Order {
    let mut order = Order::new(Some(id.to_string()));
    order
        .initialize("BTC-USDT", side, OrderKind::Limit, quantity, Some(price), None)
        .unwrap();
    order.arrival_seq = seq;
    order
}

/// Resting sell quantities in cents at prices 100..100+levels.
fn ask_book_strategy() -> impl Strategy<Value = Vec<(u32, Vec<u32>)>> {
    // 1..=4 price levels, each with 1..=3 orders of 1..=500 cents.
    prop::collection::vec(prop::collection::vec(1u32..=500, 1..=3), 1..=4).prop_map(|levels| {
        levels
            .into_iter()
            .enumerate()
            .map(|(i, orders)| (100 + i as u32, orders))
            .collect()
    })
}

proptest! {
    #[test]
    fn matching_conserves_quantity_and_priority(
        levels in ask_book_strategy(),
        taker_cents in 1u32..=3000,
    ) {
        let book = OrderBook::new("BTC-USDT");
        let mut seq = 0u64;
        let mut total_resting = Decimal::ZERO;
        for (price, orders) in &levels {
            for quantity in orders {
                seq += 1;
                let qty = Decimal::new(i64::from(*quantity), 2);
                total_resting += qty;
                book.add_order(resting(
                    &format!("m{seq}"),
                    Side::Sell,
                    Decimal::from(*price),
                    qty,
                    seq,
                ))
                .unwrap();
            }
        }

        let taker_qty = Decimal::new(i64::from(taker_cents), 2);
        let outcome = book.match_order("taker", Side::Buy, taker_qty, None).unwrap();

        // Conservation: executed + remaining = requested, and executed
        // equals the sum of fills.
        prop_assert_eq!(
            outcome.executed_quantity + outcome.remaining_quantity,
            taker_qty
        );
        let fill_sum: Decimal = outcome.fills.iter().map(|f| f.quantity).sum();
        prop_assert_eq!(fill_sum, outcome.executed_quantity);
        prop_assert_eq!(
            outcome.executed_quantity,
            taker_qty.min(total_resting)
        );

        // No trade-through: a buy taker's fill prices never improve as the
        // walk proceeds.
        for pair in outcome.fills.windows(2) {
            prop_assert!(pair[0].price <= pair[1].price);
        }

        // Time priority: within a price, makers fill in arrival order
        // (maker ids were assigned in arrival order).
        for pair in outcome.fills.windows(2) {
            if pair[0].price == pair[1].price {
                let a: u64 = pair[0].maker_order_id[1..].parse().unwrap();
                let b: u64 = pair[1].maker_order_id[1..].parse().unwrap();
                prop_assert!(a <= b);
            }
        }

        // The book stays internally consistent.
        book.check_invariants().unwrap();
        prop_assert_eq!(
            book.side_volume(Side::Sell),
            total_resting - outcome.executed_quantity
        );
    }

    #[test]
    fn fok_feasibility_check_never_mutates(
        levels in ask_book_strategy(),
        taker_cents in 1u32..=3000,
    ) {
        let book = OrderBook::new("BTC-USDT");
        let mut seq = 0u64;
        for (price, orders) in &levels {
            for quantity in orders {
                seq += 1;
                book.add_order(resting(
                    &format!("m{seq}"),
                    Side::Sell,
                    Decimal::from(*price),
                    Decimal::new(i64::from(*quantity), 2),
                    seq,
                ))
                .unwrap();
            }
        }
        let volume_before = book.side_volume(Side::Sell);
        let count_before = book.order_count();

        let taker_qty = Decimal::new(i64::from(taker_cents), 2);
        let available = book.peek_fillable(Side::Buy, taker_qty, None);

        prop_assert!(available <= taker_qty);
        prop_assert_eq!(book.side_volume(Side::Sell), volume_before);
        prop_assert_eq!(book.order_count(), count_before);

        // The peek is truthful: a real walk executes exactly what the
        // peek promised.
        let outcome = book.match_order("taker", Side::Buy, taker_qty, None).unwrap();
        prop_assert_eq!(outcome.executed_quantity, available);
    }
}
