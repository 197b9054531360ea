//! End-to-end matching scenarios through the engine's submit boundary.

use matchbook_rs::prelude::*;
use rust_decimal_macros::dec;

fn engine() -> MatchingEngine {
    MatchingEngine::new()
}

fn limit(symbol: &str, side: &str, quantity: &str, price: &str) -> OrderRequest {
    OrderRequest {
        symbol: symbol.to_string(),
        order_type: "limit".to_string(),
        side: side.to_string(),
        quantity: quantity.to_string(),
        price: Some(price.to_string()),
        ..OrderRequest::default()
    }
}

fn market(symbol: &str, side: &str, quantity: &str) -> OrderRequest {
    OrderRequest {
        symbol: symbol.to_string(),
        order_type: "market".to_string(),
        side: side.to_string(),
        quantity: quantity.to_string(),
        ..OrderRequest::default()
    }
}

#[test]
fn basic_match_fills_both_sides() {
    let engine = engine();
    let sell = engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50000"));
    assert_eq!(sell.status, OrderStatus::Open);

    let buy = engine.submit_order(&limit("BTC-USDT", "buy", "1.0", "50000"));
    assert_eq!(buy.status, OrderStatus::Filled);
    assert_eq!(buy.filled_quantity, Some(dec!(1.0)));
    assert_eq!(buy.avg_fill_price, Some(dec!(50000)));

    // The resting sell filled too.
    let sell_order = engine.get_order(&sell.order_id).unwrap();
    assert_eq!(sell_order.status, OrderStatus::Filled);

    let trades = engine.recent_trades(10);
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, dec!(50000));
    assert_eq!(trades[0].quantity, dec!(1.0));
    assert_eq!(trades[0].aggressor_side, Side::Buy);
    assert_eq!(trades[0].maker_order_id, sell.order_id);
    assert_eq!(trades[0].taker_order_id, buy.order_id);
}

#[test]
fn price_priority_fills_better_price_first() {
    let engine = engine();
    let worse = engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50100"));
    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50000"));

    let result = engine.submit_order(&market("BTC-USDT", "buy", "1.0"));
    assert_eq!(result.status, OrderStatus::Filled);
    assert_eq!(result.avg_fill_price, Some(dec!(50000)));

    // The worse-priced sell is still open.
    let resting = engine.get_order(&worse.order_id).unwrap();
    assert_eq!(resting.status, OrderStatus::Open);
}

#[test]
fn ioc_partial_fill_cancels_remainder() {
    let engine = engine();
    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50000"));

    let result = engine.submit_order(&OrderRequest {
        order_type: "ioc".to_string(),
        ..limit("BTC-USDT", "buy", "2.0", "50000")
    });
    assert_eq!(result.status, OrderStatus::PartialFillCancelled);
    assert_eq!(result.filled_quantity, Some(dec!(1.0)));
    assert_eq!(result.remaining_quantity, Some(dec!(0)));

    // Nothing rested.
    let view = engine.book_view("BTC-USDT", 10).unwrap();
    assert!(view.bids.is_empty());
    assert!(view.asks.is_empty());
}

#[test]
fn ioc_without_liquidity_rejects() {
    let engine = engine();
    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50100"));

    let result = engine.submit_order(&OrderRequest {
        order_type: "ioc".to_string(),
        ..limit("BTC-USDT", "buy", "1.0", "50000")
    });
    assert_eq!(result.status, OrderStatus::Rejected);
    assert!(result.error.is_some());
}

#[test]
fn fok_rejects_when_not_fully_fillable() {
    let engine = engine();
    let resting = engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50000"));

    let result = engine.submit_order(&OrderRequest {
        order_type: "fok".to_string(),
        ..limit("BTC-USDT", "buy", "2.0", "50000")
    });
    assert_eq!(result.status, OrderStatus::Rejected);
    assert_eq!(result.filled_quantity, Some(dec!(0)));
    assert!(engine.recent_trades(10).is_empty());

    // Book unchanged: the 1.0 sell still rests.
    let order = engine.get_order(&resting.order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Open);
    assert_eq!(order.remaining_quantity, dec!(1.0));
}

#[test]
fn fok_fills_against_exactly_sufficient_liquidity() {
    let engine = engine();
    engine.submit_order(&limit("BTC-USDT", "sell", "2.0", "50000"));

    let result = engine.submit_order(&OrderRequest {
        order_type: "fok".to_string(),
        ..limit("BTC-USDT", "buy", "2.0", "50000")
    });
    assert_eq!(result.status, OrderStatus::Filled);
    let trades = engine.recent_trades(10);
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].quantity, dec!(2.0));
    assert_eq!(trades[0].price, dec!(50000));
}

#[test]
fn time_priority_at_equal_price() {
    let engine = engine();
    let first = engine.submit_order(&limit("BTC-USDT", "buy", "1.0", "50000"));
    let second = engine.submit_order(&limit("BTC-USDT", "buy", "1.0", "50000"));

    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50000"));

    assert_eq!(
        engine.get_order(&first.order_id).unwrap().status,
        OrderStatus::Filled
    );
    assert_eq!(
        engine.get_order(&second.order_id).unwrap().status,
        OrderStatus::Open
    );
}

#[test]
fn market_order_on_empty_book_rejects() {
    let engine = engine();
    let result = engine.submit_order(&market("BTC-USDT", "buy", "1.0"));
    assert_eq!(result.status, OrderStatus::Rejected);
    assert!(result.error.unwrap().contains("insufficient liquidity"));
}

#[test]
fn market_order_partial_when_liquidity_exhausted() {
    let engine = engine();
    engine.submit_order(&limit("BTC-USDT", "sell", "1.5", "50000"));

    let result = engine.submit_order(&market("BTC-USDT", "buy", "4.0"));
    assert_eq!(result.status, OrderStatus::Partial);
    assert_eq!(result.filled_quantity, Some(dec!(1.5)));
    assert_eq!(result.remaining_quantity, Some(dec!(2.5)));
}

#[test]
fn limit_taker_gets_price_improvement() {
    let engine = engine();
    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "49900"));

    // Buyer willing to pay 50000 executes at the maker's 49900.
    let result = engine.submit_order(&limit("BTC-USDT", "buy", "1.0", "50000"));
    assert_eq!(result.status, OrderStatus::Filled);
    assert_eq!(result.avg_fill_price, Some(dec!(49900)));
}

#[test]
fn multi_level_walk_reports_weighted_average() {
    let engine = engine();
    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50000"));
    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50100"));

    let result = engine.submit_order(&limit("BTC-USDT", "buy", "2.0", "50100"));
    assert_eq!(result.status, OrderStatus::Filled);
    assert_eq!(result.avg_fill_price, Some(dec!(50050)));
    assert_eq!(engine.recent_trades(10).len(), 2);
}

#[test]
fn partial_limit_remainder_rests_on_book() {
    let engine = engine();
    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50000"));

    let result = engine.submit_order(&limit("BTC-USDT", "buy", "3.0", "50000"));
    assert_eq!(result.status, OrderStatus::Partial);
    assert_eq!(result.filled_quantity, Some(dec!(1.0)));
    assert_eq!(result.remaining_quantity, Some(dec!(2.0)));

    let view = engine.book_view("BTC-USDT", 10).unwrap();
    assert_eq!(view.bids, vec![("50000".to_string(), "2.0".to_string())]);
    assert_eq!(view.bbo.best_bid, Some(dec!(50000)));
}

#[test]
fn validation_rejections() {
    let engine = engine();

    // Missing field
    let result = engine.submit_order(&OrderRequest::default());
    assert_eq!(result.status, OrderStatus::Rejected);
    assert_eq!(result.order_id, "UNKNOWN");

    // Bad enum
    let result = engine.submit_order(&OrderRequest {
        side: "hold".to_string(),
        ..limit("BTC-USDT", "buy", "1", "100")
    });
    assert!(result.error.unwrap().contains("invalid side"));

    // Non-positive quantity
    let result = engine.submit_order(&limit("BTC-USDT", "buy", "0", "100"));
    assert_eq!(result.status, OrderStatus::Rejected);
    let result = engine.submit_order(&limit("BTC-USDT", "buy", "-1", "100"));
    assert_eq!(result.status, OrderStatus::Rejected);

    // Market order with a price
    let result = engine.submit_order(&OrderRequest {
        order_type: "market".to_string(),
        ..limit("BTC-USDT", "buy", "1", "100")
    });
    assert!(result.error.unwrap().contains("cannot have a price"));

    // Limit order without a price
    let result = engine.submit_order(&OrderRequest {
        price: None,
        ..limit("BTC-USDT", "buy", "1", "100")
    });
    assert!(result.error.unwrap().contains("must have a price"));

    // Every rejection happened before book creation.
    assert!(engine.symbols().is_empty());
}

#[test]
fn price_ceiling_boundary() {
    let engine = engine();

    // Exactly at max_price (default 1_000_000): accepted.
    let result = engine.submit_order(&limit("BTC-USDT", "buy", "1", "1000000"));
    assert_eq!(result.status, OrderStatus::Open);

    // Above: rejected.
    let result = engine.submit_order(&limit("BTC-USDT", "buy", "1", "1000000.01"));
    assert_eq!(result.status, OrderStatus::Rejected);
    assert!(result.error.unwrap().contains("exceeds maximum"));

    // Quantity ceiling behaves the same way.
    let result = engine.submit_order(&limit("BTC-USDT", "buy", "1000000", "100"));
    assert_eq!(result.status, OrderStatus::Open);
    let result = engine.submit_order(&limit("BTC-USDT", "buy", "1000001", "100"));
    assert_eq!(result.status, OrderStatus::Rejected);
}

#[test]
fn cancel_restores_book_state() {
    let engine = engine();
    engine.submit_order(&limit("BTC-USDT", "sell", "5", "50500"));
    let before = engine.book_view("BTC-USDT", 10).unwrap();

    let resting = engine.submit_order(&limit("BTC-USDT", "buy", "1.0", "50000"));
    let cancel = engine.cancel_order(&resting.order_id).unwrap();
    assert_eq!(cancel.status, OrderStatus::Cancelled);
    assert_eq!(cancel.filled_quantity, dec!(0));
    assert_eq!(cancel.cancelled_quantity, dec!(1.0));

    let after = engine.book_view("BTC-USDT", 10).unwrap();
    assert_eq!(before.bids, after.bids);
    assert_eq!(before.asks, after.asks);
    assert_eq!(before.bbo.best_bid, after.bbo.best_bid);
    assert_eq!(before.bbo.best_ask, after.bbo.best_ask);
}

#[test]
fn cancel_errors() {
    let engine = engine();

    // Unknown id
    let result = engine.cancel_order("ORD-missing");
    assert!(matches!(result, Err(EngineError::OrderNotFound { .. })));

    // Already filled
    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50000"));
    let buy = engine.submit_order(&limit("BTC-USDT", "buy", "1.0", "50000"));
    let result = engine.cancel_order(&buy.order_id);
    assert!(matches!(
        result,
        Err(EngineError::NotCancelable {
            status: OrderStatus::Filled,
            ..
        })
    ));
}

#[test]
fn duplicate_resting_id_rejected() {
    let engine = engine();
    let request = OrderRequest {
        order_id: Some("client-1".to_string()),
        ..limit("BTC-USDT", "buy", "1.0", "50000")
    };
    assert_eq!(engine.submit_order(&request).status, OrderStatus::Open);

    let result = engine.submit_order(&request);
    assert_eq!(result.status, OrderStatus::Rejected);
    assert!(result.error.unwrap().contains("already exists"));
}

#[test]
fn fees_attributed_per_tier() {
    let engine = engine();
    engine.submit_order(&OrderRequest {
        fee_tier: Some("vip".to_string()),
        ..limit("BTC-USDT", "sell", "1.0", "50000")
    });
    engine.submit_order(&limit("BTC-USDT", "buy", "1.0", "50000"));

    let trades = engine.recent_trades(1);
    // Maker at vip rate: 50000 * 1.0 * 0.0005 = 25
    assert_eq!(trades[0].maker_fee, dec!(25.0000));
    // Taker at default rate: 50000 * 1.0 * 0.002 = 100
    assert_eq!(trades[0].taker_fee, dec!(100.0000));
    assert_eq!(trades[0].fee_currency, "USDT");
}

#[test]
fn health_reflects_activity() {
    let engine = engine();
    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50000"));
    engine.submit_order(&limit("ETH-USDT", "buy", "2.0", "3000"));
    engine.submit_order(&market("BTC-USDT", "buy", "1.0"));

    let health = engine.health();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.orders_processed, 3);
    assert_eq!(health.trades_executed, 1);
    assert_eq!(health.total_volume, dec!(1.0));
    assert_eq!(
        health.active_symbols,
        vec!["BTC-USDT".to_string(), "ETH-USDT".to_string()]
    );
    assert_eq!(health.active_orders, 1);
}

#[test]
fn books_are_isolated_per_symbol() {
    let engine = engine();
    engine.submit_order(&limit("BTC-USDT", "sell", "1.0", "50000"));

    // A buy in another symbol finds no liquidity.
    let result = engine.submit_order(&market("ETH-USDT", "buy", "1.0"));
    assert_eq!(result.status, OrderStatus::Rejected);

    assert!(engine.book_view("DOGE-USDT", 10).is_err());
}
