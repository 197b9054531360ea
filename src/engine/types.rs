//! Request and response documents at the engine boundary.
//!
//! Requests arrive with string-typed numeric fields and are validated by
//! the engine; responses carry typed fields that serialize decimals in
//! string form. No error ever escapes the submit boundary: a failed
//! submission becomes a response with `status: "rejected"` and an `error`
//! string.

use crate::orderbook::order::{Order, OrderKind, OrderStatus, Side};
use crate::orderbook::{Bbo, EngineError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An order submission as received from the request surface.
///
/// Numeric fields are decimal strings, exactly as they travel on the wire;
/// the engine parses and validates them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Trading symbol; books are auto-created on first sight.
    #[serde(default)]
    pub symbol: String,
    /// `market`, `limit`, `ioc`, or `fok`.
    #[serde(default)]
    pub order_type: String,
    /// `buy` or `sell`.
    #[serde(default)]
    pub side: String,
    /// Decimal string, must be positive.
    #[serde(default)]
    pub quantity: String,
    /// Decimal string; required for priced kinds, forbidden for market.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// Optional client correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Optional externally supplied order id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Optional fee tier name; unknown tiers bill at `default`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_tier: Option<String>,
}

/// The outcome of an order submission.
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    /// The order id (generated when the request carried none), or
    /// `UNKNOWN` when rejection happened before identity was assigned.
    pub order_id: String,
    /// Final status after the remainder policy.
    pub status: OrderStatus,
    /// Human-readable rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    pub original_quantity: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    pub filled_quantity: Option<Decimal>,
    /// Remaining after the remainder policy: an IOC reports `0` because
    /// its remainder is cancelled, not resting.
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    pub remaining_quantity: Option<Decimal>,
    /// Volume-weighted average fill price, present when trades occurred.
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    pub avg_fill_price: Option<Decimal>,
    /// Response timestamp (UTC).
    pub timestamp: DateTime<Utc>,
}

impl OrderResponse {
    /// Full response document for a materialized order.
    #[must_use]
    pub fn from_order(order: &Order, avg_fill_price: Option<Decimal>) -> Self {
        Self {
            order_id: order.order_id.clone(),
            status: order.status,
            error: None,
            symbol: Some(order.symbol.clone()),
            order_type: Some(order.kind),
            side: Some(order.side),
            price: order.price,
            original_quantity: Some(order.original_quantity),
            filled_quantity: Some(order.filled_quantity),
            remaining_quantity: Some(order.remaining_quantity),
            avg_fill_price,
            timestamp: Utc::now(),
        }
    }

    /// Full response document for an order rejected by a business rule.
    #[must_use]
    pub fn rejected_order(order: &Order, error: &EngineError) -> Self {
        let mut response = Self::from_order(order, None);
        response.error = Some(error.to_string());
        response
    }

    /// Minimal rejection document for requests that failed validation
    /// before an order was materialized.
    #[must_use]
    pub fn rejected(order_id: Option<&str>, error: &EngineError) -> Self {
        Self {
            order_id: order_id.unwrap_or("UNKNOWN").to_string(),
            status: OrderStatus::Rejected,
            error: Some(error.to_string()),
            symbol: None,
            order_type: None,
            side: None,
            price: None,
            original_quantity: None,
            filled_quantity: None,
            remaining_quantity: None,
            avg_fill_price: None,
            timestamp: Utc::now(),
        }
    }
}

/// The outcome of a successful cancellation.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    /// The cancelled order's id.
    pub order_id: String,
    /// Always [`OrderStatus::Cancelled`].
    pub status: OrderStatus,
    /// Quantity that had executed before the cancel.
    #[serde(with = "rust_decimal::serde::str")]
    pub filled_quantity: Decimal,
    /// Quantity removed from the book.
    #[serde(with = "rust_decimal::serde::str")]
    pub cancelled_quantity: Decimal,
    /// Response timestamp (UTC).
    pub timestamp: DateTime<Utc>,
}

/// A conditional (stop / take-profit) order registration request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionalRequest {
    /// Trading symbol.
    #[serde(default)]
    pub symbol: String,
    /// `stop_loss`, `stop_limit`, or `take_profit`.
    #[serde(default)]
    pub order_type: String,
    /// `buy` or `sell`.
    #[serde(default)]
    pub side: String,
    /// Decimal string, must be positive.
    #[serde(default)]
    pub quantity: String,
    /// Trigger price as a decimal string.
    #[serde(default)]
    pub trigger_price: String,
    /// Limit price for `stop_limit`; ignored otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    /// Optional client correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Optional externally supplied order id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
}

/// The outcome of a conditional-order registration.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionalResponse {
    /// The conditional order's id, when registration succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// `pending` on success, `rejected` on failure.
    pub status: String,
    /// Human-readable rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option", skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
}

/// A market-data view of one book: top levels plus the BBO.
#[derive(Debug, Clone, Serialize)]
pub struct BookView {
    /// Trading symbol.
    pub symbol: String,
    /// View timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Top bid levels as `[price, quantity]` decimal strings, highest first.
    pub bids: Vec<(String, String)>,
    /// Top ask levels as `[price, quantity]` decimal strings, lowest first.
    pub asks: Vec<(String, String)>,
    /// Best bid and offer.
    pub bbo: Bbo,
}

/// Engine health and throughput counters.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Always `healthy` while the engine serves.
    pub status: String,
    /// Seconds since the engine was constructed.
    pub uptime_seconds: u64,
    /// Orders accepted through the submit path.
    pub orders_processed: u64,
    /// Trades executed.
    pub trades_executed: u64,
    /// Total executed quantity across all trades.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_volume: Decimal,
    /// Symbols with a live book.
    pub active_symbols: Vec<String>,
    /// Orders currently resting across all books.
    pub active_orders: usize,
    /// Report timestamp (UTC).
    pub timestamp: DateTime<Utc>,
}

/// Counters describing a completed startup recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryStats {
    /// `ORDER_SUBMIT` records replayed through the submit path.
    pub orders_replayed: usize,
    /// `ORDER_CANCEL` records re-applied.
    pub cancels_replayed: usize,
    /// `CONDITIONAL_SUBMIT` records restored into the registry.
    pub conditionals_restored: usize,
    /// `TRADE_EXECUTE` records reconciled against replay output.
    pub trades_reconciled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_request_deserializes_with_missing_fields() {
        let request: OrderRequest = serde_json::from_str(r#"{"symbol": "BTC-USDT"}"#).unwrap();
        assert_eq!(request.symbol, "BTC-USDT");
        assert!(request.order_type.is_empty());
        assert!(request.price.is_none());
    }

    #[test]
    fn test_rejected_response_is_minimal() {
        let response = OrderResponse::rejected(
            None,
            &EngineError::MissingField { field: "symbol" },
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["order_id"], "UNKNOWN");
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["error"], "missing required field: symbol");
        assert!(json.get("filled_quantity").is_none());
    }

    #[test]
    fn test_full_response_serializes_decimal_strings() {
        let mut order = Order::new(Some("ORD-1".to_string()));
        order
            .initialize(
                "BTC-USDT",
                Side::Buy,
                OrderKind::Limit,
                dec!(2),
                Some(dec!(50000)),
                None,
            )
            .unwrap();
        order.fill(dec!(2), dec!(50000)).unwrap();

        let response = OrderResponse::from_order(&order, Some(dec!(50000)));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "filled");
        assert_eq!(json["filled_quantity"], "2");
        assert_eq!(json["remaining_quantity"], "0");
        assert_eq!(json["avg_fill_price"], "50000");
        assert_eq!(json["order_type"], "limit");
        assert_eq!(json["side"], "buy");
    }
}
