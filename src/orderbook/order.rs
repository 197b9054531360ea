//! Order record: identity, parameters, and mutable execution state.
//!
//! An [`Order`] is created in two steps: [`Order::new`] assigns (or accepts)
//! the identity, [`Order::initialize`] sets the full parameters with
//! validation. The split keeps construction cheap and allows records to be
//! reused from a pool. All state transitions after initialization go through
//! [`Order::fill`], [`Order::cancel`], [`Order::cancel_unfilled`] and
//! [`Order::reject`], which stamp `updated_at`.

use crate::orderbook::error::EngineError;
use crate::utils::current_time_secs;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which side of the book an order rests on or takes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Bid side.
    Buy,
    /// Ask side.
    Sell,
}

impl Side {
    /// The opposite side, i.e. the side an incoming order matches against.
    #[inline]
    #[must_use]
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Parse the wire form (`buy` / `sell`, case-insensitive).
    pub fn parse(value: &str) -> Result<Side, EngineError> {
        match value.to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => Err(EngineError::InvalidSide {
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Execution style of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// Consume liquidity at any price until filled or the book is empty.
    Market,
    /// Match what crosses, rest the remainder at the limit price.
    Limit,
    /// Immediate-or-cancel: match what crosses now, cancel the rest.
    Ioc,
    /// Fill-or-kill: fill the entire quantity immediately or reject with
    /// no side effects on the book.
    Fok,
}

impl OrderKind {
    /// Whether this kind carries a limit price.
    #[inline]
    #[must_use]
    pub fn has_price(&self) -> bool {
        !matches!(self, OrderKind::Market)
    }

    /// Parse the wire form (`market` / `limit` / `ioc` / `fok`).
    pub fn parse(value: &str) -> Result<OrderKind, EngineError> {
        match value.to_ascii_lowercase().as_str() {
            "market" => Ok(OrderKind::Market),
            "limit" => Ok(OrderKind::Limit),
            "ioc" => Ok(OrderKind::Ioc),
            "fok" => Ok(OrderKind::Fok),
            _ => Err(EngineError::InvalidOrderKind {
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "market"),
            OrderKind::Limit => write!(f, "limit"),
            OrderKind::Ioc => write!(f, "ioc"),
            OrderKind::Fok => write!(f, "fok"),
        }
    }
}

/// Lifecycle state of an order.
///
/// `Filled`, `Cancelled`, `Rejected` and `PartialFillCancelled` are
/// terminal: no further mutation is allowed from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created but not yet routed through matching.
    Pending,
    /// Resting on the book, nothing filled yet.
    Open,
    /// Resting on the book with a partial fill, or a market order that
    /// exhausted available liquidity.
    Partial,
    /// Fully executed.
    Filled,
    /// Cancelled before completion.
    Cancelled,
    /// Refused by validation or a business rule.
    Rejected,
    /// Immediate-or-cancel order that filled partially before the
    /// remainder was cancelled.
    PartialFillCancelled,
}

impl OrderStatus {
    /// Whether this state admits no further transitions.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::PartialFillCancelled
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Open => "open",
            OrderStatus::Partial => "partial",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::PartialFillCancelled => "partial_fill_cancelled",
        };
        write!(f, "{s}")
    }
}

/// A single order: immutable identity plus mutable execution state.
///
/// Quantities always satisfy
/// `original_quantity = filled_quantity + remaining_quantity + cancelled_quantity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier, generated on ingress when the client supplies none.
    pub order_id: String,
    /// Trading symbol this order belongs to.
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Execution style.
    pub kind: OrderKind,
    /// Limit price. `None` for market orders.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub price: Option<Decimal>,
    /// Quantity at submission.
    #[serde(with = "rust_decimal::serde::str")]
    pub original_quantity: Decimal,
    /// Quantity executed so far.
    #[serde(with = "rust_decimal::serde::str")]
    pub filled_quantity: Decimal,
    /// Quantity still live.
    #[serde(with = "rust_decimal::serde::str")]
    pub remaining_quantity: Decimal,
    /// Quantity cancelled (explicit cancel or IOC remainder).
    #[serde(with = "rust_decimal::serde::str")]
    pub cancelled_quantity: Decimal,
    /// Lifecycle state.
    pub status: OrderStatus,
    /// Optional client-supplied correlation id.
    pub client_id: Option<String>,
    /// Optional fee tier name; unknown or absent tiers bill at `default`.
    pub fee_tier: Option<String>,
    /// Strictly increasing per engine process; defines time priority.
    pub arrival_seq: u64,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last mutation (UTC).
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create an empty order record.
    ///
    /// When `order_id` is `None` an identifier of the form
    /// `ORD-<epoch_s>-<6 hex>` is generated. The record is not usable for
    /// matching until [`Order::initialize`] has run.
    #[must_use]
    pub fn new(order_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            order_id: order_id.unwrap_or_else(Self::generate_id),
            symbol: String::new(),
            side: Side::Buy,
            kind: OrderKind::Limit,
            price: None,
            original_quantity: Decimal::ZERO,
            filled_quantity: Decimal::ZERO,
            remaining_quantity: Decimal::ZERO,
            cancelled_quantity: Decimal::ZERO,
            status: OrderStatus::Pending,
            client_id: None,
            fee_tier: None,
            arrival_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Generate an order identifier: `ORD-<epoch_s>-<6 hex>`.
    #[must_use]
    pub fn generate_id() -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("ORD-{}-{}", current_time_secs(), &suffix[..6])
    }

    /// Set the full order parameters.
    ///
    /// # Errors
    ///
    /// Rejects non-positive quantities, market orders carrying a price, and
    /// priced kinds missing one.
    pub fn initialize(
        &mut self,
        symbol: &str,
        side: Side,
        kind: OrderKind,
        quantity: Decimal,
        price: Option<Decimal>,
        client_id: Option<String>,
    ) -> Result<(), EngineError> {
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity { quantity });
        }
        match (kind.has_price(), price) {
            (false, Some(_)) => return Err(EngineError::MarketOrderWithPrice),
            (true, None) => return Err(EngineError::MissingPrice { kind }),
            (true, Some(p)) if p <= Decimal::ZERO => {
                return Err(EngineError::InvalidPrice { price: p });
            }
            _ => {}
        }

        self.symbol = symbol.to_string();
        self.side = side;
        self.kind = kind;
        self.original_quantity = quantity;
        self.remaining_quantity = quantity;
        self.filled_quantity = Decimal::ZERO;
        self.cancelled_quantity = Decimal::ZERO;
        self.price = price;
        self.client_id = client_id;
        self.touch();
        Ok(())
    }

    /// Whether the order is live on a book.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Open | OrderStatus::Partial)
    }

    /// Whether the given price is acceptable to this order as a taker.
    ///
    /// Market orders accept any price; limit-priced orders cross when the
    /// resting price is equal to or better than their own limit.
    #[must_use]
    pub fn crosses(&self, resting_price: Decimal) -> bool {
        match self.price {
            None => true,
            Some(own) => match self.side {
                Side::Buy => own >= resting_price,
                Side::Sell => own <= resting_price,
            },
        }
    }

    /// Execute a fill of `quantity` at `price` against this order.
    ///
    /// Sets the status to [`OrderStatus::Filled`] when nothing remains,
    /// [`OrderStatus::Partial`] otherwise.
    ///
    /// # Errors
    ///
    /// Fails when `quantity` exceeds the remaining quantity; the record is
    /// left untouched in that case.
    pub fn fill(&mut self, quantity: Decimal, price: Decimal) -> Result<(), EngineError> {
        if quantity > self.remaining_quantity {
            return Err(EngineError::InvalidFill {
                order_id: self.order_id.clone(),
                requested: quantity,
                remaining: self.remaining_quantity,
            });
        }
        self.filled_quantity += quantity;
        self.remaining_quantity -= quantity;
        self.status = if self.remaining_quantity.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
        self.touch();
        tracing::trace!(
            order_id = %self.order_id,
            %quantity,
            %price,
            status = %self.status,
            "order filled"
        );
        Ok(())
    }

    /// Cancel the order, moving the remaining quantity to cancelled.
    ///
    /// # Errors
    ///
    /// Fails when the order is already in a terminal state.
    pub fn cancel(&mut self) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::NotCancelable {
                order_id: self.order_id.clone(),
                status: self.status,
            });
        }
        self.cancelled_quantity += self.remaining_quantity;
        self.remaining_quantity = Decimal::ZERO;
        self.status = OrderStatus::Cancelled;
        self.touch();
        Ok(())
    }

    /// Cancel the unfilled remainder of a partially executed taker.
    ///
    /// Used for the IOC remainder policy: the order ends in
    /// [`OrderStatus::PartialFillCancelled`] when something filled,
    /// [`OrderStatus::Cancelled`] otherwise.
    pub fn cancel_unfilled(&mut self) {
        self.cancelled_quantity += self.remaining_quantity;
        self.remaining_quantity = Decimal::ZERO;
        self.status = if self.filled_quantity > Decimal::ZERO {
            OrderStatus::PartialFillCancelled
        } else {
            OrderStatus::Cancelled
        };
        self.touch();
    }

    /// Mark the order rejected. Allowed from any non-terminal state.
    pub fn reject(&mut self) {
        self.status = OrderStatus::Rejected;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order({} {} {} {}",
            self.order_id, self.symbol, self.side, self.kind
        )?;
        if let Some(price) = self.price {
            write!(f, " @ {price}")?;
        }
        write!(
            f,
            ", qty={}, filled={}, status={})",
            self.original_quantity, self.filled_quantity, self.status
        )
    }
}
