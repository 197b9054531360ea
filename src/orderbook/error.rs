//! Engine error types

use crate::orderbook::order::{OrderKind, OrderStatus, Side};
use rust_decimal::Decimal;
use std::fmt;
use std::path::PathBuf;

/// Errors that can occur within the matching engine and its order books.
///
/// Every failure at the submit boundary is converted into a rejected-order
/// response; these values never escape as panics.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EngineError {
    /// A required request field was absent or empty.
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// The request carried an unrecognized side.
    InvalidSide {
        /// The offending value.
        value: String,
    },

    /// The request carried an unrecognized order type.
    InvalidOrderKind {
        /// The offending value.
        value: String,
    },

    /// A decimal field could not be parsed.
    InvalidDecimal {
        /// Name of the field.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// Quantity was zero or negative.
    InvalidQuantity {
        /// The offending quantity.
        quantity: Decimal,
    },

    /// Quantity exceeded the configured maximum.
    QuantityAboveMax {
        /// The offending quantity.
        quantity: Decimal,
        /// The configured ceiling.
        max: Decimal,
    },

    /// Price was zero or negative.
    InvalidPrice {
        /// The offending price.
        price: Decimal,
    },

    /// Price exceeded the configured maximum.
    PriceAboveMax {
        /// The offending price.
        price: Decimal,
        /// The configured ceiling.
        max: Decimal,
    },

    /// A market order carried a limit price.
    MarketOrderWithPrice,

    /// A priced order kind arrived without a price.
    MissingPrice {
        /// The order kind that requires a price.
        kind: OrderKind,
    },

    /// An order with this id is already resting on the book.
    DuplicateOrderId {
        /// The duplicate id.
        order_id: String,
    },

    /// No order with this id is known to any book.
    OrderNotFound {
        /// The id that was looked up.
        order_id: String,
    },

    /// No book exists for this symbol.
    SymbolNotFound {
        /// The symbol that was looked up.
        symbol: String,
    },

    /// Cancel was attempted on an order in a terminal state.
    NotCancelable {
        /// The order id.
        order_id: String,
        /// Its current status.
        status: OrderStatus,
    },

    /// A fill exceeded the order's remaining quantity.
    InvalidFill {
        /// The order id.
        order_id: String,
        /// The fill quantity requested.
        requested: Decimal,
        /// The quantity actually remaining.
        remaining: Decimal,
    },

    /// Not enough crossable liquidity: market order on an empty book, or a
    /// fill-or-kill order that cannot fill completely.
    InsufficientLiquidity {
        /// The taker side.
        side: Side,
        /// Quantity requested.
        requested: Decimal,
        /// Crossable quantity available.
        available: Decimal,
    },

    /// Error while serializing engine state.
    Serialization {
        /// Underlying error message.
        message: String,
    },

    /// Error while deserializing engine state.
    Deserialization {
        /// Underlying error message.
        message: String,
    },

    /// An I/O error during persistence.
    Io {
        /// Underlying error message.
        message: String,
        /// The file path involved, if known.
        path: Option<PathBuf>,
    },

    /// Replay produced a different execution than the write-ahead log
    /// records. Fatal: the engine refuses to serve.
    ReplayDivergence {
        /// Zero-based index of the diverging WAL record.
        index: usize,
        /// Description of the mismatch.
        detail: String,
    },

    /// Internal book invariant broken (id-index / level desync). Fatal.
    InvariantViolation {
        /// Description of the broken invariant.
        message: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::MissingField { field } => {
                write!(f, "missing required field: {field}")
            }
            EngineError::InvalidSide { value } => write!(f, "invalid side: {value}"),
            EngineError::InvalidOrderKind { value } => {
                write!(f, "invalid order type: {value}")
            }
            EngineError::InvalidDecimal { field, value } => {
                write!(f, "invalid decimal for {field}: {value}")
            }
            EngineError::InvalidQuantity { quantity } => {
                write!(f, "quantity must be positive, got {quantity}")
            }
            EngineError::QuantityAboveMax { quantity, max } => {
                write!(f, "quantity {quantity} exceeds maximum {max}")
            }
            EngineError::InvalidPrice { price } => {
                write!(f, "price must be positive, got {price}")
            }
            EngineError::PriceAboveMax { price, max } => {
                write!(f, "price {price} exceeds maximum {max}")
            }
            EngineError::MarketOrderWithPrice => {
                write!(f, "market orders cannot have a price")
            }
            EngineError::MissingPrice { kind } => {
                write!(f, "{kind} orders must have a price")
            }
            EngineError::DuplicateOrderId { order_id } => {
                write!(f, "order {order_id} already exists")
            }
            EngineError::OrderNotFound { order_id } => {
                write!(f, "order {order_id} not found")
            }
            EngineError::SymbolNotFound { symbol } => {
                write!(f, "symbol {symbol} not found")
            }
            EngineError::NotCancelable { order_id, status } => {
                write!(f, "cannot cancel order {order_id} in {status} state")
            }
            EngineError::InvalidFill {
                order_id,
                requested,
                remaining,
            } => {
                write!(
                    f,
                    "cannot fill {requested} on order {order_id}, only {remaining} remaining"
                )
            }
            EngineError::InsufficientLiquidity {
                side,
                requested,
                available,
            } => {
                write!(
                    f,
                    "insufficient liquidity for {side} order: requested {requested}, available {available}"
                )
            }
            EngineError::Serialization { message } => {
                write!(f, "serialization error: {message}")
            }
            EngineError::Deserialization { message } => {
                write!(f, "deserialization error: {message}")
            }
            EngineError::Io { message, path } => {
                if let Some(p) = path {
                    write!(f, "I/O error at {}: {message}", p.display())
                } else {
                    write!(f, "I/O error: {message}")
                }
            }
            EngineError::ReplayDivergence { index, detail } => {
                write!(f, "replay divergence at WAL record {index}: {detail}")
            }
            EngineError::InvariantViolation { message } => {
                write!(f, "book invariant violation: {message}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        EngineError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    #[cold]
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization {
            message: err.to_string(),
        }
    }
}
