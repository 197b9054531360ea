//! # Central Limit Order Book Matching Engine
//!
//! A multi-symbol matching engine for a single-venue, cryptocurrency-style
//! exchange. The engine accepts order submissions, matches them against
//! resting liquidity under strict price-time priority, emits trade
//! executions with maker/taker fee attribution, and keeps every book
//! recoverable through a write-ahead log and point-in-time snapshots.
//!
//! ## Key Features
//!
//! - **Price-time priority matching**: incoming orders always consume the
//!   best opposing price first, and within a price level fill strictly in
//!   arrival order. Trade-throughs are impossible by construction.
//!
//! - **Four order types**: market, limit, immediate-or-cancel, and
//!   fill-or-kill, with a total remainder policy over
//!   `(type, has_trades, remaining)`. Fill-or-kill runs a read-only
//!   feasibility check first, so a rejected FOK leaves the book untouched.
//!
//! - **Conditional orders**: stop-loss, stop-limit, and take-profit
//!   entries wait in a per-symbol registry keyed by trigger price. A
//!   last-trade-price update evaluates fired triggers in O(log N + k) and
//!   promotes them to live market or limit orders, breadth-first, under a
//!   configurable cascade cap.
//!
//! - **Exact decimal arithmetic**: every price and quantity is a
//!   [`rust_decimal::Decimal`]; average fill prices and fee amounts round
//!   half-even. No binary floating point touches money.
//!
//! - **O(1) best-bid-offer**: each book caches its BBO and recomputes it
//!   lazily after mutations; depth and order lookup are served from the
//!   same multi-index structure (sorted price levels plus an id index).
//!
//! - **Durability**: an append-only NDJSON write-ahead log records every
//!   submission, trade, cancel, and conditional registration. On startup
//!   the log is replayed through the normal submit path with logging
//!   suppressed, and recorded trades are reconciled field-by-field against
//!   replay output; any divergence is fatal.
//!
//! - **Market-data feeds**: three broadcast channels (`trades`,
//!   `orderbook`, `bbo`) publish after every book change for push
//!   transports to forward.
//!
//! ## Example
//!
//! ```
//! use matchbook_rs::prelude::*;
//!
//! let engine = MatchingEngine::new();
//!
//! let response = engine.submit_order(&OrderRequest {
//!     symbol: "BTC-USDT".to_string(),
//!     order_type: "limit".to_string(),
//!     side: "sell".to_string(),
//!     quantity: "1.0".to_string(),
//!     price: Some("50000".to_string()),
//!     ..OrderRequest::default()
//! });
//! assert_eq!(response.status, OrderStatus::Open);
//!
//! let response = engine.submit_order(&OrderRequest {
//!     symbol: "BTC-USDT".to_string(),
//!     order_type: "market".to_string(),
//!     side: "buy".to_string(),
//!     quantity: "1.0".to_string(),
//!     ..OrderRequest::default()
//! });
//! assert_eq!(response.status, OrderStatus::Filled);
//! ```
//!
//! ## Concurrency Model
//!
//! A single logical matching thread per engine: submissions and cancels
//! serialize on an internal lock, and the order in which they win that
//! lock is the canonical ordering: it equals `arrival_seq` order, WAL
//! order, and replay order. Market-data readers (depth, BBO, order
//! lookup) take short read locks on the per-book state and never block
//! matching for long. Persistence and feed publication observe
//! already-committed effects and never mutate book state.
//!
//! ## Scope
//!
//! The engine is the core of an exchange, not the whole of one: the HTTP
//! surface, push transport, authentication, and schema validation live
//! upstream and talk to the engine through [`MatchingEngine`]'s methods
//! and the [`engine::feeds::MarketFeeds`] channels.

pub mod config;
pub mod engine;
pub mod orderbook;
pub mod persistence;

pub mod prelude;
mod utils;

pub use config::EngineConfig;
pub use engine::MatchingEngine;
pub use engine::conditional::{ConditionalKind, ConditionalOrder};
pub use engine::feeds::{BboMessage, BookMessage, MarketFeeds, TradeMessage};
pub use engine::metrics::EngineMetrics;
pub use engine::types::{
    BookView, CancelResponse, ConditionalRequest, ConditionalResponse, HealthReport, OrderRequest,
    OrderResponse, RecoveryStats,
};
pub use orderbook::fees::{FeeBreakdown, FeeSchedule, FeeTier};
pub use orderbook::order::{Order, OrderKind, OrderStatus, Side};
pub use orderbook::trade::{Trade, TradeHistory, TradeIdGenerator};
pub use orderbook::{Bbo, EngineError, Fill, MatchOutcome, OrderBook};
pub use persistence::{
    SnapshotDocument, SnapshotStore, WalEntry, WalError, WalRecord, WriteAheadLog,
};
pub use utils::current_time_millis;
