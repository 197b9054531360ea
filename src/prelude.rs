//! Prelude module that re-exports commonly used types and traits.
//!
//! Instead of importing each type individually, you can use:
//!
//! ```rust
//! use matchbook_rs::prelude::*;
//! ```
//!
//! This imports everything needed for submitting orders, inspecting books,
//! and wiring up persistence.

// Engine and configuration
pub use crate::config::EngineConfig;
pub use crate::engine::MatchingEngine;

// Order book types
pub use crate::orderbook::{Bbo, EngineError, Fill, MatchOutcome, OrderBook};

// Order and trade types
pub use crate::orderbook::fees::{FeeBreakdown, FeeSchedule, FeeTier};
pub use crate::orderbook::order::{Order, OrderKind, OrderStatus, Side};
pub use crate::orderbook::trade::{Trade, TradeHistory, TradeIdGenerator};

// Conditional orders
pub use crate::engine::conditional::{ConditionalKind, ConditionalOrder};

// Boundary documents
pub use crate::engine::types::{
    BookView, CancelResponse, ConditionalRequest, ConditionalResponse, HealthReport, OrderRequest,
    OrderResponse, RecoveryStats,
};

// Market-data feeds
pub use crate::engine::feeds::{BboMessage, BookMessage, MarketFeeds, TradeMessage};

// Persistence
pub use crate::persistence::{
    SnapshotDocument, SnapshotStore, WalEntry, WalError, WalRecord, WriteAheadLog,
};

// Utility functions
pub use crate::current_time_millis;
