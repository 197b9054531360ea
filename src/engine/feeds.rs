//! Market-data push feeds.
//!
//! Three logical channels (`trades`, `orderbook`, `bbo`) backed by
//! `tokio::sync::broadcast`. The engine publishes after every book
//! mutation; transports (WebSocket, NATS, ...) subscribe and forward.
//! Publishing never blocks matching: messages to channels with no
//! subscribers are dropped.

use crate::engine::types::BookView;
use crate::orderbook::Bbo;
use crate::orderbook::trade::Trade;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Buffered messages per channel before slow subscribers start lagging.
const FEED_CAPACITY: usize = 1024;

/// A trade published on the `trades` channel.
#[derive(Debug, Clone, Serialize)]
pub struct TradeMessage {
    /// Always `"trade"`.
    #[serde(rename = "type")]
    pub message_type: &'static str,
    /// Publication timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Trading symbol.
    pub symbol: String,
    /// The execution record.
    pub trade: Trade,
}

/// A depth update published on the `orderbook` channel.
#[derive(Debug, Clone, Serialize)]
pub struct BookMessage {
    /// Always `"orderbook"`.
    #[serde(rename = "type")]
    pub message_type: &'static str,
    /// Publication timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Trading symbol.
    pub symbol: String,
    /// Top-of-book depth view.
    pub book: BookView,
}

/// A best-bid-offer update published on the `bbo` channel.
#[derive(Debug, Clone, Serialize)]
pub struct BboMessage {
    /// Always `"bbo"`.
    #[serde(rename = "type")]
    pub message_type: &'static str,
    /// Publication timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Trading symbol.
    pub symbol: String,
    /// Best bid and offer with sizes.
    pub bbo: Bbo,
}

/// The engine's broadcast hub.
#[derive(Debug)]
pub struct MarketFeeds {
    trades: broadcast::Sender<TradeMessage>,
    orderbook: broadcast::Sender<BookMessage>,
    bbo: broadcast::Sender<BboMessage>,
}

impl MarketFeeds {
    /// Create the three channels.
    #[must_use]
    pub fn new() -> Self {
        let (trades, _) = broadcast::channel(FEED_CAPACITY);
        let (orderbook, _) = broadcast::channel(FEED_CAPACITY);
        let (bbo, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            trades,
            orderbook,
            bbo,
        }
    }

    /// Subscribe to trade executions.
    #[must_use]
    pub fn subscribe_trades(&self) -> broadcast::Receiver<TradeMessage> {
        self.trades.subscribe()
    }

    /// Subscribe to depth updates.
    #[must_use]
    pub fn subscribe_orderbook(&self) -> broadcast::Receiver<BookMessage> {
        self.orderbook.subscribe()
    }

    /// Subscribe to BBO updates.
    #[must_use]
    pub fn subscribe_bbo(&self) -> broadcast::Receiver<BboMessage> {
        self.bbo.subscribe()
    }

    pub(crate) fn publish_trade(&self, trade: &Trade) {
        let _ = self.trades.send(TradeMessage {
            message_type: "trade",
            timestamp: Utc::now(),
            symbol: trade.symbol.clone(),
            trade: trade.clone(),
        });
    }

    pub(crate) fn publish_book(&self, book: BookView) {
        let _ = self.orderbook.send(BookMessage {
            message_type: "orderbook",
            timestamp: Utc::now(),
            symbol: book.symbol.clone(),
            book,
        });
    }

    pub(crate) fn publish_bbo(&self, symbol: &str, bbo: Bbo) {
        let _ = self.bbo.send(BboMessage {
            message_type: "bbo",
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            bbo,
        });
    }
}

impl Default for MarketFeeds {
    fn default() -> Self {
        Self::new()
    }
}
