//! The matching engine: order-type dispatch, multi-book registry,
//! conditional orders, persistence glue, and market-data publication.
//!
//! One [`MatchingEngine`] value owns everything; there is no process-wide
//! state. Submissions are serialized by an internal lock, and the order in
//! which they win that lock defines `arrival_seq`, WAL order, and replay
//! order: the single ordering the engine commits to.

pub mod conditional;
pub mod feeds;
pub mod metrics;
mod submit;
pub mod types;

use crate::config::EngineConfig;
use crate::engine::conditional::ConditionalRegistry;
use crate::engine::feeds::MarketFeeds;
use crate::engine::metrics::EngineMetrics;
use crate::engine::types::{BookView, HealthReport, RecoveryStats};
use crate::orderbook::fees::FeeSchedule;
use crate::orderbook::order::{Order, Side};
use crate::orderbook::trade::{Trade, TradeHistory, TradeIdGenerator};
use crate::orderbook::{EngineError, OrderBook};
use crate::persistence::{SnapshotDocument, SnapshotStore, WalRecord, WriteAheadLog};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{info, warn};

/// Depth levels included in published book views.
pub(crate) const DEFAULT_DEPTH: usize = 10;

/// A multi-symbol central limit order book matching engine.
///
/// See the crate documentation for an overview of the submit pipeline.
pub struct MatchingEngine {
    pub(crate) config: EngineConfig,
    pub(crate) books: DashMap<String, Arc<OrderBook>>,
    pub(crate) conditionals: DashMap<String, ConditionalRegistry>,
    /// Terminal orders kept for lookup and cancel semantics. Grows with
    /// order flow; operators restart or snapshot-rotate long-lived engines.
    pub(crate) closed_orders: DashMap<String, Order>,
    pub(crate) fee_schedule: FeeSchedule,
    pub(crate) trade_ids: TradeIdGenerator,
    pub(crate) trade_history: TradeHistory,
    pub(crate) wal: Option<WriteAheadLog>,
    snapshots: Option<SnapshotStore>,
    pub(crate) feeds: MarketFeeds,
    pub(crate) metrics: EngineMetrics,
    pub(crate) arrival_seq: AtomicU64,
    /// Serializes submissions and cancels; lock acquisition order is the
    /// canonical arrival order.
    pub(crate) submit_lock: Mutex<()>,
    /// Suppresses WAL writes while replaying the log through the normal
    /// submit path.
    pub(crate) replaying: AtomicBool,
    /// Set while the trigger cascade promotes conditional orders. A
    /// promotion is a deterministic consequence of logged inputs, so its
    /// `ORDER_SUBMIT` is not logged (replay re-fires it); its trades are.
    pub(crate) promoting: AtomicBool,
    recovery: Option<RecoveryStats>,
}

impl MatchingEngine {
    /// Create a purely in-memory engine: no WAL, no snapshot store.
    #[must_use]
    pub fn new() -> Self {
        Self::build(EngineConfig::in_memory(), None, None)
    }

    /// Create an engine from configuration, opening the WAL and snapshot
    /// store and replaying the log into memory.
    ///
    /// # Errors
    ///
    /// Fails when the WAL cannot be opened, or with
    /// [`EngineError::ReplayDivergence`] when the log's recorded trades do
    /// not match the trades replay produces; the engine refuses to serve
    /// in that case.
    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        let wal = if config.wal_enabled {
            Some(WriteAheadLog::open(&config.wal_path).map_err(|e| EngineError::Io {
                message: e.to_string(),
                path: Some(config.wal_path.clone()),
            })?)
        } else {
            None
        };
        let snapshots = Some(SnapshotStore::new(
            &config.snapshot_dir,
            config.snapshot_retain_n,
        ));

        let mut engine = Self::build(config, wal, snapshots);
        if engine.wal.is_some() {
            let stats = engine.recover()?;
            engine.recovery = Some(stats);
        }
        Ok(engine)
    }

    fn build(
        config: EngineConfig,
        wal: Option<WriteAheadLog>,
        snapshots: Option<SnapshotStore>,
    ) -> Self {
        let fee_schedule = FeeSchedule::new(config.fee_tiers.clone(), config.fee_currency.clone());
        let trade_history = TradeHistory::new(config.trade_history_capacity);
        Self {
            config,
            books: DashMap::new(),
            conditionals: DashMap::new(),
            closed_orders: DashMap::new(),
            fee_schedule,
            trade_ids: TradeIdGenerator::new(),
            trade_history,
            wal,
            snapshots,
            feeds: MarketFeeds::new(),
            metrics: EngineMetrics::new(),
            arrival_seq: AtomicU64::new(0),
            submit_lock: Mutex::new(()),
            replaying: AtomicBool::new(false),
            promoting: AtomicBool::new(false),
            recovery: None,
        }
    }

    /// Statistics from startup recovery, when a WAL was replayed.
    #[must_use]
    pub fn recovery_stats(&self) -> Option<RecoveryStats> {
        self.recovery
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The market-data broadcast hub.
    #[must_use]
    pub fn feeds(&self) -> &MarketFeeds {
        &self.feeds
    }

    /// Symbols with a live book.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.books.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Look up an order by id: resting orders first, then terminal ones.
    #[must_use]
    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        for book in self.books.iter() {
            if let Some(order) = book.get_order(order_id) {
                return Some(order);
            }
        }
        self.closed_orders.get(order_id).map(|o| o.clone())
    }

    /// Market-data view of one book: top `depth` levels plus the BBO.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SymbolNotFound`] for symbols without a book.
    pub fn book_view(&self, symbol: &str, depth: usize) -> Result<BookView, EngineError> {
        let book = self
            .books
            .get(symbol)
            .ok_or_else(|| EngineError::SymbolNotFound {
                symbol: symbol.to_string(),
            })?;
        Ok(Self::view_of(book.value().as_ref(), depth))
    }

    pub(crate) fn view_of(book: &OrderBook, depth: usize) -> BookView {
        let (bids, asks) = book.depth(depth);
        BookView {
            symbol: book.symbol().to_string(),
            timestamp: Utc::now(),
            bids: bids
                .into_iter()
                .map(|(p, q)| (p.to_string(), q.to_string()))
                .collect(),
            asks: asks
                .into_iter()
                .map(|(p, q)| (p.to_string(), q.to_string()))
                .collect(),
            bbo: book.bbo(),
        }
    }

    /// The newest `n` trades across all symbols.
    #[must_use]
    pub fn recent_trades(&self, n: usize) -> Vec<Trade> {
        self.trade_history.recent(n)
    }

    /// Conditional orders still waiting on their trigger for a symbol.
    #[must_use]
    pub fn pending_conditionals(&self, symbol: &str) -> Vec<conditional::ConditionalOrder> {
        self.conditionals
            .get(symbol)
            .map(|registry| registry.entries())
            .unwrap_or_default()
    }

    /// Engine health and throughput counters.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            uptime_seconds: self.metrics.uptime_seconds(),
            orders_processed: self.metrics.orders_processed(),
            trades_executed: self.metrics.trades_executed(),
            total_volume: self.metrics.total_volume(),
            active_symbols: self.symbols(),
            active_orders: self.books.iter().map(|b| b.order_count()).sum(),
            timestamp: Utc::now(),
        }
    }

    /// Capture every book into a snapshot document.
    #[must_use]
    pub fn snapshot_document(&self) -> SnapshotDocument {
        let mut order_books = BTreeMap::new();
        for book in self.books.iter() {
            let mut sides = crate::persistence::BookOrders::default();
            for (price, orders) in book.resting_orders(Side::Buy) {
                sides.bids.insert(price.to_string(), orders);
            }
            for (price, orders) in book.resting_orders(Side::Sell) {
                sides.asks.insert(price.to_string(), orders);
            }
            order_books.insert(book.symbol().to_string(), sides);
        }
        SnapshotDocument {
            timestamp: Utc::now(),
            order_books,
        }
    }

    /// Write a snapshot through the configured store.
    ///
    /// Returns `Ok(None)` when the engine has no snapshot store (pure
    /// in-memory construction).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the write fails.
    pub fn write_snapshot(&self) -> Result<Option<PathBuf>, EngineError> {
        match &self.snapshots {
            Some(store) => self.write_snapshot_to(store).map(Some),
            None => Ok(None),
        }
    }

    /// Write a snapshot through an explicit store.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the write fails.
    pub fn write_snapshot_to(&self, store: &SnapshotStore) -> Result<PathBuf, EngineError> {
        store.write(&self.snapshot_document())
    }

    /// Load the newest snapshot from the configured store, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the newest file cannot be read.
    pub fn load_latest_snapshot(&self) -> Result<Option<SnapshotDocument>, EngineError> {
        match &self.snapshots {
            Some(store) => store.load_latest(),
            None => Ok(None),
        }
    }

    /// Restore books from a snapshot by replaying its orders in arrival
    /// order. Intended for an empty engine; ids already resting are
    /// rejected as duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when an order cannot be re-added.
    pub fn restore_snapshot(&self, document: &SnapshotDocument) -> Result<(), EngineError> {
        let _guard = self.submit_lock.lock();
        for order in document.orders_in_arrival_order() {
            self.arrival_seq.fetch_max(order.arrival_seq, Ordering::Relaxed);
            let book = self.book_or_create(&order.symbol);
            book.add_order(order)?;
        }
        info!(books = document.order_books.len(), "snapshot restored");
        Ok(())
    }

    /// Graceful shutdown: flush and fsync the WAL, then write a final
    /// snapshot when a store is configured.
    ///
    /// # Errors
    ///
    /// Returns the first persistence error encountered.
    pub fn shutdown(&self) -> Result<(), EngineError> {
        if let Some(wal) = &self.wal {
            wal.sync().map_err(|e| EngineError::Io {
                message: e.to_string(),
                path: Some(wal.path().to_path_buf()),
            })?;
        }
        self.write_snapshot()?;
        info!("engine shut down");
        Ok(())
    }

    pub(crate) fn book_or_create(&self, symbol: &str) -> Arc<OrderBook> {
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| {
                info!(symbol, "initialized order book");
                Arc::new(OrderBook::new(symbol))
            })
            .clone()
    }

    pub(crate) fn wal_append(&self, record: &WalRecord) {
        if self.replaying.load(Ordering::Relaxed) {
            return;
        }
        if let Some(wal) = &self.wal {
            if let Err(e) = wal.append(record) {
                // Submission proceeds; durability is operator-tunable.
                warn!(error = %e, "write-ahead log append failed");
            }
        }
    }

    /// Replay the WAL through the normal submit path with WAL writes
    /// suppressed, reconciling recorded trades against replay output.
    fn recover(&self) -> Result<RecoveryStats, EngineError> {
        let Some(wal) = &self.wal else {
            return Ok(RecoveryStats::default());
        };
        let entries = wal.read_entries().map_err(|e| EngineError::Io {
            message: e.to_string(),
            path: Some(wal.path().to_path_buf()),
        })?;
        if entries.is_empty() {
            return Ok(RecoveryStats::default());
        }

        info!(records = entries.len(), "recovering state from write-ahead log");
        self.replaying.store(true, Ordering::Relaxed);
        let result = self.replay_entries(&entries);
        self.replaying.store(false, Ordering::Relaxed);

        match &result {
            Ok(stats) => info!(
                orders = stats.orders_replayed,
                cancels = stats.cancels_replayed,
                conditionals = stats.conditionals_restored,
                trades = stats.trades_reconciled,
                "recovery complete"
            ),
            Err(e) => warn!(error = %e, "recovery failed"),
        }
        result
    }

    fn replay_entries(
        &self,
        entries: &[crate::persistence::WalEntry],
    ) -> Result<RecoveryStats, EngineError> {
        let mut stats = RecoveryStats::default();
        let mut produced: Vec<Trade> = Vec::new();
        let mut reconciled = 0usize;

        for (index, entry) in entries.iter().enumerate() {
            match &entry.record {
                WalRecord::OrderSubmit(data) => {
                    let request = data.to_request();
                    // Business-rule rejections (FOK, empty-book market) are
                    // legitimate replay outcomes: the same rejection
                    // happened live after the record was appended.
                    let before = produced.len();
                    let _ = self.process_submission(&request, &mut produced);
                    if produced.len() > before {
                        self.run_trigger_cascade(&request.symbol, &mut produced);
                    }
                    stats.orders_replayed += 1;
                }
                WalRecord::TradeExecute(data) => {
                    let Some(trade) = produced.get(reconciled) else {
                        return Err(EngineError::ReplayDivergence {
                            index,
                            detail: format!(
                                "log records trade {} but replay produced none",
                                data.trade_id
                            ),
                        });
                    };
                    if !data.matches(trade) {
                        return Err(EngineError::ReplayDivergence {
                            index,
                            detail: format!(
                                "log records {} {}@{} {}/{} but replay produced {} {}@{} {}/{}",
                                data.symbol,
                                data.quantity,
                                data.price,
                                data.maker_order_id,
                                data.taker_order_id,
                                trade.symbol,
                                trade.quantity,
                                trade.price,
                                trade.maker_order_id,
                                trade.taker_order_id,
                            ),
                        });
                    }
                    reconciled += 1;
                }
                WalRecord::OrderCancel { order_id } => {
                    self.cancel_inner(order_id).map_err(|e| {
                        EngineError::ReplayDivergence {
                            index,
                            detail: format!("logged cancel of {order_id} failed on replay: {e}"),
                        }
                    })?;
                    stats.cancels_replayed += 1;
                }
                WalRecord::ConditionalSubmit(data) => {
                    let mut registry = self
                        .conditionals
                        .entry(data.symbol.clone())
                        .or_default();
                    registry.insert(data.clone());
                    stats.conditionals_restored += 1;
                }
            }
        }

        if reconciled != produced.len() {
            return Err(EngineError::ReplayDivergence {
                index: entries.len(),
                detail: format!(
                    "replay produced {} trades but the log records {reconciled}",
                    produced.len()
                ),
            });
        }
        stats.trades_reconciled = reconciled;
        Ok(stats)
    }
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}
