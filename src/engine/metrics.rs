//! Engine throughput counters.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic counters maintained by the submit path.
#[derive(Debug)]
pub struct EngineMetrics {
    orders_processed: AtomicU64,
    trades_executed: AtomicU64,
    total_volume: RwLock<Decimal>,
    start_time: DateTime<Utc>,
    started: Instant,
}

impl EngineMetrics {
    /// Create zeroed metrics anchored at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders_processed: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            total_volume: RwLock::new(Decimal::ZERO),
            start_time: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Count one processed order.
    pub fn record_order(&self) {
        self.orders_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count `count` executed trades moving `volume` total quantity.
    pub fn record_trades(&self, count: u64, volume: Decimal) {
        if count == 0 {
            return;
        }
        self.trades_executed.fetch_add(count, Ordering::Relaxed);
        *self.total_volume.write() += volume;
    }

    /// Orders processed since start.
    #[must_use]
    pub fn orders_processed(&self) -> u64 {
        self.orders_processed.load(Ordering::Relaxed)
    }

    /// Trades executed since start.
    #[must_use]
    pub fn trades_executed(&self) -> u64 {
        self.trades_executed.load(Ordering::Relaxed)
    }

    /// Total executed quantity since start.
    #[must_use]
    pub fn total_volume(&self) -> Decimal {
        *self.total_volume.read()
    }

    /// Wall-clock time the engine was constructed.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Seconds elapsed since construction.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
