//! Engine configuration.
//!
//! All tunables of the matching engine live in [`EngineConfig`]. The struct
//! deserializes from JSON with every field optional, so operators only
//! override what they need.

use crate::orderbook::fees::FeeTier;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration for a [`crate::MatchingEngine`] instance.
///
/// The defaults mirror a small single-venue deployment: WAL and snapshots
/// under `data/`, two fee tiers, and generous price/quantity ceilings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path of the append-only write-ahead log file.
    #[serde(default = "default_wal_path")]
    pub wal_path: PathBuf,

    /// Whether the write-ahead log is enabled. When false the engine runs
    /// fully in memory and recovery is skipped.
    #[serde(default = "default_wal_enabled")]
    pub wal_enabled: bool,

    /// Directory where point-in-time snapshots are written.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Number of snapshot files to retain. Older snapshots are deleted
    /// after a successful new write.
    #[serde(default = "default_snapshot_retain_n")]
    pub snapshot_retain_n: usize,

    /// Fee tiers by name. Lookups for unknown tiers fall back to `default`.
    #[serde(default = "default_fee_tiers")]
    pub fee_tiers: HashMap<String, FeeTier>,

    /// Currency in which fees are denominated.
    #[serde(default = "default_fee_currency")]
    pub fee_currency: String,

    /// Maximum accepted order quantity, inclusive.
    #[serde(default = "default_max_order_quantity")]
    pub max_order_quantity: Decimal,

    /// Maximum accepted limit price, inclusive.
    #[serde(default = "default_max_price")]
    pub max_price: Decimal,

    /// Hard cap on conditional-order promotions per external submission.
    #[serde(default = "default_conditional_cascade_cap")]
    pub conditional_cascade_cap: usize,

    /// Capacity of the in-memory trade history ring.
    #[serde(default = "default_trade_history_capacity")]
    pub trade_history_capacity: usize,
}

fn default_wal_path() -> PathBuf {
    PathBuf::from("data/wal/orders.log")
}

fn default_wal_enabled() -> bool {
    true
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("data/snapshots")
}

fn default_snapshot_retain_n() -> usize {
    5
}

fn default_fee_tiers() -> HashMap<String, FeeTier> {
    FeeTier::standard_tiers()
}

fn default_fee_currency() -> String {
    "USDT".to_string()
}

fn default_max_order_quantity() -> Decimal {
    Decimal::new(1_000_000, 0)
}

fn default_max_price() -> Decimal {
    Decimal::new(1_000_000, 0)
}

fn default_conditional_cascade_cap() -> usize {
    1024
}

fn default_trade_history_capacity() -> usize {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wal_path: default_wal_path(),
            wal_enabled: default_wal_enabled(),
            snapshot_dir: default_snapshot_dir(),
            snapshot_retain_n: default_snapshot_retain_n(),
            fee_tiers: default_fee_tiers(),
            fee_currency: default_fee_currency(),
            max_order_quantity: default_max_order_quantity(),
            max_price: default_max_price(),
            conditional_cascade_cap: default_conditional_cascade_cap(),
            trade_history_capacity: default_trade_history_capacity(),
        }
    }
}

impl EngineConfig {
    /// Configuration for a purely in-memory engine: no WAL, no recovery.
    ///
    /// Snapshots can still be taken explicitly via the snapshot store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            wal_enabled: false,
            ..Self::default()
        }
    }
}
