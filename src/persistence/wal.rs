//! Append-only write-ahead log.
//!
//! One JSON record per line, UTF-8, LF-terminated. An `ORDER_SUBMIT` is
//! appended before any book mutation so recovery sees every attempt;
//! `TRADE_EXECUTE` records are informational and used to verify that
//! replay reproduces the same executions. Writes are flushed per record;
//! [`WriteAheadLog::sync`] forces an fsync when the operator wants one.

use crate::engine::types::OrderRequest;
use crate::orderbook::order::{Order, OrderKind, Side};
use crate::orderbook::trade::Trade;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors from the write-ahead log subsystem.
#[derive(Debug)]
#[non_exhaustive]
pub enum WalError {
    /// An I/O error occurred while reading or writing the log file.
    Io {
        /// The underlying I/O error message.
        message: String,
        /// The file path involved, if known.
        path: Option<PathBuf>,
    },

    /// A record could not be serialized for appending.
    Serialization {
        /// The underlying serialization error message.
        message: String,
    },

    /// A log line could not be deserialized during replay.
    Deserialization {
        /// One-based line number of the malformed record.
        line: usize,
        /// The underlying deserialization error message.
        message: String,
    },
}

impl fmt::Display for WalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalError::Io { message, path } => {
                if let Some(p) = path {
                    write!(f, "WAL I/O error at {}: {message}", p.display())
                } else {
                    write!(f, "WAL I/O error: {message}")
                }
            }
            WalError::Serialization { message } => {
                write!(f, "WAL serialization error: {message}")
            }
            WalError::Deserialization { line, message } => {
                write!(f, "WAL deserialization error at line {line}: {message}")
            }
        }
    }
}

impl std::error::Error for WalError {}

/// Payload of an `ORDER_SUBMIT` record: the materialized order request,
/// including the id assigned on ingress, so replay is id-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalOrderSubmit {
    /// Order id (always present; assigned before logging).
    pub order_id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Execution style.
    pub order_type: OrderKind,
    /// Limit price; absent for market orders.
    #[serde(with = "rust_decimal::serde::str_option", default)]
    pub price: Option<Decimal>,
    /// Order quantity.
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    /// Optional client correlation id.
    pub client_id: Option<String>,
    /// Optional fee tier name.
    #[serde(default)]
    pub fee_tier: Option<String>,
}

impl WalOrderSubmit {
    /// Capture a just-materialized order for logging.
    #[must_use]
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.kind,
            price: order.price,
            quantity: order.original_quantity,
            client_id: order.client_id.clone(),
            fee_tier: order.fee_tier.clone(),
        }
    }

    /// Rebuild the submit request this record captures, for replay through
    /// the normal submit path.
    #[must_use]
    pub fn to_request(&self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            order_type: self.order_type.to_string(),
            side: self.side.to_string(),
            quantity: self.quantity.to_string(),
            price: self.price.map(|p| p.to_string()),
            client_id: self.client_id.clone(),
            order_id: Some(self.order_id.clone()),
            fee_tier: self.fee_tier.clone(),
        }
    }
}

/// Payload of a `TRADE_EXECUTE` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalTradeExecute {
    /// Trade id at execution time. Regenerated on replay and excluded
    /// from reconciliation.
    pub trade_id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Execution price.
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Executed quantity.
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    /// Maker order id.
    pub maker_order_id: String,
    /// Taker order id.
    pub taker_order_id: String,
    /// Side of the taker.
    pub aggressor_side: Side,
}

impl WalTradeExecute {
    /// Capture an executed trade for logging.
    #[must_use]
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            trade_id: trade.trade_id.clone(),
            symbol: trade.symbol.clone(),
            price: trade.price,
            quantity: trade.quantity,
            maker_order_id: trade.maker_order_id.clone(),
            taker_order_id: trade.taker_order_id.clone(),
            aggressor_side: trade.aggressor_side,
        }
    }

    /// Whether a replay-produced trade matches this record.
    ///
    /// Trade ids and timestamps are regenerated on replay, so the
    /// comparison covers the deterministic fields only.
    #[must_use]
    pub fn matches(&self, trade: &Trade) -> bool {
        self.symbol == trade.symbol
            && self.price == trade.price
            && self.quantity == trade.quantity
            && self.maker_order_id == trade.maker_order_id
            && self.taker_order_id == trade.taker_order_id
            && self.aggressor_side == trade.aggressor_side
    }
}

/// A tagged WAL record. On-disk ordering equals execution ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WalRecord {
    /// An order submission, logged before any book mutation.
    #[serde(rename = "ORDER_SUBMIT")]
    OrderSubmit(WalOrderSubmit),

    /// A trade execution; informational, used to check replay determinism.
    #[serde(rename = "TRADE_EXECUTE")]
    TradeExecute(WalTradeExecute),

    /// A successful cancellation.
    #[serde(rename = "ORDER_CANCEL")]
    OrderCancel {
        /// The cancelled order's id.
        order_id: String,
    },

    /// A conditional-order registration, so the registry survives restart.
    #[serde(rename = "CONDITIONAL_SUBMIT")]
    ConditionalSubmit(crate::engine::conditional::ConditionalOrder),
}

/// One log line: a UTC timestamp plus the tagged record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    /// Wall-clock time the record was appended.
    pub timestamp: DateTime<Utc>,
    /// The record payload.
    #[serde(flatten)]
    pub record: WalRecord,
}

/// Append-only NDJSON write-ahead log.
///
/// The file handle is owned by the matching thread; `append` serializes
/// writers through an internal mutex as a safety net.
#[derive(Debug)]
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl WriteAheadLog {
    /// Open (or create) the log at `path` for appending, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::Io`] when the directory or file cannot be
    /// created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| WalError::Io {
                    message: e.to_string(),
                    path: Some(parent.to_path_buf()),
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| WalError::Io {
                message: e.to_string(),
                path: Some(path.clone()),
            })?;
        debug!(path = %path.display(), "write-ahead log opened");
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, stamped with the current UTC time, and flush it
    /// to the operating system.
    ///
    /// # Errors
    ///
    /// Returns [`WalError`] on serialization or I/O failure; the caller
    /// decides whether to proceed (availability) or halt (durability).
    pub fn append(&self, record: &WalRecord) -> Result<(), WalError> {
        let entry = WalEntry {
            timestamp: Utc::now(),
            record: record.clone(),
        };
        let line = serde_json::to_string(&entry).map_err(|e| WalError::Serialization {
            message: e.to_string(),
        })?;
        let mut writer = self.writer.lock();
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .map_err(|e| WalError::Io {
                message: e.to_string(),
                path: Some(self.path.clone()),
            })
    }

    /// Force an fsync of the log file.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::Io`] when the sync fails.
    pub fn sync(&self) -> Result<(), WalError> {
        let mut writer = self.writer.lock();
        writer
            .flush()
            .and_then(|_| writer.get_ref().sync_all())
            .map_err(|e| WalError::Io {
                message: e.to_string(),
                path: Some(self.path.clone()),
            })
    }

    /// Read every entry of this log in file order.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::Deserialization`] on the first malformed line.
    pub fn read_entries(&self) -> Result<Vec<WalEntry>, WalError> {
        Self::read_path(&self.path)
    }

    /// Read every entry of the log at `path` in file order. A missing file
    /// is an empty log.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::Deserialization`] on the first malformed line.
    pub fn read_path(path: impl AsRef<Path>) -> Result<Vec<WalEntry>, WalError> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(WalError::Io {
                    message: e.to_string(),
                    path: Some(path.to_path_buf()),
                });
            }
        };

        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| WalError::Io {
                message: e.to_string(),
                path: Some(path.to_path_buf()),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let entry =
                serde_json::from_str(&line).map_err(|e| WalError::Deserialization {
                    line: index + 1,
                    message: e.to_string(),
                })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}
