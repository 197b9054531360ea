//! Point-in-time snapshots of all order books.
//!
//! A snapshot is one JSON document holding every resting order of every
//! book, grouped by symbol, side, and price level with FIFO order
//! preserved. Files are written atomically (temp file + rename) as
//! `snapshot_<epoch>.json`; only the newest N are retained.

use crate::orderbook::EngineError;
use crate::orderbook::order::Order;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resting orders of one book, grouped by price level.
///
/// Map keys are the decimal string form of the price; each level's orders
/// are in arrival (FIFO) order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookOrders {
    /// Bid levels.
    pub bids: BTreeMap<String, Vec<Order>>,
    /// Ask levels.
    pub asks: BTreeMap<String, Vec<Order>>,
}

/// A point-in-time serialization of every book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    /// Capture timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Books by symbol.
    pub order_books: BTreeMap<String, BookOrders>,
}

impl SnapshotDocument {
    /// Every order in the document, in arrival-sequence order, ready to be
    /// replayed into empty books.
    #[must_use]
    pub fn orders_in_arrival_order(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .order_books
            .values()
            .flat_map(|book| book.bids.values().chain(book.asks.values()))
            .flatten()
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.arrival_seq);
        orders
    }
}

/// Writes, lists, loads, and prunes snapshot files in one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    retain: usize,
}

impl SnapshotStore {
    /// Create a store over `dir`, retaining the newest `retain` files.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, retain: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            retain: retain.max(1),
        }
    }

    /// Directory the snapshots live in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a snapshot atomically and prune old files.
    ///
    /// The document is first written to a temp file in the same directory
    /// and then renamed into place, so readers never observe a torn file.
    /// Pruning only runs after the rename succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] or [`EngineError::Serialization`] when
    /// writing fails; the previous snapshots are left untouched.
    pub fn write(&self, document: &SnapshotDocument) -> Result<PathBuf, EngineError> {
        fs::create_dir_all(&self.dir).map_err(|e| EngineError::Io {
            message: e.to_string(),
            path: Some(self.dir.clone()),
        })?;

        let epoch = document.timestamp.timestamp();
        let target = self.dir.join(format!("snapshot_{epoch}.json"));
        let temp = self.dir.join(format!(".snapshot_{epoch}.json.tmp"));

        let payload = serde_json::to_vec_pretty(document)?;
        fs::write(&temp, payload).map_err(|e| EngineError::Io {
            message: e.to_string(),
            path: Some(temp.clone()),
        })?;
        fs::rename(&temp, &target).map_err(|e| EngineError::Io {
            message: e.to_string(),
            path: Some(target.clone()),
        })?;

        debug!(path = %target.display(), "snapshot written");
        self.cleanup();
        Ok(target)
    }

    /// Load the snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] or [`EngineError::Serialization`] when
    /// the file cannot be read or parsed.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<SnapshotDocument, EngineError> {
        let path = path.as_ref();
        let payload = fs::read(path).map_err(|e| EngineError::Io {
            message: e.to_string(),
            path: Some(path.to_path_buf()),
        })?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Path of the newest snapshot, if any exist.
    #[must_use]
    pub fn latest(&self) -> Option<PathBuf> {
        let mut files = self.snapshot_files();
        files.pop().map(|(_, path)| path)
    }

    /// Load the newest snapshot, if any exist.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the newest file cannot be read.
    pub fn load_latest(&self) -> Result<Option<SnapshotDocument>, EngineError> {
        match self.latest() {
            Some(path) => self.load(path).map(Some),
            None => Ok(None),
        }
    }

    /// Snapshot files sorted oldest-first by their epoch component.
    fn snapshot_files(&self) -> Vec<(i64, PathBuf)> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files: Vec<(i64, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let epoch = name
                    .strip_prefix("snapshot_")?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()?;
                Some((epoch, entry.path()))
            })
            .collect();
        files.sort();
        files
    }

    fn cleanup(&self) {
        let files = self.snapshot_files();
        if files.len() <= self.retain {
            return;
        }
        let excess = files.len() - self.retain;
        for (_, path) in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to prune old snapshot");
            } else {
                debug!(path = %path.display(), "pruned old snapshot");
            }
        }
    }
}
