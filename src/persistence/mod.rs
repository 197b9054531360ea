//! Durability: write-ahead log and point-in-time snapshots.

mod snapshot;
mod wal;

pub use snapshot::{BookOrders, SnapshotDocument, SnapshotStore};
pub use wal::{WalEntry, WalError, WalOrderSubmit, WalRecord, WalTradeExecute, WriteAheadLog};
