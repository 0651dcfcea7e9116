//! confshift history ledger
//!
//! Tracks which migrations have been applied to which configuration and
//! environment, and answers the three rollback selections:
//!
//! - [`HistoryLedger::last_batch`]: the newest batch
//! - [`HistoryLedger::steps_back`]: the newest `n` records
//! - [`HistoryLedger::to_target`]: everything back to a given migration
//!
//! Persistence sits behind [`LedgerStore`]; [`FileLedger`] writes one JSON
//! object per line:
//!
//! ```text
//! {"configId":"billing","environmentName":"default","migration":"2020_03_31_225419_add_db","ts":"1586008228","batchId":"1.1"}
//! ```

#![warn(unreachable_pub)]

mod error;
mod ledger;
mod record;
mod store;

pub use error::{LedgerError, Result};
pub use ledger::{BatchGrouping, HistoryLedger};
pub use record::{BatchId, HistoryRecord, LedgerScope, RecordKey};
pub use store::{FileLedger, LedgerStore, MemoryLedger};
