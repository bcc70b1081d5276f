//! Punch Core Library
//!
//! Clock records, the local database and revision-based sync.

pub mod ids;
pub mod models;
pub mod store;
pub mod sync;

pub use ids::{IdGenerator, RandomIds, RecordId, SequentialIds};
pub use models::{Entry, EntryEnd, Header, Revision};
pub use store::{init_db, EntryRepository, HeaderRepository, HeaderTotal, Ledger, StoreError};
pub use sync::{HttpTransport, RetryPolicy, SyncEngine, SyncError, SyncReport, SyncTransport};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
