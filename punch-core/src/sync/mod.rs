//! Revision-based sync with the `T.Sync` server.
//!
//! A round runs inside one local transaction:
//! 1. Read the ledger (last reconciled revision) and take the write lock
//! 2. Collect every pending header and entry
//! 3. Send them with the ledger revision; retry on transport failures
//! 4. Write the server's delta over local copies (server wins)
//! 5. Stamp the remaining pending records with the new revision
//! 6. Advance the ledger and commit
//!
//! A reply with revision 0 means the server has nothing new; the round then
//! rolls back and changes nothing.

mod apply;
mod client;
mod engine;
mod error;
mod protocol;
mod retry;

pub use apply::{apply_reply, ApplyOutcome};
pub use client::{HttpTransport, SyncTransport};
pub use engine::{sync_status, SyncEngine, SyncReport, SyncStatus};
pub use error::SyncError;
pub use protocol::{
    decode_sync_response, encode_sync_request, EntryRecord, HeaderRecord, RpcRequest,
    RpcResponse, SyncArgs, SyncReply, REQUEST_ID, SYNC_METHOD,
};
pub use retry::RetryPolicy;
