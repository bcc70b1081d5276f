//! Reference `T.Sync` server.

pub mod keys;
pub mod rpc;
pub mod storage;

pub use keys::ApiKeyStore;
pub use rpc::{router, AppState};
pub use storage::{ServerError, ServerStore};
