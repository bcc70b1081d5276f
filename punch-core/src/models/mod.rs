mod entry;
mod header;
mod revision;

pub use entry::{Entry, EntryEnd};
pub use header::Header;
pub use revision::Revision;
